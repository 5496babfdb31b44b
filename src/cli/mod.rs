use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    // --- Server Args ---
    /// Host address and port for the HTTP server to listen on.
    #[arg(long, env = "SERVER_ADDR", default_value = "127.0.0.1:3000")]
    pub server_addr: String,

    /// Allowed CORS origin for the browser client. Use "*" to allow any origin.
    #[arg(long, env = "CORS_ORIGIN", default_value = "*")]
    pub cors_origin: String,

    /// Optional path to the TLS certificate file (PEM format) for serving HTTPS. Requires --tls-key-path.
    #[arg(long, env = "TLS_CERT_PATH")]
    pub tls_cert_path: Option<String>,

    /// Optional path to the TLS private key file (PEM format) for serving HTTPS. Requires --tls-cert-path.
    #[arg(long, env = "TLS_KEY_PATH")]
    pub tls_key_path: Option<String>,

    #[arg(long, env = "ENABLE_TLS", default_value = "false")]
    pub enable_tls: bool,

    // --- Database Args ---
    /// Connection URL for the conversation database (system of record).
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite://support-agent.db?mode=rwc")]
    pub database_url: String,

    // --- Chat LLM Provider Args ---
    /// Type of LLM provider for chat completion (openai, ollama)
    #[arg(long, env = "CHAT_LLM_TYPE", default_value = "openai")]
    pub chat_llm_type: String,

    /// Base URL for the Chat LLM provider API (e.g., http://localhost:11434 for Ollama)
    #[arg(long, env = "CHAT_BASE_URL")] // No default, let adapters handle defaults if None
    pub chat_base_url: Option<String>,

    /// API Key for the Chat LLM provider
    #[arg(long, env = "CHAT_API_KEY", default_value = "")]
    pub chat_api_key: String,

    /// Model name for chat completion (e.g., gpt-4o-mini, llama3)
    #[arg(long, env = "CHAT_MODEL")] // No default, rely on adapter defaults if None
    pub chat_model: Option<String>,

    /// Maximum number of history messages included in a model call.
    #[arg(long, env = "MAX_HISTORY_MESSAGES", default_value = "20")]
    pub max_history_messages: usize,

    /// Maximum tokens the model may produce per reply.
    #[arg(long, env = "MAX_OUTPUT_TOKENS", default_value = "500")]
    pub max_output_tokens: u32,

    /// Timeout in seconds for a single model call.
    #[arg(long, env = "CHAT_TIMEOUT_SECS", default_value = "30")]
    pub chat_timeout_secs: u64,

    // --- Caching Args ---
    /// Enable the read-through cache for conversation reads.
    #[arg(long, env = "ENABLE_CACHE", default_value = "true")]
    pub enable_cache: bool,

    /// Cache backend type (redis, memory)
    #[arg(long, env = "CACHE_BACKEND", default_value = "redis")]
    pub cache_backend: String,

    /// Redis URL for the caching layer.
    #[arg(long, env = "CACHE_REDIS_URL", default_value = "redis://127.0.0.1:6379")]
    pub cache_redis_url: String,

    /// Time-to-live (TTL) in seconds for cache entries.
    #[arg(long, env = "CACHE_TTL_SECS", default_value = "90")]
    pub cache_ttl_secs: u64,
}
