pub mod memory;
pub mod redis;

use crate::cli::Args;
use async_trait::async_trait;
use log::{ info, warn };
use std::sync::Arc;
use std::time::Duration;

/// Advisory read-through cache for conversation reads. Every operation is
/// fail-open: errors are logged and mapped to the same outcome as a miss,
/// so a broken cache only costs latency, never correctness.
#[async_trait]
pub trait ResponseCache: Send + Sync {
    async fn get(&self, key: &str) -> Option<String>;
    async fn set(&self, key: &str, value: &str, ttl: Duration);
    async fn delete(&self, keys: &[String]);
}

pub fn conversation_list_key(session_id: &str) -> String {
    format!("chat:conversations:session:{}", session_id)
}

pub fn conversation_messages_key(conversation_id: &str) -> String {
    format!("chat:messages:conversation:{}", conversation_id)
}

/// Construct the configured cache backend. `None` disables caching and every
/// read takes the direct path.
pub async fn init(args: &Args) -> Option<Arc<dyn ResponseCache>> {
    if !args.enable_cache {
        info!("Caching disabled");
        return None;
    }
    match args.cache_backend.to_lowercase().as_str() {
        "redis" => {
            match redis::RedisCache::connect(&args.cache_redis_url).await {
                Ok(cache) => {
                    info!("Cache backend: redis at {}", args.cache_redis_url);
                    Some(Arc::new(cache))
                }
                Err(e) => {
                    warn!("Failed to initialize redis cache ({}), caching disabled", e);
                    None
                }
            }
        }
        "memory" => {
            info!("Cache backend: in-process memory");
            Some(Arc::new(memory::MemoryCache::new()))
        }
        other => {
            warn!("Unsupported cache backend '{}', caching disabled", other);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_builders_are_namespaced() {
        assert_eq!(
            conversation_list_key("s1"),
            "chat:conversations:session:s1"
        );
        assert_eq!(
            conversation_messages_key("c1"),
            "chat:messages:conversation:c1"
        );
    }

    #[test]
    fn key_builders_are_injective() {
        assert_ne!(conversation_list_key("a"), conversation_list_key("b"));
        // A session id and a conversation id that happen to be equal must
        // still land in distinct namespaces.
        assert_ne!(conversation_list_key("x"), conversation_messages_key("x"));
    }
}
