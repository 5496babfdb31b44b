use super::ResponseCache;
use async_trait::async_trait;
use log::{ error, info, warn };
use redis::{ AsyncCommands, Client };
use redis::aio::MultiplexedConnection;
use std::error::Error;
use std::sync::Arc;
use std::sync::atomic::{ AtomicBool, Ordering };
use std::time::Duration;
use tokio::sync::Mutex;

const RECONNECT_ATTEMPTS: u32 = 3;
const RECONNECT_BASE_DELAY_MS: u64 = 100;
const RECONNECT_MAX_DELAY_MS: u64 = 3000;

struct CacheState {
    conn: Mutex<Option<MultiplexedConnection>>,
    available: AtomicBool,
    reconnecting: AtomicBool,
}

/// Fail-open Redis cache client. A single multiplexed connection is shared
/// for the process lifetime. When the connection is lost the availability
/// flag is cleared so every operation short-circuits without network I/O
/// while a bounded background reconnect runs.
#[derive(Clone)]
pub struct RedisCache {
    client: Client,
    state: Arc<CacheState>,
}

impl RedisCache {
    /// Open the client and attempt the initial connection. An unreachable
    /// server is tolerated (the cache starts unavailable and reconnects in
    /// the background); only an invalid URL is an error.
    pub async fn connect(url: &str) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let client = Client::open(url)?;
        let cache = Self {
            client,
            state: Arc::new(CacheState {
                conn: Mutex::new(None),
                available: AtomicBool::new(false),
                reconnecting: AtomicBool::new(false),
            }),
        };
        match cache.client.get_multiplexed_async_connection().await {
            Ok(conn) => {
                *cache.state.conn.lock().await = Some(conn);
                cache.state.available.store(true, Ordering::SeqCst);
                info!("[cache] Connected to redis");
            }
            Err(e) => {
                warn!("[cache] Initial redis connection failed: {}", e);
                cache.spawn_reconnect();
            }
        }
        Ok(cache)
    }

    pub fn is_available(&self) -> bool {
        self.state.available.load(Ordering::SeqCst)
    }

    /// Mark the connection dead and kick off a background reconnect.
    fn handle_error(&self) {
        self.state.available.store(false, Ordering::SeqCst);
        self.spawn_reconnect();
    }

    fn spawn_reconnect(&self) {
        if self.state.reconnecting.swap(true, Ordering::SeqCst) {
            return;
        }
        let cache = self.clone();
        tokio::spawn(async move {
            cache.state.conn.lock().await.take();
            let mut delay = RECONNECT_BASE_DELAY_MS;
            for attempt in 1..=RECONNECT_ATTEMPTS {
                tokio::time::sleep(Duration::from_millis(delay)).await;
                match cache.client.get_multiplexed_async_connection().await {
                    Ok(conn) => {
                        *cache.state.conn.lock().await = Some(conn);
                        cache.state.available.store(true, Ordering::SeqCst);
                        cache.state.reconnecting.store(false, Ordering::SeqCst);
                        info!("[cache] Redis reconnected on attempt {}", attempt);
                        return;
                    }
                    Err(e) => {
                        warn!("[cache] Redis reconnect attempt {} failed: {}", attempt, e);
                    }
                }
                delay = (delay * 2).min(RECONNECT_MAX_DELAY_MS);
            }
            error!("[cache] Max reconnect attempts reached, cache stays disabled");
            cache.state.reconnecting.store(false, Ordering::SeqCst);
        });
    }
}

#[async_trait]
impl ResponseCache for RedisCache {
    async fn get(&self, key: &str) -> Option<String> {
        if !self.is_available() {
            return None;
        }
        let mut guard = self.state.conn.lock().await;
        let conn = guard.as_mut()?;
        match conn.get::<_, Option<String>>(key).await {
            Ok(val) => val,
            Err(e) => {
                warn!("[cache] Error getting key {}: {}", key, e);
                drop(guard);
                self.handle_error();
                None
            }
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) {
        if !self.is_available() {
            return;
        }
        let mut guard = self.state.conn.lock().await;
        let Some(conn) = guard.as_mut() else {
            return;
        };
        if let Err(e) = conn.set_ex::<_, _, ()>(key, value, ttl.as_secs()).await {
            warn!("[cache] Error setting key {}: {}", key, e);
            drop(guard);
            self.handle_error();
        }
    }

    async fn delete(&self, keys: &[String]) {
        if keys.is_empty() || !self.is_available() {
            return;
        }
        let mut guard = self.state.conn.lock().await;
        let Some(conn) = guard.as_mut() else {
            return;
        };
        if let Err(e) = conn.del::<_, ()>(keys.to_vec()).await {
            warn!("[cache] Error deleting keys: {}", e);
            drop(guard);
            self.handle_error();
        }
    }
}
