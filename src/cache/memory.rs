use super::ResponseCache;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::{ Duration, Instant };
use tokio::sync::Mutex;

/// In-process cache backend. Entries expire lazily on read. Suitable for
/// single-instance deployments and used by the test suite.
pub struct MemoryCache {
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResponseCache for MemoryCache {
    async fn get(&self, key: &str) -> Option<String> {
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some((value, expires_at)) if Instant::now() < *expires_at => Some(value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) {
        let mut entries = self.entries.lock().await;
        entries.insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
    }

    async fn delete(&self, keys: &[String]) {
        let mut entries = self.entries.lock().await;
        for key in keys {
            entries.remove(key);
        }
    }
}
