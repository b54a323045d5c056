//! TTL cache for successful Helix bodies. Each endpoint gets its own
//! `TimedCache` since the lifespan is fixed per cache.

use actix_web::web::Bytes;
use cached::{Cached, TimedCache};
use std::sync::Mutex;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheKind {
    Users,
    ModeratedChannels
}

pub struct ResponseCache {
    users: Mutex<TimedCache<String, Bytes>>,
    moderated_channels: Mutex<TimedCache<String, Bytes>>
}

/// Same ids in any order share an entry
pub fn users_key(ids: &[String]) -> String {
    let mut sorted: Vec<&str> = ids.iter().map(|id| id.as_str()).collect();
    sorted.sort_unstable();
    format!("users:{}", sorted.join(","))
}

pub fn moderated_channels_key(user_id: &str) -> String {
    format!("moderated_channels:{}", user_id)
}

impl ResponseCache {
    pub fn new(users_ttl_seconds: u64, moderated_channels_ttl_seconds: u64) -> ResponseCache {
        ResponseCache {
            users: Mutex::new(TimedCache::with_lifespan(users_ttl_seconds)),
            moderated_channels: Mutex::new(TimedCache::with_lifespan(moderated_channels_ttl_seconds))
        }
    }

    fn store(&self, kind: CacheKind) -> &Mutex<TimedCache<String, Bytes>> {
        match kind {
            CacheKind::Users => &self.users,
            CacheKind::ModeratedChannels => &self.moderated_channels
        }
    }

    pub fn get(&self, kind: CacheKind, key: &str) -> Option<Bytes> {
        // Poisoned lock reads as a miss
        let mut cache = self.store(kind).lock().ok()?;
        cache.cache_get(&key.to_string()).cloned()
    }

    pub fn put(&self, kind: CacheKind, key: String, body: Bytes) {
        if let Ok(mut cache) = self.store(kind).lock() {
            cache.cache_set(key, body);
        }
    }

    /// Drops expired entries. Returns how many remain.
    pub fn sweep(&self) -> usize {
        let mut remaining = 0;
        for kind in [CacheKind::Users, CacheKind::ModeratedChannels] {
            if let Ok(mut cache) = self.store(kind).lock() {
                cache.flush();
                remaining += cache.cache_size();
            }
        }
        remaining
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;
    use std::time::Duration;

    #[test]
    fn users_key_ignores_order() {
        let a = users_key(&["2".to_string(), "10".to_string(), "1".to_string()]);
        let b = users_key(&["1".to_string(), "2".to_string(), "10".to_string()]);
        assert_eq!(a, b);
        assert_eq!(a, "users:1,10,2");
        assert_eq!(moderated_channels_key("42"), "moderated_channels:42");
    }

    #[test]
    fn hit_and_miss() {
        let cache = ResponseCache::new(60, 60);
        assert!(cache.get(CacheKind::Users, "users:1").is_none());

        cache.put(CacheKind::Users, "users:1".to_string(), Bytes::from_static(b"{\"data\":[]}"));
        assert_eq!(cache.get(CacheKind::Users, "users:1").unwrap(), Bytes::from_static(b"{\"data\":[]}"));
        assert!(cache.get(CacheKind::ModeratedChannels, "users:1").is_none(), "kinds do not share entries");
    }

    #[test]
    fn entries_expire_and_get_swept() {
        let cache = ResponseCache::new(1, 60);
        cache.put(CacheKind::Users, "users:1".to_string(), Bytes::from_static(b"a"));
        cache.put(CacheKind::ModeratedChannels, "moderated_channels:1".to_string(), Bytes::from_static(b"b"));

        sleep(Duration::from_millis(1100));
        assert_eq!(cache.sweep(), 1, "only the long lived entry is left");
        assert!(cache.get(CacheKind::Users, "users:1").is_none());
        assert!(cache.get(CacheKind::ModeratedChannels, "moderated_channels:1").is_some());
    }
}
