use crate::keyspace::Keyspace;

/// String values with optional per-key TTL.
#[derive(Clone, Default)]
pub struct KvStore {
    data: Keyspace<String>,
}

impl KvStore {
    pub fn new() -> Self {
        KvStore::default()
    }

    /// Stores `value`, replacing any previous value and clearing its TTL.
    pub fn set(&self, key: String, value: String) {
        self.data.insert(key, value);
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.data.read(key, String::clone)
    }

    /// Returns 1 when the key exists and now expires in `seconds`, 0 otherwise.
    pub fn expire(&self, key: &str, seconds: i64) -> u8 {
        u8::from(self.data.expire(key, seconds))
    }

    #[cfg(test)]
    pub(crate) fn stored_len(&self) -> usize {
        self.data.stored_len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn set_then_get() {
        let store = KvStore::new();
        store.set("k1".to_string(), "v1".to_string());
        assert_eq!(store.get("k1"), Some("v1".to_string()));
        assert_eq!(store.get("missing"), None);

        store.set("k1".to_string(), "v2".to_string());
        assert_eq!(store.get("k1"), Some("v2".to_string()));
    }

    #[test]
    fn expire_missing_key_returns_zero() {
        let store = KvStore::new();
        assert_eq!(store.expire("nope", 10), 0);
    }

    #[tokio::test]
    async fn expired_value_disappears() {
        let store = KvStore::new();
        store.set("k".to_string(), "v".to_string());
        assert_eq!(store.expire("k", 1), 1);

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(store.get("k"), Some("v".to_string()));

        tokio::time::sleep(Duration::from_millis(700)).await;
        assert_eq!(store.get("k"), None);
        assert_eq!(store.stored_len(), 0);
        assert_eq!(store.expire("k", 1), 0);
    }

    #[tokio::test]
    async fn set_clears_ttl() {
        let store = KvStore::new();
        store.set("k".to_string(), "v".to_string());
        assert_eq!(store.expire("k", 1), 1);
        store.set("k".to_string(), "fresh".to_string());

        tokio::time::sleep(Duration::from_millis(1200)).await;
        assert_eq!(store.get("k"), Some("fresh".to_string()));
    }

    #[test]
    fn non_positive_ttl_expires_immediately() {
        let store = KvStore::new();
        store.set("a".to_string(), "1".to_string());
        store.set("b".to_string(), "2".to_string());
        assert_eq!(store.expire("a", 0), 1);
        assert_eq!(store.expire("b", -3), 1);
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(store.get("a"), None);
        assert_eq!(store.get("b"), None);
    }

    #[test]
    fn concurrent_writers_on_different_keys() {
        let store = KvStore::new();
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for i in 0..500 {
                        store.set(format!("t{t}-k{i}"), format!("v{i}"));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        for t in 0..8 {
            for i in 0..500 {
                assert_eq!(store.get(&format!("t{t}-k{i}")), Some(format!("v{i}")));
            }
        }
    }
}
