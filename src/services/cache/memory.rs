use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

use crate::services::cache::client::{CacheClient, CacheError, CacheResult};

#[derive(Debug, Clone)]
enum Value {
    Text(String),
    Counter(u64),
    Members(BTreeSet<String>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// Process-local cache for tests and single-instance deployments.
///
/// Expired keys are dropped lazily on access. Revocations and counters held
/// here are not visible to other processes.
#[derive(Clone, Debug, Default)]
pub struct MemoryCache {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_entries<T>(&self, f: impl FnOnce(&mut HashMap<String, Entry>, Instant) -> T) -> T {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        entries.retain(|_, entry| entry.is_live(now));
        f(&mut entries, now)
    }

    /// Number of live keys. Mostly useful in tests.
    pub fn len(&self) -> usize {
        self.with_entries(|entries, _| entries.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn wrong_type(key: &str) -> CacheError {
    CacheError::InvalidValue(format!("unexpected value type at {key}"))
}

#[async_trait]
impl CacheClient for MemoryCache {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn get_string(&self, key: &str) -> CacheResult<Option<String>> {
        self.with_entries(|entries, _| match entries.get(key).map(|e| &e.value) {
            None => Ok(None),
            Some(Value::Text(s)) => Ok(Some(s.clone())),
            Some(Value::Counter(n)) => Ok(Some(n.to_string())),
            Some(Value::Members(_)) => Err(wrong_type(key)),
        })
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        self.with_entries(|entries, now| {
            entries.insert(
                key.to_string(),
                Entry {
                    value: Value::Text(value.to_string()),
                    expires_at: now + ttl,
                },
            );
            Ok(())
        })
    }

    async fn set_if_absent_with_ttl(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> CacheResult<bool> {
        self.with_entries(|entries, now| {
            if entries.contains_key(key) {
                return Ok(false);
            }
            entries.insert(
                key.to_string(),
                Entry {
                    value: Value::Text(value.to_string()),
                    expires_at: now + ttl,
                },
            );
            Ok(true)
        })
    }

    async fn incr_with_ttl(&self, key: &str, ttl: Duration) -> CacheResult<u64> {
        self.with_entries(|entries, now| {
            let entry = entries.entry(key.to_string()).or_insert(Entry {
                value: Value::Counter(0),
                expires_at: now + ttl,
            });
            entry.expires_at = now + ttl;
            match &mut entry.value {
                Value::Counter(n) => {
                    *n += 1;
                    Ok(*n)
                }
                _ => Err(wrong_type(key)),
            }
        })
    }

    async fn set_max_with_ttl(&self, key: &str, value: i64, ttl: Duration) -> CacheResult<i64> {
        self.with_entries(|entries, now| {
            let current = match entries.get(key).map(|e| &e.value) {
                None => None,
                Some(Value::Text(s)) => Some(s.parse::<i64>().map_err(|_| wrong_type(key))?),
                Some(_) => return Err(wrong_type(key)),
            };
            let stored = current.map_or(value, |c| c.max(value));
            entries.insert(
                key.to_string(),
                Entry {
                    value: Value::Text(stored.to_string()),
                    expires_at: now + ttl,
                },
            );
            Ok(stored)
        })
    }

    async fn del(&self, key: &str) -> CacheResult<u64> {
        self.with_entries(|entries, _| Ok(u64::from(entries.remove(key).is_some())))
    }

    async fn set_add(&self, key: &str, member: &str, ttl: Duration) -> CacheResult<()> {
        self.with_entries(|entries, now| {
            let entry = entries.entry(key.to_string()).or_insert(Entry {
                value: Value::Members(BTreeSet::new()),
                expires_at: now + ttl,
            });
            entry.expires_at = entry.expires_at.max(now + ttl);
            match &mut entry.value {
                Value::Members(set) => {
                    set.insert(member.to_string());
                    Ok(())
                }
                _ => Err(wrong_type(key)),
            }
        })
    }

    async fn set_remove(&self, key: &str, member: &str) -> CacheResult<()> {
        self.with_entries(|entries, _| {
            let empty = match entries.get_mut(key).map(|e| &mut e.value) {
                None => return Ok(()),
                Some(Value::Members(set)) => {
                    set.remove(member);
                    set.is_empty()
                }
                Some(_) => return Err(wrong_type(key)),
            };
            if empty {
                entries.remove(key);
            }
            Ok(())
        })
    }

    async fn set_members(&self, key: &str) -> CacheResult<Vec<String>> {
        self.with_entries(|entries, _| match entries.get(key).map(|e| &e.value) {
            None => Ok(Vec::new()),
            Some(Value::Members(set)) => Ok(set.iter().cloned().collect()),
            Some(_) => Err(wrong_type(key)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_if_absent_only_sets_once() {
        let cache = MemoryCache::new();
        let ttl = Duration::from_secs(60);

        assert!(cache.set_if_absent_with_ttl("k", "1", ttl).await.expect("first"));
        assert!(!cache.set_if_absent_with_ttl("k", "2", ttl).await.expect("second"));
        assert_eq!(
            cache.get_string("k").await.expect("get"),
            Some("1".to_string())
        );
    }

    #[tokio::test]
    async fn incr_counts_from_one() {
        let cache = MemoryCache::new();
        let ttl = Duration::from_secs(60);

        assert_eq!(cache.incr_with_ttl("c", ttl).await.expect("incr"), 1);
        assert_eq!(cache.incr_with_ttl("c", ttl).await.expect("incr"), 2);
        assert_eq!(
            cache.get_string("c").await.expect("get"),
            Some("2".to_string())
        );
    }

    #[tokio::test]
    async fn expired_keys_disappear() {
        let cache = MemoryCache::new();
        cache
            .set_with_ttl("gone", "v", Duration::from_millis(1))
            .await
            .expect("set");
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(cache.get_string("gone").await.expect("get"), None);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn set_members_round_trip() {
        let cache = MemoryCache::new();
        let ttl = Duration::from_secs(60);
        cache.set_add("s", "a", ttl).await.expect("add");
        cache.set_add("s", "b", ttl).await.expect("add");
        cache.set_remove("s", "a").await.expect("remove");

        assert_eq!(
            cache.set_members("s").await.expect("members"),
            vec!["b".to_string()]
        );

        cache.set_remove("s", "b").await.expect("remove");
        assert_eq!(cache.del("s").await.expect("del"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn set_ttl_is_never_shortened() {
        let cache = MemoryCache::new();
        cache
            .set_add("s", "long", Duration::from_secs(3600))
            .await
            .expect("add");
        cache
            .set_add("s", "short", Duration::from_secs(1))
            .await
            .expect("add");

        tokio::time::advance(Duration::from_secs(120)).await;
        assert_eq!(
            cache.set_members("s").await.expect("members"),
            vec!["long".to_string(), "short".to_string()]
        );

        tokio::time::advance(Duration::from_secs(3600)).await;
        assert!(cache.set_members("s").await.expect("members").is_empty());
    }

    #[tokio::test]
    async fn set_max_keeps_the_larger_value() {
        let cache = MemoryCache::new();
        let ttl = Duration::from_secs(60);

        assert_eq!(cache.set_max_with_ttl("m", 20, ttl).await.expect("max"), 20);
        assert_eq!(cache.set_max_with_ttl("m", 10, ttl).await.expect("max"), 20);
        assert_eq!(cache.set_max_with_ttl("m", 30, ttl).await.expect("max"), 30);
        assert_eq!(
            cache.get_string("m").await.expect("get"),
            Some("30".to_string())
        );
    }

    #[tokio::test]
    async fn type_mismatch_is_an_error() {
        let cache = MemoryCache::new();
        cache
            .set_add("s", "a", Duration::from_secs(60))
            .await
            .expect("add");
        assert!(matches!(
            cache.incr_with_ttl("s", Duration::from_secs(60)).await,
            Err(CacheError::InvalidValue(_))
        ));
    }
}
