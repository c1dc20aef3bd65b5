use std::collections::HashSet;

use crate::discovery::SessionFileRef;
use crate::stats::SessionKey;
use crate::stats_cache::ProviderCache;

/// What one provider needs done to bring its cache in line with disk.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcilePlan {
    /// New files, or files whose mtime moved past the cached one
    pub to_reparse: Vec<SessionFileRef>,
    /// Cached keys no longer present on disk
    pub to_evict: Vec<SessionKey>,
    pub reusable: usize,
}

pub fn reconcile(discovered: &[SessionFileRef], cache: &ProviderCache) -> ReconcilePlan {
    let mut plan = ReconcilePlan::default();

    for file in discovered {
        match cache.sessions.get(&file.session_key) {
            Some(cached) if cached.file_mtime_millis >= file.mtime_millis => plan.reusable += 1,
            _ => plan.to_reparse.push(file.clone()),
        }
    }
    plan.to_reparse
        .sort_by(|a, b| a.session_key.cmp(&b.session_key));

    let present: HashSet<&str> = discovered.iter().map(|f| f.session_key.as_str()).collect();
    plan.to_evict = cache
        .sessions
        .keys()
        .filter(|k| !present.contains(k.as_str()))
        .cloned()
        .collect();
    plan
}

/// Drop evicted keys; returns how many were actually removed.
pub fn apply_evictions(cache: &mut ProviderCache, to_evict: &[SessionKey]) -> usize {
    to_evict
        .iter()
        .filter(|k| cache.sessions.remove(k.as_str()).is_some())
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::CachedSessionStats;
    use std::path::PathBuf;

    fn file(key: &str, mtime: i64) -> SessionFileRef {
        SessionFileRef {
            path: PathBuf::from(format!("/logs/{key}.jsonl")),
            session_key: key.to_string(),
            mtime_millis: mtime,
        }
    }

    fn cached(entries: &[(&str, i64)]) -> ProviderCache {
        let mut cache = ProviderCache::default();
        for (k, mtime) in entries {
            cache.sessions.insert(
                k.to_string(),
                CachedSessionStats {
                    file_mtime_millis: *mtime,
                    ..Default::default()
                },
            );
        }
        cache
    }

    #[test]
    fn test_partitions_new_changed_unchanged_and_gone() {
        let cache = cached(&[("same", 100), ("older", 100), ("gone", 100), ("newer", 500)]);
        let discovered = [
            file("same", 100),
            file("older", 101),
            file("fresh", 1),
            file("newer", 400),
        ];

        let plan = reconcile(&discovered, &cache);
        let reparse: Vec<_> = plan.to_reparse.iter().map(|f| f.session_key.as_str()).collect();
        assert_eq!(reparse, vec!["fresh", "older"]);
        assert_eq!(plan.to_evict, vec!["gone".to_string()]);
        // A cached mtime ahead of disk is not "stale"
        assert_eq!(plan.reusable, 2);
    }

    #[test]
    fn test_empty_discovery_evicts_everything() {
        let cache = cached(&[("a", 1), ("b", 2)]);
        let plan = reconcile(&[], &cache);
        assert!(plan.to_reparse.is_empty());
        assert_eq!(plan.to_evict.len(), 2);
    }

    #[test]
    fn test_apply_evictions() {
        let mut cache = cached(&[("a", 1), ("b", 2)]);
        let removed = apply_evictions(&mut cache, &["a".to_string(), "missing".to_string()]);
        assert_eq!(removed, 1);
        assert_eq!(cache.sessions.len(), 1);
        assert!(cache.sessions.contains_key("b"));
    }
}
