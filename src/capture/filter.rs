//! Path filter and enable switch
//!
//! Read on every request. Exclusions live in an `ArcSwap` snapshot so the hot
//! path never waits on an administrative update; a request racing with an
//! update may observe the previous set.

use arc_swap::ArcSwap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Prefixes excluded from capture regardless of configuration
pub const DEFAULT_EXCLUDED_PATHS: &[&str] = &["/favicon.ico", "/health"];

/// Capture gate: a set of excluded path prefixes plus a global switch
#[derive(Debug)]
pub struct PathFilter {
    enabled: AtomicBool,
    excludes: ArcSwap<Vec<String>>,
}

impl PathFilter {
    pub fn new(enabled: bool, excludes: Vec<String>) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
            excludes: ArcSwap::from_pointee(dedup(excludes)),
        }
    }

    /// Default exclusion set: the layer's own base path, `/health` and
    /// `/favicon.ico`, followed by `extra`.
    pub fn with_defaults(enabled: bool, base_path: &str, extra: &[String]) -> Self {
        let mut excludes = Vec::with_capacity(DEFAULT_EXCLUDED_PATHS.len() + extra.len() + 1);
        excludes.push(base_path.to_string());
        excludes.extend(DEFAULT_EXCLUDED_PATHS.iter().map(|p| p.to_string()));
        excludes.extend(extra.iter().cloned());
        Self::new(enabled, excludes)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
        tracing::info!(enabled, "Request capture switched");
    }

    /// Flip the switch and return the new state.
    pub fn toggle(&self) -> bool {
        let enabled = !self.enabled.fetch_xor(true, Ordering::Relaxed);
        tracing::info!(enabled, "Request capture toggled");
        enabled
    }

    /// Prefix match against the current exclusion set
    pub fn is_excluded(&self, path: &str) -> bool {
        self.excludes
            .load()
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()))
    }

    /// Whether a request to `path` should be captured
    pub fn should_capture(&self, path: &str) -> bool {
        self.is_enabled() && !self.is_excluded(path)
    }

    pub fn excludes(&self) -> Vec<String> {
        self.excludes.load().as_ref().clone()
    }

    /// Add a prefix. Returns false if it was already present.
    pub fn add_exclude(&self, path: impl Into<String>) -> bool {
        let path = path.into();
        let mut added = false;
        self.excludes.rcu(|current| {
            let mut next = current.as_ref().clone();
            added = !next.contains(&path);
            if added {
                next.push(path.clone());
            }
            next
        });
        added
    }

    /// Remove a prefix. Returns false if it was not present.
    pub fn remove_exclude(&self, path: &str) -> bool {
        let mut removed = false;
        self.excludes.rcu(|current| {
            let mut next = current.as_ref().clone();
            let before = next.len();
            next.retain(|p| p != path);
            removed = next.len() != before;
            next
        });
        removed
    }

    /// Replace the whole exclusion set.
    pub fn set_excludes(&self, paths: Vec<String>) {
        self.excludes.store(Arc::new(dedup(paths)));
    }
}

fn dedup(paths: Vec<String>) -> Vec<String> {
    let mut unique: Vec<String> = Vec::with_capacity(paths.len());
    for path in paths {
        if !path.is_empty() && !unique.contains(&path) {
            unique.push(path);
        }
    }
    unique
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter() -> PathFilter {
        PathFilter::with_defaults(true, "/reqtrail", &[])
    }

    #[test]
    fn test_default_exclusions() {
        let filter = filter();
        assert!(filter.is_excluded("/reqtrail"));
        assert!(filter.is_excluded("/reqtrail/api/list"));
        assert!(filter.is_excluded("/health"));
        assert!(filter.is_excluded("/favicon.ico"));
        assert!(!filter.is_excluded("/users/42"));
        assert_eq!(filter.excludes().len(), 3);
    }

    #[test]
    fn test_prefix_match() {
        let filter = PathFilter::new(true, vec!["/static".to_string()]);
        assert!(filter.is_excluded("/static/app.js"));
        assert!(filter.is_excluded("/staticfiles"));
        assert!(!filter.is_excluded("/api/static"));
    }

    #[test]
    fn test_add_and_remove() {
        let filter = filter();

        assert!(filter.add_exclude("/internal"));
        assert!(!filter.add_exclude("/internal"));
        assert!(filter.is_excluded("/internal/jobs"));

        assert!(filter.remove_exclude("/internal"));
        assert!(!filter.remove_exclude("/internal"));
        assert!(!filter.is_excluded("/internal/jobs"));
    }

    #[test]
    fn test_set_excludes_replaces_defaults() {
        let filter = filter();
        filter.set_excludes(vec!["/a".to_string(), "/a".to_string(), String::new()]);

        assert_eq!(filter.excludes(), vec!["/a".to_string()]);
        assert!(!filter.is_excluded("/health"));
    }

    #[test]
    fn test_toggle() {
        let filter = filter();
        assert!(filter.should_capture("/users"));

        assert!(!filter.toggle());
        assert!(!filter.is_enabled());
        assert!(!filter.should_capture("/users"));

        assert!(filter.toggle());
        assert!(filter.should_capture("/users"));
    }

    #[test]
    fn test_concurrent_readers_and_writers() {
        let filter = Arc::new(filter());

        let writers: Vec<_> = (0..4)
            .map(|i| {
                let filter = filter.clone();
                std::thread::spawn(move || {
                    for j in 0..100 {
                        let path = format!("/w{i}/{j}");
                        filter.add_exclude(path.clone());
                        filter.remove_exclude(&path);
                    }
                })
            })
            .collect();

        for _ in 0..1000 {
            assert!(filter.is_excluded("/health"));
        }

        for writer in writers {
            writer.join().unwrap();
        }
        assert_eq!(filter.excludes().len(), 3);
    }
}
