//! Short-lived cache of file existence checks.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;

/// Time source, injectable for tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Remembers whether a path exists for `ttl`, so bursts of publishes for the
/// same project hit the file system once.
pub struct FileExistsCache {
    clock: Arc<dyn Clock>,
    ttl: Duration,
    entries: DashMap<PathBuf, (bool, Instant)>,
}

impl FileExistsCache {
    pub fn new(clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            clock,
            ttl,
            entries: DashMap::new(),
        }
    }

    pub async fn exists(&self, path: &Path) -> bool {
        let now = self.clock.now();
        if let Some(entry) = self.entries.get(path)
            && now.duration_since(entry.1) < self.ttl
        {
            return entry.0;
        }
        let exists = tokio::fs::try_exists(path).await.unwrap_or(false);
        self.entries.insert(path.to_path_buf(), (exists, now));
        exists
    }

    /// Record an existence change made by this process.
    pub fn record(&self, path: &Path, exists: bool) {
        self.entries
            .insert(path.to_path_buf(), (exists, self.clock.now()));
    }
}
