#![deny(unsafe_code)]

//! The feed load pipeline: list artifacts, fetch each one, skip the ones
//! already applied, apply the rest, stamp the run.
//!
//! Fencing is content-addressed: an artifact id is its upstream name plus
//! a digest prefix, so a renamed-but-identical file is still new and a
//! re-listed identical file is still a no-op. `force` clears the fence
//! first and reprocesses the lot.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use daims_model::cancel::CancelToken;

use crate::diff::DiffCounts;
use crate::error::{ReferenceError, Result};
use crate::hash::sha256_hex_file;
use crate::locks::FeedLocks;
use crate::stamps::LoadWindow;
use crate::store::ReferenceStore;
use crate::throttle::{Clock, RetryPolicy, RollingWindowLimiter};

/// One artifact as listed upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactRef {
    pub name: String,
    pub updated: Option<chrono::DateTime<chrono::Utc>>,
}

/// An artifact brought local, with its digest.
#[derive(Debug, Clone)]
pub struct FetchedArtifact {
    pub reference: ArtifactRef,
    pub local_path: PathBuf,
    pub sha256: String,
}

impl FetchedArtifact {
    /// Fencing id: upstream name plus a digest prefix.
    pub fn artifact_id(&self) -> String {
        let prefix = self.sha256.get(..12).unwrap_or(&self.sha256);
        format!("{}@{prefix}", self.reference.name)
    }
}

/// Where artifacts come from. Listing and fetching are the retryable
/// edges; everything after the bytes are local is not.
pub trait ArtifactSource {
    fn list(&self) -> Result<Vec<ArtifactRef>>;
    fn fetch(&self, artifact: &ArtifactRef) -> Result<FetchedArtifact>;
}

/// Source over a local directory of already-downloaded artifacts.
#[derive(Debug, Clone)]
pub struct LocalDirSource {
    root: PathBuf,
}

impl LocalDirSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ArtifactSource for LocalDirSource {
    fn list(&self) -> Result<Vec<ArtifactRef>> {
        let entries = std::fs::read_dir(&self.root).map_err(|e| ReferenceError::io(&self.root, e))?;
        let mut refs = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| ReferenceError::io(&self.root, e))?;
            let file_type = entry
                .file_type()
                .map_err(|e| ReferenceError::io(entry.path(), e))?;
            if !file_type.is_file() {
                continue;
            }
            let updated = entry
                .metadata()
                .ok()
                .and_then(|meta| meta.modified().ok())
                .map(chrono::DateTime::from);
            refs.push(ArtifactRef {
                name: entry.file_name().to_string_lossy().into_owned(),
                updated,
            });
        }
        refs.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(refs)
    }

    fn fetch(&self, artifact: &ArtifactRef) -> Result<FetchedArtifact> {
        if artifact.name.contains(['/', '\\']) {
            return Err(ReferenceError::InvalidPath {
                path: PathBuf::from(&artifact.name),
                message: "artifact names must be bare file names".to_string(),
            });
        }
        let local_path = self.root.join(&artifact.name);
        if !local_path.is_file() {
            return Err(ReferenceError::UpstreamMissing {
                name: artifact.name.clone(),
            });
        }
        let sha256 = sha256_hex_file(&local_path)?;
        Ok(FetchedArtifact {
            reference: artifact.clone(),
            local_path,
            sha256,
        })
    }
}

/// One feed adapter: parses a fetched artifact and applies it to the store.
pub trait FeedLoader {
    fn feed_key(&self) -> &'static str;
    fn apply(&self, store: &mut ReferenceStore, artifact: &FetchedArtifact) -> Result<DiffCounts>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LoadOptions {
    /// Reprocess artifacts the fence says were already applied.
    pub force: bool,
}

#[derive(Debug)]
pub struct LoadOutcome {
    pub feed: String,
    /// Fencing ids applied this run, in processing order.
    pub applied: Vec<String>,
    /// Fencing ids skipped because they were already applied.
    pub skipped: Vec<String>,
    pub counts: DiffCounts,
    pub window: LoadWindow,
}

/// Drives one feed end to end under its advisory lock.
pub struct LoadRunner<'a> {
    source: &'a dyn ArtifactSource,
    locks: &'a FeedLocks,
    clock: &'a dyn Clock,
    retry: RetryPolicy,
    limiter: Option<&'a RollingWindowLimiter<'a>>,
}

impl<'a> LoadRunner<'a> {
    pub fn new(source: &'a dyn ArtifactSource, locks: &'a FeedLocks, clock: &'a dyn Clock) -> Self {
        Self {
            source,
            locks,
            clock,
            retry: RetryPolicy::default(),
            limiter: None,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Budgets every upstream request through the given limiter.
    pub fn with_limiter(mut self, limiter: &'a RollingWindowLimiter<'a>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    pub fn run(
        &self,
        loader: &dyn FeedLoader,
        store: &mut ReferenceStore,
        cancel: &CancelToken,
        options: LoadOptions,
    ) -> Result<LoadOutcome> {
        let feed = loader.feed_key();
        let _guard = self.locks.acquire(feed)?;
        let started = self.clock.now();
        info!(feed, force = options.force, "loading feed");

        if options.force {
            store.stamps.clear_artifacts(feed);
        }

        self.budget();
        let mut refs = self.retry.run(self.clock, "list", || self.source.list())?;
        refs.sort_by(|a, b| a.name.cmp(&b.name));

        let mut applied = Vec::new();
        let mut skipped = Vec::new();
        let mut counts = DiffCounts::default();

        for reference in refs {
            if cancel.is_cancelled() {
                return Err(ReferenceError::Cancelled);
            }
            self.budget();
            let fetched = self
                .retry
                .run(self.clock, &reference.name, || self.source.fetch(&reference))?;
            let id = fetched.artifact_id();

            if store.stamps.artifact_applied(feed, &id) {
                debug!(feed, artifact = %id, "already applied, skipping");
                skipped.push(id);
                continue;
            }

            let artifact_counts =
                loader
                    .apply(store, &fetched)
                    .map_err(|e| ReferenceError::ArtifactFailed {
                        artifact: id.clone(),
                        message: e.to_string(),
                    })?;
            store.stamps.record_artifact(feed, &id);
            counts.merge(artifact_counts);
            applied.push(id);
        }

        let window = LoadWindow {
            started,
            finished: self.clock.now(),
        };
        store.stamps.record_window(feed, window);
        info!(
            feed,
            applied = applied.len(),
            skipped = skipped.len(),
            inserted = counts.inserted,
            updated = counts.updated,
            deactivated = counts.deactivated,
            "feed load finished"
        );
        Ok(LoadOutcome {
            feed: feed.to_string(),
            applied,
            skipped,
            counts,
            window,
        })
    }

    fn budget(&self) {
        if let Some(limiter) = self.limiter {
            limiter.acquire();
        }
    }
}

/// Convenience for adapters that read the fetched bytes into a string.
pub fn read_artifact_text(artifact: &FetchedArtifact) -> Result<String> {
    read_text(&artifact.local_path)
}

pub(crate) fn read_text(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| ReferenceError::io(path, e))
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    use chrono::{DateTime, Duration, Utc};

    use super::*;
    use crate::throttle::Clock;

    struct TestClock {
        now: Mutex<DateTime<Utc>>,
    }

    impl TestClock {
        fn new() -> Self {
            Self {
                now: Mutex::new("2017-01-01T00:00:00Z".parse().unwrap()),
            }
        }
    }

    impl Clock for TestClock {
        fn now(&self) -> DateTime<Utc> {
            *self.now.lock().unwrap()
        }

        fn sleep(&self, duration: std::time::Duration) {
            let mut now = self.now.lock().unwrap();
            *now += Duration::from_std(duration).unwrap();
        }
    }

    /// Applies every artifact as one inserted row into a counter.
    struct CountingLoader;

    impl FeedLoader for CountingLoader {
        fn feed_key(&self) -> &'static str {
            "test_feed"
        }

        fn apply(
            &self,
            _store: &mut ReferenceStore,
            _artifact: &FetchedArtifact,
        ) -> Result<DiffCounts> {
            Ok(DiffCounts {
                inserted: 1,
                ..DiffCounts::default()
            })
        }
    }

    struct FailingLoader;

    impl FeedLoader for FailingLoader {
        fn feed_key(&self) -> &'static str {
            "test_feed"
        }

        fn apply(
            &self,
            _store: &mut ReferenceStore,
            _artifact: &FetchedArtifact,
        ) -> Result<DiffCounts> {
            Err(ReferenceError::Csv {
                path: PathBuf::from("bad.csv"),
                message: "ran off the end".to_string(),
            })
        }
    }

    fn seeded_source() -> (tempfile::TempDir, LocalDirSource) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b_second.csv"), "b").unwrap();
        std::fs::write(dir.path().join("a_first.csv"), "a").unwrap();
        let source = LocalDirSource::new(dir.path());
        (dir, source)
    }

    #[test]
    fn artifacts_apply_in_name_order_and_fence() {
        let (_dir, source) = seeded_source();
        let locks = FeedLocks::new();
        let clock = TestClock::new();
        let runner = LoadRunner::new(&source, &locks, &clock);
        let mut store = ReferenceStore::new();
        let cancel = CancelToken::new();

        let outcome = runner
            .run(&CountingLoader, &mut store, &cancel, LoadOptions::default())
            .unwrap();
        assert_eq!(outcome.applied.len(), 2);
        assert!(outcome.applied[0].starts_with("a_first.csv@"));
        assert!(outcome.applied[1].starts_with("b_second.csv@"));
        assert_eq!(outcome.counts.inserted, 2);
        assert!(store.stamps.window("test_feed").is_some());

        // second run is fenced out entirely
        let second = runner
            .run(&CountingLoader, &mut store, &cancel, LoadOptions::default())
            .unwrap();
        assert!(second.applied.is_empty());
        assert_eq!(second.skipped.len(), 2);
        assert_eq!(second.counts.inserted, 0);
    }

    #[test]
    fn force_reprocesses_fenced_artifacts() {
        let (_dir, source) = seeded_source();
        let locks = FeedLocks::new();
        let clock = TestClock::new();
        let runner = LoadRunner::new(&source, &locks, &clock);
        let mut store = ReferenceStore::new();
        let cancel = CancelToken::new();

        runner
            .run(&CountingLoader, &mut store, &cancel, LoadOptions::default())
            .unwrap();
        let forced = runner
            .run(&CountingLoader, &mut store, &cancel, LoadOptions { force: true })
            .unwrap();
        assert_eq!(forced.applied.len(), 2);
        assert!(forced.skipped.is_empty());
    }

    #[test]
    fn cancellation_stops_before_the_next_artifact() {
        let (_dir, source) = seeded_source();
        let locks = FeedLocks::new();
        let clock = TestClock::new();
        let runner = LoadRunner::new(&source, &locks, &clock);
        let mut store = ReferenceStore::new();
        let cancel = CancelToken::new();
        cancel.cancel();

        let err = runner
            .run(&CountingLoader, &mut store, &cancel, LoadOptions::default())
            .unwrap_err();
        assert!(matches!(err, ReferenceError::Cancelled));
        // a cancelled run leaves no window stamp
        assert!(store.stamps.window("test_feed").is_none());
    }

    #[test]
    fn a_failed_artifact_names_itself() {
        let (_dir, source) = seeded_source();
        let locks = FeedLocks::new();
        let clock = TestClock::new();
        let runner = LoadRunner::new(&source, &locks, &clock);
        let mut store = ReferenceStore::new();
        let cancel = CancelToken::new();

        let err = runner
            .run(&FailingLoader, &mut store, &cancel, LoadOptions::default())
            .unwrap_err();
        match err {
            ReferenceError::ArtifactFailed { artifact, message } => {
                assert!(artifact.starts_with("a_first.csv@"));
                assert!(message.contains("bad.csv"));
            }
            other => panic!("unexpected error: {other}"),
        }
        // nothing was stamped
        assert!(store.stamps.window("test_feed").is_none());
        assert!(!store.stamps.artifact_applied("test_feed", "a_first.csv@"));
    }

    #[test]
    fn transient_list_failures_are_retried() {
        struct FlakySource {
            inner: LocalDirSource,
            failures_left: AtomicU32,
        }

        impl ArtifactSource for FlakySource {
            fn list(&self) -> Result<Vec<ArtifactRef>> {
                if self.failures_left.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                    n.checked_sub(1)
                })
                .is_ok()
                {
                    return Err(ReferenceError::UpstreamUnavailable {
                        message: "connection reset".to_string(),
                    });
                }
                self.inner.list()
            }

            fn fetch(&self, artifact: &ArtifactRef) -> Result<FetchedArtifact> {
                self.inner.fetch(artifact)
            }
        }

        let (_dir, inner) = seeded_source();
        let source = FlakySource {
            inner,
            failures_left: AtomicU32::new(2),
        };
        let locks = FeedLocks::new();
        let clock = TestClock::new();
        let runner = LoadRunner::new(&source, &locks, &clock).with_retry(RetryPolicy {
            max_attempts: 4,
            base_delay: std::time::Duration::from_millis(1),
        });
        let mut store = ReferenceStore::new();
        let cancel = CancelToken::new();

        let outcome = runner
            .run(&CountingLoader, &mut store, &cancel, LoadOptions::default())
            .unwrap();
        assert_eq!(outcome.applied.len(), 2);
    }

    #[test]
    fn local_source_reports_missing_artifacts_as_terminal() {
        let dir = tempfile::tempdir().unwrap();
        let source = LocalDirSource::new(dir.path());
        let err = source
            .fetch(&ArtifactRef {
                name: "nope.csv".to_string(),
                updated: None,
            })
            .unwrap_err();
        assert!(matches!(err, ReferenceError::UpstreamMissing { .. }));
        assert!(!err.is_retryable());
    }

    #[test]
    fn renamed_identical_content_gets_a_fresh_fence_id() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("v1.csv"), "same bytes").unwrap();
        std::fs::write(dir.path().join("v2.csv"), "same bytes").unwrap();
        let source = LocalDirSource::new(dir.path());
        let a = source
            .fetch(&ArtifactRef { name: "v1.csv".into(), updated: None })
            .unwrap();
        let b = source
            .fetch(&ArtifactRef { name: "v2.csv".into(), updated: None })
            .unwrap();
        assert_eq!(a.sha256, b.sha256);
        assert_ne!(a.artifact_id(), b.artifact_id());
    }
}
