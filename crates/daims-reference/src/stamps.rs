#![deny(unsafe_code)]

//! Load stamps: per-feed wall-clock windows and artifact fencing ids.
//!
//! Stamps are serialized with the snapshot so that fencing survives process
//! restarts — the idempotence guarantee spans runs, not just one process.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Wall-clock window of one successful load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadWindow {
    pub started: DateTime<Utc>,
    pub finished: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedStamp {
    pub window: Option<LoadWindow>,
    /// Fencing ids (`name@sha-prefix`) of artifacts already applied.
    #[serde(default)]
    pub applied_artifacts: BTreeSet<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadStamps {
    feeds: BTreeMap<String, FeedStamp>,
}

impl LoadStamps {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_window(&mut self, feed: &str, window: LoadWindow) {
        self.feeds.entry(feed.to_string()).or_default().window = Some(window);
    }

    pub fn record_artifact(&mut self, feed: &str, artifact_id: &str) {
        self.feeds
            .entry(feed.to_string())
            .or_default()
            .applied_artifacts
            .insert(artifact_id.to_string());
    }

    pub fn artifact_applied(&self, feed: &str, artifact_id: &str) -> bool {
        self.feeds
            .get(feed)
            .is_some_and(|stamp| stamp.applied_artifacts.contains(artifact_id))
    }

    pub fn clear_artifacts(&mut self, feed: &str) {
        if let Some(stamp) = self.feeds.get_mut(feed) {
            stamp.applied_artifacts.clear();
        }
    }

    pub fn window(&self, feed: &str) -> Option<LoadWindow> {
        self.feeds.get(feed).and_then(|stamp| stamp.window)
    }

    /// True when the feed has never loaded or its last load finished more
    /// than `max_age` before `now`.
    pub fn is_stale(&self, feed: &str, max_age: Duration, now: DateTime<Utc>) -> bool {
        match self.window(feed) {
            Some(window) => now - window.finished > max_age,
            None => true,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FeedStamp)> {
        self.feeds.iter().map(|(feed, stamp)| (feed.as_str(), stamp))
    }

    pub fn is_empty(&self) -> bool {
        self.feeds.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    #[test]
    fn staleness_gate() {
        let mut stamps = LoadStamps::new();
        let now = at("2017-03-01T12:00:00Z");
        assert!(stamps.is_stale("sam", Duration::days(7), now));

        stamps.record_window(
            "sam",
            LoadWindow { started: at("2017-02-27T01:00:00Z"), finished: at("2017-02-27T02:00:00Z") },
        );
        assert!(!stamps.is_stale("sam", Duration::days(7), now));
        assert!(stamps.is_stale("sam", Duration::days(2), now));
        // other feeds are unaffected
        assert!(stamps.is_stale("usps_zip", Duration::days(7), now));
    }

    #[test]
    fn fencing_ids_round_trip_through_json() {
        let mut stamps = LoadStamps::new();
        stamps.record_artifact("sam", "SAM_20170101@ab12cd34ef56");
        let json = serde_json::to_string(&stamps).unwrap();
        let back: LoadStamps = serde_json::from_str(&json).unwrap();
        assert!(back.artifact_applied("sam", "SAM_20170101@ab12cd34ef56"));
        assert!(!back.artifact_applied("sam", "SAM_20170102@ab12cd34ef56"));
    }
}
