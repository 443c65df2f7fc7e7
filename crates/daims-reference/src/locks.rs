#![deny(unsafe_code)]

//! Named advisory locks, one per feed key. Loads of the same feed exclude
//! each other; different feeds proceed independently.

use std::collections::BTreeSet;
use std::sync::Mutex;

use crate::error::{ReferenceError, Result};

#[derive(Debug, Default)]
pub struct FeedLocks {
    held: Mutex<BTreeSet<String>>,
}

impl FeedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the named lock or fails immediately when another load of
    /// the same feed holds it.
    pub fn acquire(&self, feed: &str) -> Result<FeedGuard<'_>> {
        let mut held = self.held.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if !held.insert(feed.to_string()) {
            return Err(ReferenceError::FeedLocked { feed: feed.to_string() });
        }
        Ok(FeedGuard { locks: self, feed: feed.to_string() })
    }
}

#[derive(Debug)]
pub struct FeedGuard<'a> {
    locks: &'a FeedLocks,
    feed: String,
}

impl Drop for FeedGuard<'_> {
    fn drop(&mut self) {
        let mut held = self
            .locks
            .held
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        held.remove(&self.feed);
    }
}
