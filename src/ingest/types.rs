// src/ingest/types.rs
use serde::{Deserialize, Serialize};

/// One item of a parsed feed. Missing fields are empty strings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FetchedEntry {
    pub title: String,
    pub link: String,
    pub summary: String,
}

/// Ordered entries of one feed, newest-first as published by the feed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedDocument {
    pub entries: Vec<FetchedEntry>,
}

impl FeedDocument {
    pub fn new(entries: Vec<FetchedEntry>) -> Self {
        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Latest entry (first in document order).
    pub fn first(&self) -> Option<&FetchedEntry> {
        self.entries.first()
    }
}
