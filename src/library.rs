use crate::types::{CapturedItem, RawCapture};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

/// The local collection of captured items, kept in insertion order.
///
/// Ids are unique: every way of adding items goes through [`Library::merge`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Library {
    items: Vec<CapturedItem>,
}

/// Outcome of merging one scrape into the library.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeSummary {
    /// Number of records the scraper returned.
    pub scanned: usize,
    /// Number of records that were new and got appended.
    pub added: usize,
    /// Number of records dropped because their id was already present.
    pub duplicates: usize,
}

impl Library {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends every capture whose id is not already stored, dropping repeats inside the batch too.
    pub fn merge(&mut self, captures: impl IntoIterator<Item = RawCapture>) -> MergeSummary {
        let mut seen: HashSet<String> = self.items.iter().map(|i| i.id.clone()).collect();
        let mut summary = MergeSummary::default();

        for capture in captures {
            summary.scanned += 1;
            if seen.insert(capture.id.clone()) {
                self.items.push(capture.into());
                summary.added += 1;
            } else {
                debug!("Skipping duplicate capture {}", capture.id);
                summary.duplicates += 1;
            }
        }

        summary
    }

    /// Removes the item with the given id. Returns the removed item, if any.
    pub fn remove(&mut self, id: &str) -> Option<CapturedItem> {
        let pos = self.items.iter().position(|i| i.id == id)?;
        Some(self.items.remove(pos))
    }

    pub fn get(&self, id: &str) -> Option<&CapturedItem> {
        self.items.iter().find(|i| i.id == id)
    }

    /// Items not yet covered by any report, in storage order.
    pub fn unanalyzed(&self) -> impl Iterator<Item = &CapturedItem> {
        self.items.iter().filter(|i| !i.analyzed)
    }

    /// Flags the given items as analyzed. Ids with no matching item are ignored.
    pub fn mark_analyzed<'a>(&mut self, ids: impl IntoIterator<Item = &'a String>) -> usize {
        let ids: HashSet<&String> = ids.into_iter().collect();
        let mut marked = 0;
        for item in self.items.iter_mut().filter(|i| ids.contains(&i.id)) {
            if !item.analyzed {
                item.analyzed = true;
                marked += 1;
            }
        }
        marked
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &CapturedItem> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
