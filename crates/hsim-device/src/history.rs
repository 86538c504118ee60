//! ---
//! hsim_section: "11-simulation"
//! hsim_subsection: "module"
//! hsim_type: "source"
//! hsim_scope: "code"
//! hsim_description: "Bounded history ring for aggregated sensor readings."
//! hsim_version: "v0.1.0"
//! hsim_owner: "tbd"
//! ---
use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// Number of aggregated entries retained per device.
pub const HISTORY_CAPACITY: usize = 200;

/// One aggregated reading, recorded roughly once a minute.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub temperature_c: f64,
    pub water_level: f64,
}

/// Bounded FIFO ring of [`HistoryEntry`] values.
///
/// Insertion order is chronological; once the ring is full every push evicts
/// exactly the oldest entry.
#[derive(Debug, Clone)]
pub struct SampleHistory {
    entries: VecDeque<HistoryEntry>,
    capacity: usize,
}

impl SampleHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append an entry, evicting the oldest when at capacity.
    pub fn push(&mut self, entry: HistoryEntry) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Copy out the current contents, oldest first.
    ///
    /// Later mutation of the ring does not affect a previously returned copy.
    pub fn snapshot(&self) -> Vec<HistoryEntry> {
        self.entries.iter().copied().collect()
    }
}

impl Default for SampleHistory {
    fn default() -> Self {
        Self::new(HISTORY_CAPACITY)
    }
}
