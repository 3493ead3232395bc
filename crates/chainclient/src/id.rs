//! Correlation id sources.

use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

/// Produces the id that tags an outbound request.
pub trait IdGenerator: Send + Sync + 'static {
    fn next_id(&self) -> u32;
}

/// Uniformly random ids over the whole `u32` range.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomIds;

impl IdGenerator for RandomIds {
    fn next_id(&self) -> u32 {
        rand::random()
    }
}

/// A deterministic id source that cycles through a fixed list.
#[derive(Debug)]
pub struct SequenceIds {
    ids: Vec<u32>,
    cursor: AtomicUsize,
}

impl SequenceIds {
    /// Cycles through `ids` in order. An empty list always yields `0`.
    pub fn new(ids: impl IntoIterator<Item = u32>) -> Self {
        Self {
            ids: ids.into_iter().collect(),
            cursor: AtomicUsize::new(0),
        }
    }

    /// Always returns `id`.
    pub fn fixed(id: u32) -> Self {
        Self::new([id])
    }
}

impl IdGenerator for SequenceIds {
    fn next_id(&self) -> u32 {
        if self.ids.is_empty() {
            return 0;
        }
        let at = self.cursor.fetch_add(1, Ordering::Relaxed) % self.ids.len();
        self.ids[at]
    }
}
