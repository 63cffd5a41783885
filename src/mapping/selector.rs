//! Destination selection policies.
//!
//! A selector picks the first destination to try; the attempt plan then walks
//! the remaining destinations in order, wrapping around, so a retry never hits
//! the same destination twice within one request.

use std::fmt::Debug;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::config::model::SelectorKind;

pub trait DestinationSelector: Send + Sync + Debug {
    /// Index of the first destination to try, in `0..count`. `count` is never 0.
    fn start_index(&self, count: usize) -> usize;

    /// Every destination index, starting at [`start_index`](Self::start_index)
    /// and wrapping around.
    fn plan(&self, count: usize) -> Vec<usize> {
        if count == 0 {
            return Vec::new();
        }
        let start = self.start_index(count) % count;
        (0..count).map(|offset| (start + offset) % count).collect()
    }
}

#[must_use]
pub fn for_kind(kind: SelectorKind) -> Box<dyn DestinationSelector> {
    match kind {
        SelectorKind::RoundRobin => Box::new(RoundRobin::default()),
        SelectorKind::FirstAvailable => Box::new(FirstAvailable),
        SelectorKind::Random => Box::new(Random),
    }
}

/// Rotates the starting destination on every request.
#[derive(Debug, Default)]
pub struct RoundRobin {
    next: AtomicUsize,
}

impl DestinationSelector for RoundRobin {
    fn start_index(&self, count: usize) -> usize {
        self.next.fetch_add(1, Ordering::Relaxed) % count
    }
}

/// Always starts at the first destination; later ones are fallbacks.
#[derive(Debug, Default)]
pub struct FirstAvailable;

impl DestinationSelector for FirstAvailable {
    fn start_index(&self, _count: usize) -> usize {
        0
    }
}

#[derive(Debug, Default)]
pub struct Random;

impl DestinationSelector for Random {
    fn start_index(&self, count: usize) -> usize {
        fastrand::usize(..count)
    }
}
