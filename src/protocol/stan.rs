use std::sync::atomic::{AtomicU32, Ordering};

pub const MAX_STAN: u32 = 999_999;

/// System trace audit number source.
///
/// Values cycle through `1..=999_999`; the counter never yields 0. It does
/// not track which numbers are still outstanding, so after a full cycle a
/// number may be reused.
#[derive(Debug)]
pub struct StanCounter {
    // Last value handed out; 0 means none yet.
    current: AtomicU32,
}

impl Default for StanCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl StanCounter {
    pub fn new() -> Self {
        Self {
            current: AtomicU32::new(0),
        }
    }

    /// Resumes a sequence so that the next call to [`StanCounter::next`]
    /// returns `first` (clamped into range).
    pub fn starting_at(first: u32) -> Self {
        let first = first.clamp(1, MAX_STAN);
        Self {
            current: AtomicU32::new(first - 1),
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn next(&self) -> u32 {
        let previous = self
            .current
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                Some(advance(current))
            })
            .unwrap_or_else(|current| current);
        advance(previous)
    }

    /// Last value returned by [`StanCounter::next`], if any.
    pub fn peek(&self) -> Option<u32> {
        match self.current.load(Ordering::Acquire) {
            0 => None,
            stan => Some(stan),
        }
    }
}

fn advance(current: u32) -> u32 {
    if current >= MAX_STAN { 1 } else { current + 1 }
}
