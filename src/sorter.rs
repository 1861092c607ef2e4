//! Timestamp ordering across all event sources.
//!
//! Every decoded event, whether it came from an FXT record or from a Perfetto
//! packet inside a blob, is pushed into one [`TraceSorter`]. The sorter hands
//! events back in non-decreasing timestamp order. Events with equal
//! timestamps come out in the order they were pushed.
//!
//! In [`SortingMode::FullSort`] nothing is released until
//! [`TraceSorter::extract_forced`]. In [`SortingMode::Windowed`] an event is
//! released by [`TraceSorter::flush_ready`] once every source has moved past
//! it, or once it falls more than `window_ns` behind the newest timestamp seen.

use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::SorterError;
use crate::events::EventSource;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortingMode {
    #[default]
    FullSort,
    Windowed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SorterState {
    /// Nothing has been released yet.
    Accepting,
    /// Some events have been released; pushes are still accepted.
    Draining,
    /// The forced drain ran. No further pushes.
    Closed,
}

struct Entry<T> {
    ts: i64,
    seq: u64,
    item: T,
}

impl<T> Entry<T> {
    fn key(&self) -> (i64, u64) {
        (self.ts, self.seq)
    }
}

impl<T> PartialEq for Entry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl<T> Eq for Entry<T> {}

impl<T> PartialOrd for Entry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Entry<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

pub struct TraceSorter<T> {
    mode: SortingMode,
    window_ns: i64,
    heap: BinaryHeap<Reverse<Entry<T>>>,
    next_seq: u64,
    watermarks: HashMap<EventSource, i64>,
    last_emitted: Option<i64>,
    state: SorterState,
    late_events: u64,
}

impl<T> TraceSorter<T> {
    pub fn new(mode: SortingMode) -> Self {
        Self::with_window(mode, 0)
    }

    /// A sorter that, in windowed mode, also releases anything more than
    /// `window_ns` older than the newest pushed timestamp. Zero disables the
    /// bound.
    pub fn with_window(mode: SortingMode, window_ns: u64) -> Self {
        Self {
            mode,
            window_ns: i64::try_from(window_ns).unwrap_or(i64::MAX),
            heap: BinaryHeap::new(),
            next_seq: 0,
            watermarks: HashMap::new(),
            last_emitted: None,
            state: SorterState::Accepting,
            late_events: 0,
        }
    }

    pub fn state(&self) -> SorterState {
        self.state
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Pushes in windowed mode that arrived behind an already released event.
    pub fn late_events(&self) -> u64 {
        self.late_events
    }

    pub fn push(&mut self, source: EventSource, ts: i64, item: T) -> Result<(), SorterError> {
        if self.state == SorterState::Closed {
            return Err(SorterError::Closed);
        }
        let watermark = self.watermarks.entry(source).or_insert(ts);
        *watermark = (*watermark).max(ts);

        if let Some(last) = self.last_emitted {
            if ts < last {
                // Still buffered and released on the next flush, out of order.
                debug!(
                    "late event from {} at {} behind released {}",
                    source, ts, last
                );
                self.late_events += 1;
            }
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Reverse(Entry { ts, seq, item }));
        Ok(())
    }

    /// Timestamp at or below which every buffered event is safe to release.
    fn release_bound(&self) -> Option<i64> {
        let min = self.watermarks.values().copied().min()?;
        let max = self.watermarks.values().copied().max()?;
        if self.window_ns > 0 {
            Some(min.max(max.saturating_sub(self.window_ns)))
        } else {
            Some(min)
        }
    }

    /// Release the events that are provably in order. Always empty in
    /// full-sort mode.
    pub fn flush_ready(&mut self) -> Vec<T> {
        if self.mode == SortingMode::FullSort || self.state == SorterState::Closed {
            return Vec::new();
        }
        let Some(bound) = self.release_bound() else {
            return Vec::new();
        };
        let mut out = Vec::new();
        while self.heap.peek().is_some_and(|Reverse(e)| e.ts <= bound) {
            if let Some(Reverse(entry)) = self.heap.pop() {
                self.emit(entry.ts);
                out.push(entry.item);
            }
        }
        if !out.is_empty() {
            self.state = SorterState::Draining;
        }
        out
    }

    /// Release everything still buffered and close the sorter.
    pub fn extract_forced(&mut self) -> Result<Vec<T>, SorterError> {
        if self.state == SorterState::Closed {
            return Err(SorterError::AlreadyDrained);
        }
        self.state = SorterState::Closed;
        let mut out = Vec::with_capacity(self.heap.len());
        while let Some(Reverse(entry)) = self.heap.pop() {
            self.emit(entry.ts);
            out.push(entry.item);
        }
        debug!("forced drain released {} events", out.len());
        Ok(out)
    }

    fn emit(&mut self, ts: i64) {
        self.last_emitted = Some(self.last_emitted.map_or(ts, |last| last.max(ts)));
    }
}
