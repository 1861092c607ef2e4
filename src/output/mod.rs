//! Downstream tracker capabilities.
//!
//! The importer never stores anything itself. Every sorted event ends up as a
//! call on one of the narrow traits below, and a [`TraceSink`] is anything
//! that implements all of them. Implementations decide what a call means:
//! [`crate::record::InMemorySink`] records it, a database writer would insert
//! rows.

mod types;

pub use types::*;

use anyhow::Result;

use crate::strings::StringId;

pub trait SliceTracker {
    /// Open a slice on `slice.track`.
    fn begin_slice(&mut self, slice: SliceData) -> Result<()>;

    /// Close the innermost open slice on `slice.track`.
    fn end_slice(&mut self, slice: SliceData) -> Result<()>;

    /// A slice whose duration is already known.
    fn scoped_slice(&mut self, slice: SliceData, dur: i64) -> Result<()>;
}

pub trait CounterTracker {
    fn push_counter(&mut self, ts: i64, value: f64, track: Track) -> Result<()>;
}

pub trait ProcessTracker {
    fn update_process(&mut self, pid: u64, name: StringId) -> Result<()>;

    /// `pid` is `None` when the thread's process is not known yet.
    fn update_thread(&mut self, pid: Option<u64>, tid: u64, name: StringId) -> Result<()>;
}

pub trait SchedTracker {
    fn context_switch(&mut self, switch: SchedSwitchData) -> Result<()>;
}

pub trait FlowTracker {
    fn flow(&mut self, flow: FlowData) -> Result<()>;
}

/// Everything an import session writes to.
pub trait TraceSink: SliceTracker + CounterTracker + ProcessTracker + SchedTracker + FlowTracker {}

impl<T> TraceSink for T where
    T: SliceTracker + CounterTracker + ProcessTracker + SchedTracker + FlowTracker
{
}
