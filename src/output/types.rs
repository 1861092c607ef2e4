//! Values handed to the downstream trackers.
//!
//! Names and categories are [`StringId`]s from the session's pool. Arguments
//! arrive already translated.

use crate::args::ArgSet;
use crate::strings::StringId;

/// The timeline an event lands on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Track {
    /// Slices and flows of one thread.
    Thread { pid: u64, tid: u64 },
    /// Thread CPU time counter.
    ThreadCpuTime { pid: u64, tid: u64 },
    /// A named counter scoped to a process.
    ProcessCounter { pid: u64, name: StringId },
    /// Async slices of one correlation id within a process.
    ProcessAsync {
        pid: u64,
        name: StringId,
        correlation_id: u64,
    },
}

/// One slice boundary, or a whole slice when passed to `scoped_slice`.
#[derive(Debug, Clone, PartialEq)]
pub struct SliceData {
    pub ts: i64,
    pub track: Track,
    pub category: StringId,
    pub name: StringId,
    pub args: ArgSet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlowPhase {
    Begin,
    Step,
    End,
}

/// A flow point bound to the slice open on `track` at `ts`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowData {
    pub ts: i64,
    pub track: Track,
    pub flow_id: u64,
    pub phase: FlowPhase,
}

/// A scheduler context switch on one CPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedSwitchData {
    pub ts: i64,
    pub cpu: u32,
    pub prev_pid: u64,
    pub prev_tid: u64,
    pub prev_state: u8,
    pub prev_priority: u8,
    pub next_pid: u64,
    pub next_tid: u64,
    pub next_priority: u8,
}
