//! An in-memory [`TraceSink`](crate::output::TraceSink).
//!
//! Every call is stored as a [`SinkCall`] in arrival order. Tests compare the
//! list directly; the command line tool renders it as rows.

use anyhow::Result;
use serde::Serialize;

use crate::output::{
    CounterTracker, FlowData, FlowPhase, FlowTracker, ProcessTracker, SchedSwitchData,
    SchedTracker, SliceData, SliceTracker, Track,
};
use crate::strings::{StringId, StringPool};

#[derive(Debug, Clone, PartialEq)]
pub enum SinkCall {
    BeginSlice(SliceData),
    EndSlice(SliceData),
    ScopedSlice { slice: SliceData, dur: i64 },
    Counter { ts: i64, value: f64, track: Track },
    Process { pid: u64, name: StringId },
    Thread {
        pid: Option<u64>,
        tid: u64,
        name: StringId,
    },
    ContextSwitch(SchedSwitchData),
    Flow(FlowData),
}

/// A rendered [`SinkCall`] with strings resolved.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Row {
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ts: Option<i64>,
    pub track: String,
    pub detail: String,
}

fn render_track(track: &Track, pool: &StringPool) -> String {
    match *track {
        Track::Thread { pid, tid } => format!("thread {pid}/{tid}"),
        Track::ThreadCpuTime { pid, tid } => format!("cpu_time {pid}/{tid}"),
        Track::ProcessCounter { pid, name } => format!("counter {pid} {}", pool.get(name)),
        Track::ProcessAsync {
            pid,
            name,
            correlation_id,
        } => format!("async {pid} {} #{correlation_id}", pool.get(name)),
    }
}

fn render_slice(slice: &SliceData, pool: &StringPool) -> String {
    format!(
        "{}:{}{}",
        pool.get(slice.category),
        pool.get(slice.name),
        slice.args.serialize(pool)
    )
}

impl SinkCall {
    pub fn ts(&self) -> Option<i64> {
        match self {
            SinkCall::BeginSlice(s) | SinkCall::EndSlice(s) => Some(s.ts),
            SinkCall::ScopedSlice { slice, .. } => Some(slice.ts),
            SinkCall::Counter { ts, .. } => Some(*ts),
            SinkCall::ContextSwitch(c) => Some(c.ts),
            SinkCall::Flow(f) => Some(f.ts),
            SinkCall::Process { .. } | SinkCall::Thread { .. } => None,
        }
    }

    pub fn to_row(&self, pool: &StringPool) -> Row {
        let (kind, track, detail) = match self {
            SinkCall::BeginSlice(s) => (
                "begin",
                render_track(&s.track, pool),
                render_slice(s, pool),
            ),
            SinkCall::EndSlice(s) => ("end", render_track(&s.track, pool), render_slice(s, pool)),
            SinkCall::ScopedSlice { slice, dur } => (
                "slice",
                render_track(&slice.track, pool),
                format!("{} dur={dur}", render_slice(slice, pool)),
            ),
            SinkCall::Counter { value, track, .. } => {
                ("counter", render_track(track, pool), format!("{value}"))
            }
            SinkCall::Process { pid, name } => {
                ("process", format!("process {pid}"), pool.get(*name).to_string())
            }
            SinkCall::Thread { pid, tid, name } => {
                let track = match pid {
                    Some(pid) => format!("thread {pid}/{tid}"),
                    None => format!("thread ?/{tid}"),
                };
                ("thread", track, pool.get(*name).to_string())
            }
            SinkCall::ContextSwitch(c) => (
                "sched",
                format!("cpu {}", c.cpu),
                format!(
                    "{}/{} state={} prio={} -> {}/{} prio={}",
                    c.prev_pid,
                    c.prev_tid,
                    c.prev_state,
                    c.prev_priority,
                    c.next_pid,
                    c.next_tid,
                    c.next_priority
                ),
            ),
            SinkCall::Flow(f) => {
                let phase = match f.phase {
                    FlowPhase::Begin => "begin",
                    FlowPhase::Step => "step",
                    FlowPhase::End => "end",
                };
                (
                    "flow",
                    render_track(&f.track, pool),
                    format!("{phase} id={}", f.flow_id),
                )
            }
        };
        Row {
            kind,
            ts: self.ts(),
            track,
            detail,
        }
    }
}

/// Collects every call made on it.
#[derive(Debug, Default)]
pub struct InMemorySink {
    calls: Vec<SinkCall>,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> &[SinkCall] {
        &self.calls
    }

    pub fn rows(&self, pool: &StringPool) -> Vec<Row> {
        self.calls.iter().map(|c| c.to_row(pool)).collect()
    }
}

impl SliceTracker for InMemorySink {
    fn begin_slice(&mut self, slice: SliceData) -> Result<()> {
        self.calls.push(SinkCall::BeginSlice(slice));
        Ok(())
    }

    fn end_slice(&mut self, slice: SliceData) -> Result<()> {
        self.calls.push(SinkCall::EndSlice(slice));
        Ok(())
    }

    fn scoped_slice(&mut self, slice: SliceData, dur: i64) -> Result<()> {
        self.calls.push(SinkCall::ScopedSlice { slice, dur });
        Ok(())
    }
}

impl CounterTracker for InMemorySink {
    fn push_counter(&mut self, ts: i64, value: f64, track: Track) -> Result<()> {
        self.calls.push(SinkCall::Counter { ts, value, track });
        Ok(())
    }
}

impl ProcessTracker for InMemorySink {
    fn update_process(&mut self, pid: u64, name: StringId) -> Result<()> {
        self.calls.push(SinkCall::Process { pid, name });
        Ok(())
    }

    fn update_thread(&mut self, pid: Option<u64>, tid: u64, name: StringId) -> Result<()> {
        self.calls.push(SinkCall::Thread { pid, tid, name });
        Ok(())
    }
}

impl SchedTracker for InMemorySink {
    fn context_switch(&mut self, switch: SchedSwitchData) -> Result<()> {
        self.calls.push(SinkCall::ContextSwitch(switch));
        Ok(())
    }
}

impl FlowTracker for InMemorySink {
    fn flow(&mut self, flow: FlowData) -> Result<()> {
        self.calls.push(SinkCall::Flow(flow));
        Ok(())
    }
}
