//! The unit the sorter orders.
//!
//! Both decoding paths produce [`TraceEvent`]s: the FXT record decoder and the
//! Perfetto blob demuxer. Each event remembers which [`EventSource`] produced
//! it so the windowed sorter can track one watermark per source.

use std::fmt;

use crate::fxt::{ContextSwitch, FxtEvent};
use crate::perfetto::PerfettoEvent;

/// An independently timestamped stream within one trace.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventSource {
    /// Records written by one FXT provider.
    Fxt { provider: u32 },
    /// Packets of one Perfetto trusted sequence.
    Perfetto { sequence: u32 },
}

impl fmt::Display for EventSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventSource::Fxt { provider } => write!(f, "fxt provider {provider}"),
            EventSource::Perfetto { sequence } => write!(f, "perfetto sequence {sequence}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum EventPayload {
    Fxt(FxtEvent),
    ContextSwitch(ContextSwitch),
    Perfetto(PerfettoEvent),
}

/// A decoded event waiting in the sorter.
#[derive(Clone, Debug, PartialEq)]
pub struct TraceEvent {
    pub ts: i64,
    pub source: EventSource,
    pub payload: EventPayload,
}

impl From<FxtEvent> for TraceEvent {
    fn from(event: FxtEvent) -> Self {
        Self {
            ts: event.ts,
            source: EventSource::Fxt {
                provider: event.provider,
            },
            payload: EventPayload::Fxt(event),
        }
    }
}

impl From<ContextSwitch> for TraceEvent {
    fn from(event: ContextSwitch) -> Self {
        Self {
            ts: event.ts,
            source: EventSource::Fxt {
                provider: event.provider,
            },
            payload: EventPayload::ContextSwitch(event),
        }
    }
}

impl From<PerfettoEvent> for TraceEvent {
    fn from(event: PerfettoEvent) -> Self {
        Self {
            ts: event.ts,
            source: EventSource::Perfetto {
                sequence: event.sequence,
            },
            payload: EventPayload::Perfetto(event),
        }
    }
}
