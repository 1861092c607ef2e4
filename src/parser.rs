//! Turns sorted events into tracker calls.

use anyhow::Result;
use tracing::debug;

use crate::args::{Arg, ArgSet};
use crate::events::{EventPayload, TraceEvent};
use crate::fxt::{ContextSwitch, EventKind, FxtEvent, FxtThread};
use crate::output::{FlowData, FlowPhase, SchedSwitchData, SliceData, Track, TraceSink};
use crate::perfetto::{PerfettoEvent, PerfettoEventKind};
use crate::stats::{Stat, Stats};
use crate::strings::{StringId, StringPool};
use crate::translation::ArgsTranslationTable;

/// Dispatches each sorted event to the sink, translating its arguments.
pub struct EventParser {
    translation: ArgsTranslationTable,
}

impl EventParser {
    pub fn new(translation: ArgsTranslationTable) -> Self {
        Self { translation }
    }

    pub fn parse_event<S: TraceSink + ?Sized>(
        &self,
        event: TraceEvent,
        pool: &mut StringPool,
        stats: &mut Stats,
        sink: &mut S,
    ) -> Result<()> {
        match event.payload {
            EventPayload::Fxt(e) => self.parse_fxt(e, pool, stats, sink),
            EventPayload::ContextSwitch(c) => sink.context_switch(sched_switch(&c)),
            EventPayload::Perfetto(e) => self.parse_perfetto(e, pool, stats, sink),
        }
    }

    fn translate(&self, args: &[Arg], pool: &mut StringPool, stats: &mut Stats) -> ArgSet {
        let mut set = ArgSet::new();
        self.translation.translate_args(args, pool, &mut set, stats);
        set
    }

    fn parse_fxt<S: TraceSink + ?Sized>(
        &self,
        event: FxtEvent,
        pool: &mut StringPool,
        stats: &mut Stats,
        sink: &mut S,
    ) -> Result<()> {
        let FxtThread { pid, tid } = event.thread;
        let thread = Track::Thread { pid, tid };

        let slice = |track: Track, args: ArgSet| SliceData {
            ts: event.ts,
            track,
            category: event.category,
            name: event.name,
            args,
        };
        let async_track = |correlation_id: u64| Track::ProcessAsync {
            pid,
            name: event.name,
            correlation_id,
        };
        let flow = |flow_id: u64, phase: FlowPhase| FlowData {
            ts: event.ts,
            track: thread,
            flow_id,
            phase,
        };

        match event.kind {
            EventKind::Instant => {
                let args = self.translate(&event.args, pool, stats);
                sink.scoped_slice(slice(thread, args), 0)
            }
            EventKind::DurationBegin => {
                let args = self.translate(&event.args, pool, stats);
                sink.begin_slice(slice(thread, args))
            }
            EventKind::DurationEnd => {
                let args = self.translate(&event.args, pool, stats);
                sink.end_slice(slice(thread, args))
            }
            EventKind::DurationComplete { end_ts } => {
                let Some(dur) = end_ts.checked_sub(event.ts) else {
                    debug!(
                        "complete event {} duration out of range: {} to {}",
                        pool.get(event.name),
                        event.ts,
                        end_ts
                    );
                    stats.increment(Stat::FxtInvalidEvent);
                    return Ok(());
                };
                let args = self.translate(&event.args, pool, stats);
                sink.scoped_slice(slice(thread, args), dur)
            }
            EventKind::Counter { id } => {
                for arg in &event.args {
                    let Some(value) = arg.value.as_f64() else {
                        debug!(
                            "counter {} has non-numeric arg {}",
                            pool.get(event.name),
                            pool.get(arg.key)
                        );
                        stats.increment(Stat::FxtInvalidEvent);
                        continue;
                    };
                    let name = counter_name(pool, event.name, arg.key, id);
                    sink.push_counter(event.ts, value, Track::ProcessCounter { pid, name })?;
                }
                Ok(())
            }
            EventKind::AsyncBegin { correlation_id } => {
                let args = self.translate(&event.args, pool, stats);
                sink.begin_slice(slice(async_track(correlation_id), args))
            }
            EventKind::AsyncInstant { correlation_id } => {
                let args = self.translate(&event.args, pool, stats);
                sink.scoped_slice(slice(async_track(correlation_id), args), 0)
            }
            EventKind::AsyncEnd { correlation_id } => {
                let args = self.translate(&event.args, pool, stats);
                sink.end_slice(slice(async_track(correlation_id), args))
            }
            EventKind::FlowBegin { flow_id } => sink.flow(flow(flow_id, FlowPhase::Begin)),
            EventKind::FlowStep { flow_id } => sink.flow(flow(flow_id, FlowPhase::Step)),
            EventKind::FlowEnd { flow_id } => sink.flow(flow(flow_id, FlowPhase::End)),
        }
    }

    fn parse_perfetto<S: TraceSink + ?Sized>(
        &self,
        event: PerfettoEvent,
        pool: &mut StringPool,
        stats: &mut Stats,
        sink: &mut S,
    ) -> Result<()> {
        let (pid, tid) = (event.pid, event.tid);
        match event.kind {
            PerfettoEventKind::ThreadTime { value } => {
                let track = Track::ThreadCpuTime { pid, tid };
                return sink.push_counter(event.ts, value as f64, track);
            }
            PerfettoEventKind::Counter { track, value } => {
                return sink.push_counter(
                    event.ts,
                    value,
                    Track::ProcessCounter { pid, name: track },
                );
            }
            _ => {}
        }

        let slice = SliceData {
            ts: event.ts,
            track: Track::Thread { pid, tid },
            category: event.category,
            name: event.name,
            args: self.translate(&event.args, pool, stats),
        };
        match event.kind {
            PerfettoEventKind::SliceBegin => sink.begin_slice(slice),
            PerfettoEventKind::SliceEnd => sink.end_slice(slice),
            PerfettoEventKind::Complete { dur } => sink.scoped_slice(slice, dur),
            PerfettoEventKind::Instant => sink.scoped_slice(slice, 0),
            PerfettoEventKind::Counter { .. } | PerfettoEventKind::ThreadTime { .. } => Ok(()),
        }
    }
}

/// `<name>:<arg>`, with `:<id>` appended for non-zero counter ids.
fn counter_name(pool: &mut StringPool, name: StringId, key: StringId, id: u64) -> StringId {
    let mut full = format!("{}:{}", pool.get(name), pool.get(key));
    if id != 0 {
        full.push_str(&format!(":{id}"));
    }
    pool.intern(&full)
}

fn sched_switch(c: &ContextSwitch) -> SchedSwitchData {
    SchedSwitchData {
        ts: c.ts,
        cpu: c.cpu,
        prev_pid: c.outgoing.pid,
        prev_tid: c.outgoing.tid,
        prev_state: c.outgoing_state,
        prev_priority: c.outgoing_priority,
        next_pid: c.incoming.pid,
        next_tid: c.incoming.tid,
        next_priority: c.incoming_priority,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args::Variadic;
    use crate::record::{InMemorySink, SinkCall};
    use crate::symbolize::SymbolTables;
    use crate::translation::{CHROME_HISTOGRAM_HASH_KEY, CHROME_HISTOGRAM_NAME_KEY};

    struct Fixture {
        pool: StringPool,
        stats: Stats,
        parser: EventParser,
        sink: InMemorySink,
    }

    impl Fixture {
        fn new() -> Self {
            let mut symbols = SymbolTables::new();
            symbols.add_histogram(0xabc, "MyHistogram");
            let mut pool = StringPool::new();
            let table = ArgsTranslationTable::new(&mut pool, symbols);
            Self {
                pool,
                stats: Stats::new(),
                parser: EventParser::new(table),
                sink: InMemorySink::new(),
            }
        }

        fn fxt(&mut self, kind: EventKind, args: Vec<Arg>) -> TraceEvent {
            FxtEvent {
                ts: 100,
                provider: 0,
                thread: FxtThread { pid: 1, tid: 2 },
                category: self.pool.intern("cat"),
                name: self.pool.intern("ev"),
                args,
                kind,
            }
            .into()
        }

        fn parse(&mut self, event: TraceEvent) {
            self.parser
                .parse_event(event, &mut self.pool, &mut self.stats, &mut self.sink)
                .unwrap();
        }
    }

    #[test]
    fn test_instant_is_zero_length_slice() {
        let mut f = Fixture::new();
        let key = f.pool.intern(CHROME_HISTOGRAM_HASH_KEY);
        let event = f.fxt(EventKind::Instant, vec![Arg::new(key, Variadic::UInt(0xabc))]);
        f.parse(event);

        let calls = f.sink.calls();
        assert_eq!(calls.len(), 1);
        let SinkCall::ScopedSlice { slice, dur } = &calls[0] else {
            panic!("unexpected call {:?}", calls[0]);
        };
        assert_eq!(*dur, 0);
        assert_eq!(slice.track, Track::Thread { pid: 1, tid: 2 });
        assert_eq!(slice.args.len(), 2);
        let name_key = f.pool.find(CHROME_HISTOGRAM_NAME_KEY).unwrap();
        let resolved = f.pool.find("MyHistogram").unwrap();
        assert_eq!(slice.args.get(name_key), Some(&Variadic::String(resolved)));
    }

    #[test]
    fn test_complete_duration() {
        let mut f = Fixture::new();
        let event = f.fxt(EventKind::DurationComplete { end_ts: 350 }, vec![]);
        f.parse(event);
        assert!(matches!(
            f.sink.calls()[0],
            SinkCall::ScopedSlice { dur: 250, .. }
        ));
    }

    #[test]
    fn test_complete_duration_overflow_dropped() {
        let mut f = Fixture::new();
        let mut event = f.fxt(EventKind::DurationComplete { end_ts: i64::MAX }, vec![]);
        if let EventPayload::Fxt(fxt) = &mut event.payload {
            fxt.ts = -2;
        }
        f.parse(event);
        assert!(f.sink.calls().is_empty());
        assert_eq!(f.stats.get(Stat::FxtInvalidEvent), 1);
    }

    #[test]
    fn test_counter_tracks() {
        let mut f = Fixture::new();
        let bytes = f.pool.intern("bytes");
        let label = f.pool.intern("label");
        let text = f.pool.intern("text");
        let event = f.fxt(
            EventKind::Counter { id: 3 },
            vec![
                Arg::new(bytes, Variadic::Int(42)),
                Arg::new(label, Variadic::String(text)),
            ],
        );
        f.parse(event);

        let calls = f.sink.calls();
        assert_eq!(calls.len(), 1);
        let SinkCall::Counter { ts, value, track } = &calls[0] else {
            panic!("unexpected call {:?}", calls[0]);
        };
        assert_eq!((*ts, *value), (100, 42.0));
        let Track::ProcessCounter { pid, name } = *track else {
            panic!("unexpected track {track:?}");
        };
        assert_eq!(pid, 1);
        assert_eq!(f.pool.get(name), "ev:bytes:3");
        assert_eq!(f.stats.get(Stat::FxtInvalidEvent), 1);
    }

    #[test]
    fn test_async_and_flow() {
        let mut f = Fixture::new();
        let begin = f.fxt(EventKind::AsyncBegin { correlation_id: 9 }, vec![]);
        let flow = f.fxt(EventKind::FlowStep { flow_id: 4 }, vec![]);
        f.parse(begin);
        f.parse(flow);

        let ev = f.pool.find("ev").unwrap();
        let SinkCall::BeginSlice(slice) = &f.sink.calls()[0] else {
            panic!("expected begin");
        };
        assert_eq!(
            slice.track,
            Track::ProcessAsync {
                pid: 1,
                name: ev,
                correlation_id: 9
            }
        );
        assert_eq!(
            f.sink.calls()[1],
            SinkCall::Flow(FlowData {
                ts: 100,
                track: Track::Thread { pid: 1, tid: 2 },
                flow_id: 4,
                phase: FlowPhase::Step,
            })
        );
    }

    #[test]
    fn test_perfetto_thread_time() {
        let mut f = Fixture::new();
        let event = PerfettoEvent {
            ts: 1_005_000,
            sequence: 1,
            pid: 5,
            tid: 6,
            category: StringId::NULL,
            name: StringId::NULL,
            args: vec![],
            kind: PerfettoEventKind::ThreadTime { value: 2_003_000 },
        };
        f.parse(event.into());
        assert_eq!(
            f.sink.calls(),
            &[SinkCall::Counter {
                ts: 1_005_000,
                value: 2_003_000.0,
                track: Track::ThreadCpuTime { pid: 5, tid: 6 },
            }]
        );
    }

    #[test]
    fn test_context_switch() {
        let mut f = Fixture::new();
        let switch = ContextSwitch {
            ts: 7,
            provider: 0,
            cpu: 2,
            outgoing: FxtThread { pid: 1, tid: 2 },
            outgoing_state: 3,
            outgoing_priority: 20,
            incoming: FxtThread { pid: 4, tid: 5 },
            incoming_priority: 10,
        };
        f.parse(switch.into());
        let SinkCall::ContextSwitch(data) = f.sink.calls()[0] else {
            panic!("expected context switch");
        };
        assert_eq!((data.cpu, data.prev_tid, data.next_tid), (2, 2, 5));
    }
}
