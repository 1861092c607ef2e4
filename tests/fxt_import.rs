//! End-to-end imports of hand-built FXT buffers.

mod common;

use std::io::Write;

use common::{uint64_arg, TraceBuilder};
use fxt_import::output::Track;
use fxt_import::translation::{CHROME_HISTOGRAM_HASH_KEY, CHROME_HISTOGRAM_NAME_KEY};
use fxt_import::{
    ImportConfig, ImportSession, InMemorySink, SinkCall, SortingMode, Stat, StructuralError,
    SymbolTables, Variadic,
};
use perfetto_protos::thread_descriptor::ThreadDescriptor;
use perfetto_protos::trace::Trace;
use perfetto_protos::trace_packet::TracePacket;
use perfetto_protos::track_event::TrackEvent;
use protobuf::Message;

fn import(
    data: &[u8],
    symbols: SymbolTables,
) -> (ImportSession, InMemorySink, anyhow::Result<fxt_import::Stats>) {
    let mut session = ImportSession::new(ImportConfig::default(), symbols);
    let mut sink = InMemorySink::new();
    let result = session.import_buffer(data, &mut sink);
    (session, sink, result)
}

#[test]
fn test_corrupted_fxt() {
    let mut trace = TraceBuilder::with_magic();
    // Declares six words, none follow.
    trace.word(4 | (6 << 4));
    let (_, sink, result) = import(&trace.bytes(), SymbolTables::new());
    let err = result.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<StructuralError>(),
        Some(StructuralError::InvalidLength { .. })
    ));
    assert!(sink.calls().is_empty());
}

#[test]
fn test_bad_magic_rejects_buffer() {
    let mut trace = TraceBuilder::new();
    trace.word(0x1234).instant(100, (1, 2), "cat", "name");
    let (_, sink, result) = import(&trace.bytes(), SymbolTables::new());
    assert!(matches!(
        result.unwrap_err().downcast_ref::<StructuralError>(),
        Some(StructuralError::BadMagic { found: 0x1234 })
    ));
    assert!(sink.calls().is_empty());
}

#[test]
fn test_inline_instant_event() {
    let mut trace = TraceBuilder::with_magic();
    trace.instant(1_000, (3, 4), "gfx", "vsync");
    let (session, sink, result) = import(&trace.bytes(), SymbolTables::new());
    assert_eq!(result.unwrap(), fxt_import::Stats::new());

    let calls = sink.calls();
    assert_eq!(calls.len(), 1);
    let SinkCall::ScopedSlice { slice, dur } = &calls[0] else {
        panic!("unexpected call {:?}", calls[0]);
    };
    let pool = session.pool();
    assert_eq!(*dur, 0);
    assert_eq!(slice.ts, 1_000);
    assert_eq!(slice.track, Track::Thread { pid: 3, tid: 4 });
    assert_eq!(pool.get(slice.category), "gfx");
    assert_eq!(pool.get(slice.name), "vsync");
}

#[test]
fn test_unknown_records_counted() {
    let mut trace = TraceBuilder::with_magic();
    // Record types 10 and 11 are not decoded.
    trace
        .word(10 | (2 << 4))
        .word(0)
        .instant(5, (1, 1), "a", "b")
        .word(11 | (1 << 4));
    let (_, sink, result) = import(&trace.bytes(), SymbolTables::new());
    let stats = result.unwrap();
    assert_eq!(stats.get(Stat::FxtUnknownRecord), 2);
    assert_eq!(sink.calls().len(), 1);
}

#[test]
fn test_events_sorted_across_records() {
    let mut trace = TraceBuilder::with_magic();
    trace
        .event(4, 300, (1, 1), "c", "complete", 0, &[], &[450])
        .event(2, 100, (1, 1), "c", "begin", 0, &[], &[])
        .event(3, 200, (1, 1), "c", "end", 0, &[], &[]);
    let (_, sink, result) = import(&trace.bytes(), SymbolTables::new());
    result.unwrap();

    let calls = sink.calls();
    assert!(matches!(calls[0], SinkCall::BeginSlice(_)));
    assert!(matches!(calls[1], SinkCall::EndSlice(_)));
    assert!(matches!(calls[2], SinkCall::ScopedSlice { dur: 150, .. }));
}

#[test]
fn test_complete_event_with_huge_ticks() {
    let mut trace = TraceBuilder::with_magic();
    trace.event(4, 1 << 62, (1, 1), "c", "huge", 0, &[], &[1 << 63]);
    let (_, sink, result) = import(&trace.bytes(), SymbolTables::new());
    result.unwrap();

    let calls = sink.calls();
    assert_eq!(calls.len(), 1);
    let SinkCall::ScopedSlice { slice, dur } = &calls[0] else {
        panic!("unexpected call {:?}", calls[0]);
    };
    assert_eq!(slice.ts, 1 << 62);
    // The end saturates at i64::MAX.
    assert_eq!(*dur, i64::MAX - (1 << 62));
}

#[test]
fn test_symbol_file_resolves_histogram() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, r#"{{ "histograms": {{ "2748": "MyHistogram" }} }}"#).unwrap();
    let symbols = SymbolTables::load(file.path()).unwrap();

    let arg = uint64_arg(CHROME_HISTOGRAM_HASH_KEY, 0xABC);
    let mut trace = TraceBuilder::with_magic();
    trace.event(0, 10, (1, 2), "cat", "sample", 1, &arg, &[]);
    let (session, sink, result) = import(&trace.bytes(), symbols);
    result.unwrap();

    let SinkCall::ScopedSlice { slice, .. } = &sink.calls()[0] else {
        panic!("expected a slice");
    };
    let pool = session.pool();
    let raw_key = pool.find(CHROME_HISTOGRAM_HASH_KEY).unwrap();
    let name_key = pool.find(CHROME_HISTOGRAM_NAME_KEY).unwrap();
    assert_eq!(slice.args.get(raw_key), Some(&Variadic::UInt(0xABC)));
    let Some(Variadic::String(name)) = slice.args.get(name_key) else {
        panic!("histogram name missing");
    };
    assert_eq!(pool.get(*name), "MyHistogram");
}

#[test]
fn test_missing_symbol_file() {
    let dir = tempfile::tempdir().unwrap();
    let err = SymbolTables::load(&dir.path().join("missing.json")).unwrap_err();
    assert!(err.to_string().contains("Failed to read symbol file"));
}

fn thread_packet() -> TracePacket {
    let mut td = ThreadDescriptor::default();
    td.set_pid(15);
    td.set_tid(16);
    td.set_reference_timestamp_us(1000);
    td.set_reference_thread_time_us(2000);
    let mut packet = TracePacket::default();
    packet.set_trusted_packet_sequence_id(1);
    packet.set_incremental_state_cleared(true);
    packet.set_thread_descriptor(td);
    packet
}

fn legacy_packet(phase: char, delta_us: i64, thread_delta_us: i64) -> TracePacket {
    let mut event = TrackEvent::default();
    event.set_timestamp_delta_us(delta_us);
    event.set_thread_time_delta_us(thread_delta_us);
    event.category_iids.push(1);
    let legacy = event.legacy_event.mut_or_insert_default();
    legacy.set_name_iid(1);
    legacy.set_phase(phase as i32);
    let mut packet = TracePacket::default();
    packet.set_trusted_packet_sequence_id(1);
    packet.set_track_event(event);
    packet
}

fn complete_packet() -> TracePacket {
    let mut event = TrackEvent::default();
    event.set_timestamp_absolute_us(1005);
    event.set_thread_time_absolute_us(2003);
    event.category_iids.extend([2, 3]);
    let legacy = event.legacy_event.mut_or_insert_default();
    legacy.set_name_iid(1);
    legacy.set_phase('X' as i32);
    legacy.set_duration_us(23);
    let mut packet = TracePacket::default();
    packet.set_trusted_packet_sequence_id(1);
    packet.set_track_event(event);
    packet
}

#[test]
fn test_fxt_with_protos() {
    let trace = Trace {
        packet: vec![
            thread_packet(),
            complete_packet(),
            legacy_packet('B', 10, 5),
            legacy_packet('E', 10, 5),
        ],
        ..Default::default()
    };
    let payload = trace.write_to_bytes().unwrap();
    let mut fxt = TraceBuilder::with_magic();
    fxt.perfetto_blob("perfetto", &payload);

    let (session, sink, result) = import(&fxt.bytes(), SymbolTables::new());
    let stats = result.unwrap();
    assert_eq!(stats.get(Stat::FxtInvalidBlob), 0);

    let calls = sink.calls();
    assert!(matches!(
        calls[0],
        SinkCall::Thread {
            pid: Some(15),
            tid: 16,
            ..
        }
    ));

    let cpu_time = Track::ThreadCpuTime { pid: 15, tid: 16 };
    let counter = |ts, value| SinkCall::Counter {
        ts,
        value,
        track: cpu_time,
    };
    assert_eq!(calls[1], counter(1_005_000, 2_003_000.0));
    let SinkCall::ScopedSlice { slice, dur } = &calls[2] else {
        panic!("expected complete slice, got {:?}", calls[2]);
    };
    assert_eq!((slice.ts, *dur), (1_005_000, 23_000));
    assert_eq!(session.pool().get(slice.category), "unknown(2),unknown(3)");
    // Absolute times leave the anchors at 1000us and 2000us.
    assert_eq!(calls[3], counter(1_010_000, 2_005_000.0));
    assert!(matches!(&calls[4], SinkCall::BeginSlice(slice) if slice.ts == 1_010_000));
    assert_eq!(calls[5], counter(1_020_000, 2_010_000.0));
    let SinkCall::EndSlice(end) = &calls[6] else {
        panic!("expected end slice, got {:?}", calls[6]);
    };
    assert_eq!(end.ts, 1_020_000);
    assert_eq!(end.track, Track::Thread { pid: 15, tid: 16 });
    assert_eq!(session.pool().get(end.category), "unknown(1)");
    assert!(end.name.is_null());
    assert_eq!(calls.len(), 7);
}

#[test]
fn test_invalid_blob_does_not_stop_stream() {
    let mut fxt = TraceBuilder::with_magic();
    fxt.perfetto_blob("perfetto", &[0x12, 0x00])
        .instant(7, (1, 2), "c", "after");
    let (_, sink, result) = import(&fxt.bytes(), SymbolTables::new());
    let stats = result.unwrap();
    assert_eq!(stats.get(Stat::FxtInvalidBlob), 1);
    assert_eq!(sink.calls().len(), 1);
}

#[test]
fn test_windowed_chunks_match_full_sort() {
    let mut trace = TraceBuilder::with_magic();
    for ts in [10u64, 30, 20, 40, 50] {
        trace.instant(ts, (1, 1), "c", "e");
    }
    let bytes = trace.bytes();

    let (_, full, result) = import(&bytes, SymbolTables::new());
    result.unwrap();

    let config = ImportConfig {
        sorting_mode: SortingMode::Windowed,
        window_ns: 0,
    };
    let mut session = ImportSession::new(config, SymbolTables::new());
    let mut sink = InMemorySink::new();
    for chunk in bytes.chunks(13) {
        session.parse(chunk, &mut sink).unwrap();
    }
    let stats = session.finish(&mut sink).unwrap();

    let ts = |sink: &InMemorySink| -> Vec<i64> {
        sink.calls().iter().filter_map(SinkCall::ts).collect()
    };
    assert_eq!(ts(&full), vec![10, 20, 30, 40, 50]);
    // One provider: 20 arrives after 30 was released.
    assert_eq!(ts(&sink), vec![10, 30, 20, 40, 50]);
    assert_eq!(stats.get(Stat::SorterLateEvent), 1);
}
