//! Perfetto blobs embedded in FXT.
//!
//! A blob record of type 3 carries a serialized Perfetto `Trace`. The demuxer
//! walks the top-level `packet` fields of that message lazily and turns track
//! events into [`PerfettoEvent`]s, resolving delta timestamps and interned ids
//! against per-sequence state that lives in [`PerfettoState`] and survives
//! from one blob to the next.
//!
//! The demuxer never sees the sorter. It hands back an iterator and the
//! caller pushes what comes out.

use std::collections::{HashMap, VecDeque};

use perfetto_protos::debug_annotation::DebugAnnotation;
use perfetto_protos::trace_packet::trace_packet::SequenceFlags;
use perfetto_protos::trace_packet::TracePacket;
use perfetto_protos::track_event::track_event::Type;
use perfetto_protos::track_event::TrackEvent;
use protobuf::Message;
use tracing::debug;

use crate::args::{Arg, Variadic};
use crate::error::BlobError;
use crate::fxt::BlobRecord;
use crate::stats::{Stat, Stats};
use crate::strings::{StringId, StringPool};
use crate::translation::{CHROME_HISTOGRAM_HASH_KEY, CHROME_USER_EVENT_HASH_KEY};

/// Tag byte of `Trace.packet` (field 1, length-delimited).
const PACKET_TAG: u8 = 0x0a;
const PACKET_FIELD: u64 = 1;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PerfettoEventKind {
    SliceBegin,
    SliceEnd,
    /// A complete event; `dur` in nanoseconds.
    Complete { dur: i64 },
    Instant,
    Counter { track: StringId, value: f64 },
    /// Thread CPU time in nanoseconds, sampled at the event's timestamp.
    ThreadTime { value: i64 },
}

#[derive(Clone, Debug, PartialEq)]
pub struct PerfettoEvent {
    pub ts: i64,
    pub sequence: u32,
    pub pid: u64,
    pub tid: u64,
    pub category: StringId,
    pub name: StringId,
    pub args: Vec<Arg>,
    pub kind: PerfettoEventKind,
}

/// One item yielded by [`BlobEvents`].
#[derive(Clone, Debug, PartialEq)]
pub enum BlobItem {
    Event(PerfettoEvent),
    Process { pid: u64, name: StringId },
    Thread { pid: u64, tid: u64, name: StringId },
}

#[derive(Debug, Default)]
struct SequenceState {
    thread: Option<(u64, u64)>,
    timestamp_us: Option<i64>,
    thread_time_us: Option<i64>,
    event_names: HashMap<u64, String>,
    categories: HashMap<u64, String>,
    annotation_names: HashMap<u64, String>,
    track_threads: HashMap<u64, (u64, u64)>,
    track_names: HashMap<u64, String>,
}

impl SequenceState {
    fn clear_interned(&mut self) {
        self.event_names.clear();
        self.categories.clear();
        self.annotation_names.clear();
    }
}

/// Per-sequence decoding state, keyed by trusted packet sequence id.
#[derive(Debug, Default)]
pub struct PerfettoState {
    sequences: HashMap<u32, SequenceState>,
}

impl PerfettoState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sequence_count(&self) -> usize {
        self.sequences.len()
    }
}

/// Validate a blob's container and return a lazy iterator over its items.
pub fn decode_blob<'a, 's>(
    record: &BlobRecord<'a>,
    state: &'s mut PerfettoState,
    pool: &'s mut StringPool,
    stats: &'s mut Stats,
) -> Result<BlobEvents<'a, 's>, BlobError> {
    let Some(data) = record.payload.get(..record.declared_size) else {
        return Err(BlobError::SizeMismatch {
            declared: record.declared_size,
            available: record.payload.len(),
        });
    };
    if let Some(&first_byte) = data.first() {
        if first_byte != PACKET_TAG {
            return Err(BlobError::NotATrace { first_byte });
        }
    }
    Ok(BlobEvents {
        data,
        pos: 0,
        state,
        pool,
        stats,
        queue: VecDeque::new(),
        done: false,
    })
}

/// Items of one blob, in packet order. Consumes the payload once.
pub struct BlobEvents<'a, 's> {
    data: &'a [u8],
    pos: usize,
    state: &'s mut PerfettoState,
    pool: &'s mut StringPool,
    stats: &'s mut Stats,
    queue: VecDeque<BlobItem>,
    done: bool,
}

impl Iterator for BlobEvents<'_, '_> {
    type Item = Result<BlobItem, BlobError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.queue.pop_front() {
                return Some(Ok(item));
            }
            if self.done || self.pos >= self.data.len() {
                return None;
            }
            match self.next_packet() {
                Ok(Some(bytes)) => self.handle_packet(bytes),
                Ok(None) => {}
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

impl<'a> BlobEvents<'a, '_> {
    /// Read the next top-level field, returning packet bytes or `None` for a
    /// skipped field.
    fn next_packet(&mut self) -> Result<Option<&'a [u8]>, BlobError> {
        let field_offset = self.pos;
        let tag = self.varint()?;
        let wire_type = (tag & 0x7) as u8;
        let skip = match wire_type {
            0 => {
                self.varint()?;
                0
            }
            1 => 8,
            2 => {
                let len = self.varint()? as usize;
                if tag >> 3 == PACKET_FIELD {
                    return self.take(len).map(Some);
                }
                len
            }
            5 => 4,
            _ => {
                return Err(BlobError::BadWireType {
                    offset: field_offset,
                    wire_type,
                })
            }
        };
        self.take(skip)?;
        Ok(None)
    }

    fn varint(&mut self) -> Result<u64, BlobError> {
        let mut result = 0u64;
        let mut shift = 0;
        loop {
            let Some(&byte) = self.data.get(self.pos) else {
                return Err(BlobError::Truncated { offset: self.pos });
            };
            self.pos += 1;
            result |= ((byte & 0x7f) as u64) << shift;
            if byte & 0x80 == 0 {
                return Ok(result);
            }
            shift += 7;
            if shift >= 64 {
                return Err(BlobError::Truncated { offset: self.pos });
            }
        }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], BlobError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or(BlobError::Truncated { offset: self.pos })?;
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn handle_packet(&mut self, bytes: &[u8]) {
        let packet = match TracePacket::parse_from_bytes(bytes) {
            Ok(packet) => packet,
            Err(e) => {
                debug!("skipping unparsable perfetto packet: {}", e);
                self.stats.increment(Stat::PerfettoPacketInvalid);
                return;
            }
        };
        let sequence_id = packet.trusted_packet_sequence_id();
        let seq = self.state.sequences.entry(sequence_id).or_default();

        if packet.incremental_state_cleared()
            || packet.sequence_flags() & SequenceFlags::SEQ_INCREMENTAL_STATE_CLEARED as u32 != 0
        {
            seq.clear_interned();
        }

        if let Some(interned) = packet.interned_data.as_ref() {
            for c in &interned.event_categories {
                seq.categories.insert(c.iid(), c.name().to_string());
            }
            for n in &interned.event_names {
                seq.event_names.insert(n.iid(), n.name().to_string());
            }
            for n in &interned.debug_annotation_names {
                seq.annotation_names.insert(n.iid(), n.name().to_string());
            }
        }

        if packet.has_thread_descriptor() {
            let td = packet.thread_descriptor();
            let pid = koid(td.pid());
            let tid = koid(td.tid());
            seq.thread = Some((pid, tid));
            if td.has_reference_timestamp_us() {
                seq.timestamp_us = Some(td.reference_timestamp_us());
            }
            if td.has_reference_thread_time_us() {
                seq.thread_time_us = Some(td.reference_thread_time_us());
            }
            let name = self.pool.intern(td.thread_name());
            self.queue.push_back(BlobItem::Thread { pid, tid, name });
        }

        if packet.has_process_descriptor() {
            let pd = packet.process_descriptor();
            let name = self.pool.intern(pd.process_name());
            self.queue.push_back(BlobItem::Process {
                pid: koid(pd.pid()),
                name,
            });
        }

        if packet.has_track_descriptor() {
            let desc = packet.track_descriptor();
            if desc.has_uuid() {
                if let Some(thread) = desc.thread.as_ref() {
                    seq.track_threads
                        .insert(desc.uuid(), (koid(thread.pid()), koid(thread.tid())));
                }
                if desc.has_name() {
                    seq.track_names.insert(desc.uuid(), desc.name().to_string());
                }
            }
        }

        if packet.has_track_event() {
            let packet_ts = packet.has_timestamp().then(|| packet.timestamp() as i64);
            self.handle_track_event(sequence_id, packet_ts, packet.track_event());
        }
    }

    fn handle_track_event(
        &mut self,
        sequence_id: u32,
        packet_ts: Option<i64>,
        event: &TrackEvent,
    ) {
        let Some(seq) = self.state.sequences.get_mut(&sequence_id) else {
            return;
        };
        let stats = &mut *self.stats;
        let pool = &mut *self.pool;

        let ts = if event.has_timestamp_delta_us() {
            match seq.timestamp_us.as_mut() {
                Some(anchor) => match advance_us(anchor, event.timestamp_delta_us()) {
                    Some(ns) => Some(ns),
                    None => return time_overflow(stats, sequence_id, "timestamp"),
                },
                None => None,
            }
        } else if event.has_timestamp_absolute_us() {
            match event.timestamp_absolute_us().checked_mul(1000) {
                Some(ns) => Some(ns),
                None => return time_overflow(stats, sequence_id, "timestamp"),
            }
        } else {
            packet_ts
        };
        let Some(ts) = ts else {
            debug!("track event on sequence {} has no timestamp anchor", sequence_id);
            stats.increment(Stat::PerfettoMissingAnchor);
            return;
        };

        let thread_time = if event.has_thread_time_delta_us() {
            match seq.thread_time_us.as_mut() {
                Some(anchor) => match advance_us(anchor, event.thread_time_delta_us()) {
                    Some(ns) => Some(ns),
                    None => return time_overflow(stats, sequence_id, "thread time"),
                },
                None => {
                    stats.increment(Stat::PerfettoMissingAnchor);
                    None
                }
            }
        } else if event.has_thread_time_absolute_us() {
            match event.thread_time_absolute_us().checked_mul(1000) {
                Some(ns) => Some(ns),
                None => return time_overflow(stats, sequence_id, "thread time"),
            }
        } else {
            None
        };

        let (pid, tid) = event
            .has_track_uuid()
            .then(|| seq.track_threads.get(&event.track_uuid()).copied())
            .flatten()
            .or(seq.thread)
            .unwrap_or_default();

        let legacy = event.legacy_event.as_ref();
        let kind = match legacy.filter(|l| l.has_phase()) {
            Some(legacy) => match u8::try_from(legacy.phase()).map(char::from) {
                Ok('B') => PerfettoEventKind::SliceBegin,
                Ok('E') => PerfettoEventKind::SliceEnd,
                Ok('X') => match legacy.duration_us().checked_mul(1000) {
                    Some(dur) => PerfettoEventKind::Complete { dur },
                    None => return time_overflow(stats, sequence_id, "duration"),
                },
                Ok('I' | 'i' | 'n') => PerfettoEventKind::Instant,
                _ => {
                    debug!("skipping legacy event with phase {}", legacy.phase());
                    stats.increment(Stat::PerfettoPacketInvalid);
                    return;
                }
            },
            None => match event.type_() {
                Type::TYPE_SLICE_BEGIN => PerfettoEventKind::SliceBegin,
                Type::TYPE_SLICE_END => PerfettoEventKind::SliceEnd,
                Type::TYPE_INSTANT => PerfettoEventKind::Instant,
                Type::TYPE_COUNTER => {
                    let uuid = event.track_uuid();
                    let track = match seq.track_names.get(&uuid) {
                        Some(name) => pool.intern(name),
                        None => pool.intern(&format!("counter_{}", uuid)),
                    };
                    let value = if event.has_double_counter_value() {
                        event.double_counter_value()
                    } else {
                        event.counter_value() as f64
                    };
                    PerfettoEventKind::Counter { track, value }
                }
                other => {
                    debug!("skipping track event of type {:?}", other);
                    stats.increment(Stat::PerfettoPacketInvalid);
                    return;
                }
            },
        };

        let name_iid = match legacy.filter(|l| l.has_name_iid()) {
            Some(legacy) => Some(legacy.name_iid()),
            None => event.has_name_iid().then(|| event.name_iid()),
        };
        let name = match name_iid {
            Some(iid) => match seq.event_names.get(&iid) {
                Some(name) => pool.intern(name),
                None => {
                    stats.increment(Stat::PerfettoUnresolvedInterned);
                    StringId::NULL
                }
            },
            None => pool.intern(event.name()),
        };

        let mut categories: Vec<String> = Vec::new();
        for iid in &event.category_iids {
            match seq.categories.get(iid) {
                Some(c) => categories.push(c.clone()),
                None => {
                    stats.increment(Stat::PerfettoUnresolvedInterned);
                    categories.push(format!("unknown({})", iid));
                }
            }
        }
        categories.extend(event.categories.iter().cloned());
        let category = pool.intern(&categories.join(","));

        let mut args = Vec::new();
        for annotation in &event.debug_annotations {
            if let Some(arg) = annotation_arg(annotation, seq, pool, stats) {
                args.push(arg);
            }
        }
        if let Some(sample) = event.chrome_histogram_sample.as_ref() {
            if sample.has_name_hash() {
                args.push(Arg::new(
                    pool.intern(CHROME_HISTOGRAM_HASH_KEY),
                    Variadic::UInt(sample.name_hash()),
                ));
            }
        }
        if let Some(user_event) = event.chrome_user_event.as_ref() {
            if user_event.has_action_hash() {
                args.push(Arg::new(
                    pool.intern(CHROME_USER_EVENT_HASH_KEY),
                    Variadic::UInt(user_event.action_hash()),
                ));
            }
        }

        if let Some(value) = thread_time {
            if !matches!(kind, PerfettoEventKind::Counter { .. }) {
                self.queue.push_back(BlobItem::Event(PerfettoEvent {
                    ts,
                    sequence: sequence_id,
                    pid,
                    tid,
                    category: StringId::NULL,
                    name: StringId::NULL,
                    args: Vec::new(),
                    kind: PerfettoEventKind::ThreadTime { value },
                }));
            }
        }
        self.queue.push_back(BlobItem::Event(PerfettoEvent {
            ts,
            sequence: sequence_id,
            pid,
            tid,
            category,
            name,
            args,
            kind,
        }));
    }
}

/// Moves a microsecond anchor by `delta_us` and returns it in nanoseconds.
/// The anchor is left alone when either step overflows.
fn advance_us(anchor: &mut i64, delta_us: i64) -> Option<i64> {
    let next = anchor.checked_add(delta_us)?;
    let ns = next.checked_mul(1000)?;
    *anchor = next;
    Some(ns)
}

fn time_overflow(stats: &mut Stats, sequence_id: u32, what: &str) {
    debug!("track event on sequence {} has an out of range {}", sequence_id, what);
    stats.increment(Stat::PerfettoPacketInvalid);
}

fn annotation_arg(
    annotation: &DebugAnnotation,
    seq: &SequenceState,
    pool: &mut StringPool,
    stats: &mut Stats,
) -> Option<Arg> {
    let name = if annotation.has_name_iid() {
        match seq.annotation_names.get(&annotation.name_iid()) {
            Some(name) => name.as_str(),
            None => {
                stats.increment(Stat::PerfettoUnresolvedInterned);
                return None;
            }
        }
    } else {
        annotation.name()
    };
    let value = if annotation.has_bool_value() {
        Variadic::Bool(annotation.bool_value())
    } else if annotation.has_uint_value() {
        Variadic::UInt(annotation.uint_value())
    } else if annotation.has_int_value() {
        Variadic::Int(annotation.int_value())
    } else if annotation.has_double_value() {
        Variadic::Real(annotation.double_value())
    } else if annotation.has_string_value() {
        Variadic::String(pool.intern(annotation.string_value()))
    } else if annotation.has_pointer_value() {
        Variadic::Pointer(annotation.pointer_value())
    } else if annotation.has_legacy_json_value() {
        Variadic::String(pool.intern(annotation.legacy_json_value()))
    } else {
        debug!("skipping debug annotation '{}' with no scalar value", name);
        return None;
    };
    Some(Arg::new(pool.intern(&format!("debug.{}", name)), value))
}

fn koid(id: i32) -> u64 {
    u64::try_from(id).unwrap_or_default()
}
