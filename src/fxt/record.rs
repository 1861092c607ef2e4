//! The FXT record decoder.
//!
//! [`decode_next`] consumes exactly one record from a [`WordCursor`] and
//! returns what it decoded. Registration records (strings, threads, provider
//! metadata, tick rate) update the [`DecoderState`] as a side effect.

use tracing::{debug, warn};

use crate::args::{Arg, Variadic};
use crate::error::StructuralError;
use crate::stats::{Stat, Stats};
use crate::strings::{StringId, StringPool};

use super::args::parse_args;
use super::cursor::{RecordReader, WordCursor};
use super::intern::{FxtThread, InternTables};
use super::{
    metadata_type, provider_event, ticks_to_ns, BlobHeader, ContextSwitchHeader, EventHeader,
    KernelObjectHeader, MetadataHeader, RecordHeader, RecordType, StringRecordHeader,
    ThreadRecordHeader, DEFAULT_TICKS_PER_SECOND, KOBJ_TYPE_PROCESS, KOBJ_TYPE_THREAD,
    MAGIC_VALUE,
};

/// Mutable decoding state for one FXT stream.
#[derive(Debug)]
pub struct DecoderState {
    pub tables: InternTables,
    pub ticks_per_second: u64,
}

impl Default for DecoderState {
    fn default() -> Self {
        Self {
            tables: InternTables::new(),
            ticks_per_second: DEFAULT_TICKS_PER_SECOND,
        }
    }
}

impl DecoderState {
    pub fn new() -> Self {
        Self::default()
    }

    fn ticks_to_ns(&self, ticks: u64) -> i64 {
        ticks_to_ns(ticks, self.ticks_per_second)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventKind {
    Instant,
    Counter { id: u64 },
    DurationBegin,
    DurationEnd,
    DurationComplete { end_ts: i64 },
    AsyncBegin { correlation_id: u64 },
    AsyncInstant { correlation_id: u64 },
    AsyncEnd { correlation_id: u64 },
    FlowBegin { flow_id: u64 },
    FlowStep { flow_id: u64 },
    FlowEnd { flow_id: u64 },
}

/// A decoded FXT event record.
#[derive(Clone, Debug, PartialEq)]
pub struct FxtEvent {
    pub ts: i64,
    pub provider: u32,
    pub thread: FxtThread,
    pub category: StringId,
    pub name: StringId,
    pub args: Vec<Arg>,
    pub kind: EventKind,
}

/// A legacy context-switch scheduling record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ContextSwitch {
    pub ts: i64,
    pub provider: u32,
    pub cpu: u32,
    pub outgoing: FxtThread,
    pub outgoing_state: u8,
    pub outgoing_priority: u8,
    pub incoming: FxtThread,
    pub incoming_priority: u8,
}

/// A blob record. The payload is a view into the trace buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlobRecord<'a> {
    pub provider: u32,
    pub name: StringId,
    pub blob_type: u8,
    /// Payload size in bytes as declared by the header.
    pub declared_size: usize,
    /// Everything after the inline name, padding included.
    pub payload: &'a [u8],
}

#[derive(Clone, Debug, PartialEq)]
pub enum DecodedRecord<'a> {
    Event(FxtEvent),
    ContextSwitch(ContextSwitch),
    Blob(BlobRecord<'a>),
    ProcessName { pid: u64, name: StringId },
    ThreadName { pid: Option<u64>, tid: u64, name: StringId },
    /// A registration or metadata record, applied to the decoder state.
    Internal(RecordType),
    /// A record the decoder does not handle, skipped by its declared size.
    Skipped(RecordType),
}

#[derive(Debug, PartialEq)]
pub enum DecodeStep<'a> {
    Record(DecodedRecord<'a>),
    /// The next record extends past the end of a non-final chunk.
    NeedMoreData,
    /// The cursor is exhausted at a record boundary.
    EndOfBuffer,
}

/// Decode one record from `cursor`.
pub fn decode_next<'a>(
    cursor: &mut WordCursor<'a>,
    state: &mut DecoderState,
    pool: &mut StringPool,
    stats: &mut Stats,
) -> Result<DecodeStep<'a>, StructuralError> {
    if cursor.is_empty() {
        return Ok(DecodeStep::EndOfBuffer);
    }
    let offset = cursor.absolute_position();
    let Some(word) = cursor.peek_word() else {
        if !cursor.is_final() {
            return Ok(DecodeStep::NeedMoreData);
        }
        return Err(StructuralError::TruncatedHeader {
            offset,
            remaining: cursor.remaining(),
        });
    };

    let header = RecordHeader(word);
    let declared_words = header.declared_words();
    let remaining_words = cursor.remaining_words();
    if declared_words == 0 || (declared_words > remaining_words && cursor.is_final()) {
        return Err(StructuralError::InvalidLength {
            offset,
            declared_words,
            remaining_words,
        });
    }
    let Some(record) = cursor.take_words(declared_words) else {
        return Ok(DecodeStep::NeedMoreData);
    };

    let kind = header.kind();
    let mut reader = RecordReader::new(record, kind.name());
    reader.word()?;

    let decoded = match kind {
        RecordType::Metadata => decode_metadata(word, &mut reader, state, stats)?,
        RecordType::Initialization => {
            let ticks_per_second = reader.word()?;
            if ticks_per_second == 0 {
                warn!("ignoring initialization record with zero ticks per second");
            } else {
                state.ticks_per_second = ticks_per_second;
            }
            DecodedRecord::Internal(kind)
        }
        RecordType::String => {
            let sh = StringRecordHeader(word);
            let bytes = reader.padded_bytes(sh.len() as usize)?;
            if sh.index() == 0 {
                debug!("ignoring string record with index 0");
            } else {
                state
                    .tables
                    .insert_string(sh.index(), String::from_utf8_lossy(bytes).into_owned());
            }
            DecodedRecord::Internal(kind)
        }
        RecordType::Thread => {
            let th = ThreadRecordHeader(word);
            let pid = reader.word()?;
            let tid = reader.word()?;
            if th.index() == 0 {
                debug!("ignoring thread record with index 0");
            } else {
                state.tables.insert_thread(th.index(), FxtThread { pid, tid });
            }
            DecodedRecord::Internal(kind)
        }
        RecordType::Event => decode_event(word, &mut reader, state, pool, stats)?,
        RecordType::Blob => {
            let bh = BlobHeader(word);
            let name = state.tables.resolve_string(bh.name_ref(), &mut reader, stats)?;
            DecodedRecord::Blob(BlobRecord {
                provider: state.tables.current_provider(),
                name: pool.intern(&name),
                blob_type: bh.blob_type(),
                declared_size: bh.payload_size() as usize,
                payload: reader.rest(),
            })
        }
        RecordType::KernelObject => decode_kernel_object(word, &mut reader, state, pool, stats)?,
        RecordType::Scheduling => decode_scheduling(word, &mut reader, state, stats)?,
        RecordType::Large | RecordType::Other(_) => {
            debug!(
                "skipping {} record of type {} ({} words) at byte {}",
                kind.name(),
                header.record_type(),
                declared_words,
                offset
            );
            stats.increment(Stat::FxtUnknownRecord);
            DecodedRecord::Skipped(kind)
        }
    };
    Ok(DecodeStep::Record(decoded))
}

fn decode_metadata<'a>(
    word: u64,
    reader: &mut RecordReader<'_>,
    state: &mut DecoderState,
    stats: &mut Stats,
) -> Result<DecodedRecord<'a>, StructuralError> {
    let mh = MetadataHeader(word);
    match mh.metadata_type() {
        metadata_type::PROVIDER_INFO => {
            let name = reader.padded_bytes(mh.provider_name_len() as usize)?;
            let name = String::from_utf8_lossy(name).into_owned();
            debug!("provider {} registered as '{}'", mh.provider_id(), name);
            state.tables.register_provider(mh.provider_id(), name);
        }
        metadata_type::PROVIDER_SECTION => {
            state.tables.switch_provider(mh.provider_id());
        }
        metadata_type::PROVIDER_EVENT => {
            if mh.provider_event_id() == provider_event::BUFFER_OVERFLOW {
                warn!(
                    "provider {} overflowed its buffer, records were dropped",
                    mh.provider_id()
                );
                stats.increment(Stat::FxtProviderBufferOverflow);
            }
        }
        metadata_type::TRACE_INFO => {
            // Concatenated traces repeat the magic record mid-stream.
            if mh.trace_info_type() == 0 && mh.magic() != MAGIC_VALUE {
                warn!("trace info record with bad magic {:#x}", mh.magic());
            }
        }
        other => {
            debug!("skipping metadata record of type {}", other);
            stats.increment(Stat::FxtUnknownRecord);
            return Ok(DecodedRecord::Skipped(RecordType::Metadata));
        }
    }
    Ok(DecodedRecord::Internal(RecordType::Metadata))
}

fn decode_event<'a>(
    word: u64,
    reader: &mut RecordReader<'_>,
    state: &mut DecoderState,
    pool: &mut StringPool,
    stats: &mut Stats,
) -> Result<DecodedRecord<'a>, StructuralError> {
    let eh = EventHeader(word);
    let ts = state.ticks_to_ns(reader.word()?);
    let tables = &state.tables;
    let thread = tables.resolve_thread(eh.thread_ref(), reader, stats)?;
    let category = tables.resolve_string(eh.category_ref(), reader, stats)?;
    let name = tables.resolve_string(eh.name_ref(), reader, stats)?;
    let args = parse_args(reader, eh.arg_count() as usize, tables, pool, stats)?;

    let kind = match eh.event_type() {
        0 => EventKind::Instant,
        1 => EventKind::Counter { id: reader.word()? },
        2 => EventKind::DurationBegin,
        3 => EventKind::DurationEnd,
        4 => EventKind::DurationComplete {
            end_ts: state.ticks_to_ns(reader.word()?),
        },
        5 => EventKind::AsyncBegin {
            correlation_id: reader.word()?,
        },
        6 => EventKind::AsyncInstant {
            correlation_id: reader.word()?,
        },
        7 => EventKind::AsyncEnd {
            correlation_id: reader.word()?,
        },
        8 => EventKind::FlowBegin {
            flow_id: reader.word()?,
        },
        9 => EventKind::FlowStep {
            flow_id: reader.word()?,
        },
        10 => EventKind::FlowEnd {
            flow_id: reader.word()?,
        },
        other => {
            debug!("skipping event '{}' with unknown event type {}", name, other);
            stats.increment(Stat::FxtInvalidEvent);
            return Ok(DecodedRecord::Skipped(RecordType::Event));
        }
    };

    Ok(DecodedRecord::Event(FxtEvent {
        ts,
        provider: tables.current_provider(),
        thread,
        category: pool.intern(&category),
        name: pool.intern(&name),
        args,
        kind,
    }))
}

fn decode_kernel_object<'a>(
    word: u64,
    reader: &mut RecordReader<'_>,
    state: &mut DecoderState,
    pool: &mut StringPool,
    stats: &mut Stats,
) -> Result<DecodedRecord<'a>, StructuralError> {
    let kh = KernelObjectHeader(word);
    let koid = reader.word()?;
    let tables = &state.tables;
    let name = tables.resolve_string(kh.name_ref(), reader, stats)?;
    let args = parse_args(reader, kh.arg_count() as usize, tables, pool, stats)?;
    let name = pool.intern(&name);

    match kh.object_type() {
        KOBJ_TYPE_PROCESS => Ok(DecodedRecord::ProcessName { pid: koid, name }),
        KOBJ_TYPE_THREAD => {
            let process_key = pool.find("process");
            let pid = args
                .iter()
                .find(|a| Some(a.key) == process_key)
                .and_then(|a| match a.value {
                    Variadic::UInt(pid) => Some(pid),
                    _ => None,
                });
            Ok(DecodedRecord::ThreadName {
                pid,
                tid: koid,
                name,
            })
        }
        _ => Ok(DecodedRecord::Internal(RecordType::KernelObject)),
    }
}

fn decode_scheduling<'a>(
    word: u64,
    reader: &mut RecordReader<'_>,
    state: &mut DecoderState,
    stats: &mut Stats,
) -> Result<DecodedRecord<'a>, StructuralError> {
    let sh = ContextSwitchHeader(word);
    if sh.sched_type() != 0 {
        debug!("skipping scheduling record of type {}", sh.sched_type());
        stats.increment(Stat::FxtInvalidEvent);
        return Ok(DecodedRecord::Skipped(RecordType::Scheduling));
    }
    let ts = state.ticks_to_ns(reader.word()?);
    let tables = &state.tables;
    let outgoing = tables.resolve_thread(sh.outgoing_thread_ref(), reader, stats)?;
    let incoming = tables.resolve_thread(sh.incoming_thread_ref(), reader, stats)?;
    Ok(DecodedRecord::ContextSwitch(ContextSwitch {
        ts,
        provider: tables.current_provider(),
        cpu: sh.cpu() as u32,
        outgoing,
        outgoing_state: sh.outgoing_state(),
        outgoing_priority: sh.outgoing_priority(),
        incoming,
        incoming_priority: sh.incoming_priority(),
    }))
}
