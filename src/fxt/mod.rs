//! Fuchsia trace format (FXT) decoding.
//!
//! An FXT trace is a sequence of little-endian 64-bit words. Each record starts
//! with a header word whose low four bits give the record type and whose next
//! twelve bits give the record size in words, header included. The remaining
//! header bits are record-specific and are described by the `bitfield!`
//! structs below.
//!
//! - [`cursor`]: forward-only word cursor over a borrowed buffer
//! - [`intern`]: per-provider string and thread tables
//! - [`args`]: typed argument lists
//! - [`record`]: the record decoder

pub mod args;
pub mod cursor;
pub mod intern;
pub mod record;

use bitfield::bitfield;

pub use cursor::{RecordReader, WordCursor};
pub use intern::{FxtThread, InternTables};
pub use record::{
    decode_next, BlobRecord, ContextSwitch, DecodeStep, DecodedRecord, DecoderState, EventKind,
    FxtEvent,
};

pub const WORD_SIZE: usize = 8;

/// First word of every FXT trace.
pub const MAGIC_WORD: u64 = 0x0016_5478_4604_0010;
/// The magic value carried by a trace-info metadata record.
pub const MAGIC_VALUE: u32 = 0x1654_7846;

pub const DEFAULT_TICKS_PER_SECOND: u64 = 1_000_000_000;

pub const BLOB_TYPE_PERFETTO: u8 = 3;

pub const KOBJ_TYPE_PROCESS: u8 = 1;
pub const KOBJ_TYPE_THREAD: u8 = 2;

/// Bit 15 of a string ref marks an inline string.
pub const STRING_REF_INLINE_FLAG: u16 = 0x8000;
pub const STRING_REF_LENGTH_MASK: u16 = 0x7fff;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordType {
    Metadata,
    Initialization,
    String,
    Thread,
    Event,
    Blob,
    KernelObject,
    Scheduling,
    Large,
    Other(u8),
}

impl RecordType {
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            0 => RecordType::Metadata,
            1 => RecordType::Initialization,
            2 => RecordType::String,
            3 => RecordType::Thread,
            4 => RecordType::Event,
            5 => RecordType::Blob,
            7 => RecordType::KernelObject,
            8 => RecordType::Scheduling,
            15 => RecordType::Large,
            other => RecordType::Other(other),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            RecordType::Metadata => "metadata",
            RecordType::Initialization => "initialization",
            RecordType::String => "string",
            RecordType::Thread => "thread",
            RecordType::Event => "event",
            RecordType::Blob => "blob",
            RecordType::KernelObject => "kernel object",
            RecordType::Scheduling => "scheduling",
            RecordType::Large => "large",
            RecordType::Other(_) => "unknown",
        }
    }
}

pub mod metadata_type {
    pub const PROVIDER_INFO: u8 = 1;
    pub const PROVIDER_SECTION: u8 = 2;
    pub const PROVIDER_EVENT: u8 = 3;
    pub const TRACE_INFO: u8 = 4;
}

pub mod provider_event {
    pub const BUFFER_OVERFLOW: u8 = 0;
}

bitfield! {
    pub struct RecordHeader(u64);
    impl Debug;
    pub u8, record_type, _: 3, 0;
    pub u16, size_words, _: 15, 4;
    pub u64, large_size_words, _: 35, 4;
}

impl RecordHeader {
    pub fn kind(&self) -> RecordType {
        RecordType::from_raw(self.record_type())
    }

    /// Record size in words, using the wide size field for large records.
    pub fn declared_words(&self) -> usize {
        match self.kind() {
            RecordType::Large => self.large_size_words() as usize,
            _ => self.size_words() as usize,
        }
    }
}

bitfield! {
    pub struct MetadataHeader(u64);
    impl Debug;
    pub u8, metadata_type, _: 19, 16;
    pub u32, provider_id, _: 51, 20;
    pub u8, provider_name_len, _: 59, 52;
    pub u8, provider_event_id, _: 55, 52;
    pub u8, trace_info_type, _: 23, 20;
    pub u32, magic, _: 55, 24;
}

bitfield! {
    pub struct StringRecordHeader(u64);
    impl Debug;
    pub u16, index, _: 30, 16;
    pub u16, len, _: 46, 32;
}

bitfield! {
    pub struct ThreadRecordHeader(u64);
    impl Debug;
    pub u8, index, _: 23, 16;
}

bitfield! {
    pub struct EventHeader(u64);
    impl Debug;
    pub u8, event_type, _: 19, 16;
    pub u8, arg_count, _: 23, 20;
    pub u8, thread_ref, _: 31, 24;
    pub u16, category_ref, _: 47, 32;
    pub u16, name_ref, _: 63, 48;
}

bitfield! {
    pub struct BlobHeader(u64);
    impl Debug;
    pub u16, name_ref, _: 31, 16;
    pub u16, payload_size, _: 46, 32;
    pub u8, blob_type, _: 55, 48;
}

bitfield! {
    pub struct KernelObjectHeader(u64);
    impl Debug;
    pub u8, object_type, _: 23, 16;
    pub u16, name_ref, _: 39, 24;
    pub u8, arg_count, _: 43, 40;
}

bitfield! {
    pub struct ContextSwitchHeader(u64);
    impl Debug;
    pub u16, cpu, _: 23, 16;
    pub u8, outgoing_state, _: 27, 24;
    pub u8, outgoing_thread_ref, _: 35, 28;
    pub u8, incoming_thread_ref, _: 43, 36;
    pub u8, outgoing_priority, _: 51, 44;
    pub u8, incoming_priority, _: 59, 52;
    pub u8, sched_type, _: 63, 60;
}

bitfield! {
    pub struct ArgHeader(u64);
    impl Debug;
    pub u8, arg_type, _: 3, 0;
    pub u16, size_words, _: 15, 4;
    pub u16, name_ref, _: 31, 16;
    pub u32, value32, _: 63, 32;
    pub u16, string_value_ref, _: 47, 32;
    pub bool_value, _: 32;
}

/// Convert FXT ticks to nanoseconds, saturating at `i64::MAX`.
pub fn ticks_to_ns(ticks: u64, ticks_per_second: u64) -> i64 {
    let ns = if ticks_per_second == DEFAULT_TICKS_PER_SECOND || ticks_per_second == 0 {
        ticks as u128
    } else {
        (ticks as u128 * DEFAULT_TICKS_PER_SECOND as u128) / ticks_per_second as u128
    };
    i64::try_from(ns).unwrap_or(i64::MAX)
}

/// Number of words needed to hold `len` bytes.
pub fn words_for(len: usize) -> usize {
    len.div_ceil(WORD_SIZE)
}
