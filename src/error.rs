//! Error types for the import pipeline.
//!
//! Only structural problems surface as errors. Anything that can be papered
//! over with a placeholder is counted in [`crate::stats::Stats`] instead.

use std::fmt;

/// A violation of the FXT record framing. Decoding of the current buffer stops.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StructuralError {
    /// The buffer does not start with the FXT magic word.
    BadMagic { found: u64 },
    /// Fewer than eight bytes remain where a header word is required.
    TruncatedHeader { offset: usize, remaining: usize },
    /// A record declares zero words or more words than the buffer holds.
    InvalidLength {
        offset: usize,
        declared_words: usize,
        remaining_words: usize,
    },
    /// A record's declared size is too small for its mandatory fields.
    RecordTooShort {
        offset: usize,
        kind: &'static str,
        declared_words: usize,
    },
    /// An argument declares zero words or overruns its record.
    InvalidArgument { offset: usize, declared_words: usize },
    /// End of input reached with part of a record still buffered.
    TruncatedRecord { pending_bytes: usize },
    /// A previous structural error already stopped this tokenizer.
    Poisoned,
}

impl fmt::Display for StructuralError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StructuralError::BadMagic { found } => {
                write!(f, "not an FXT trace: first word is {found:#018x}")
            }
            StructuralError::TruncatedHeader { offset, remaining } => {
                write!(
                    f,
                    "truncated header at byte {offset}: {remaining} bytes remain"
                )
            }
            StructuralError::InvalidLength {
                offset,
                declared_words,
                remaining_words,
            } => {
                write!(
                    f,
                    "record at byte {offset} declares {declared_words} words, \
                     {remaining_words} available"
                )
            }
            StructuralError::RecordTooShort {
                offset,
                kind,
                declared_words,
            } => {
                write!(
                    f,
                    "{kind} record at byte {offset} is too short ({declared_words} words)"
                )
            }
            StructuralError::InvalidArgument {
                offset,
                declared_words,
            } => {
                write!(
                    f,
                    "argument at byte {offset} declares {declared_words} words"
                )
            }
            StructuralError::TruncatedRecord { pending_bytes } => {
                write!(
                    f,
                    "trace ended inside a record ({pending_bytes} bytes pending)"
                )
            }
            StructuralError::Poisoned => {
                write!(f, "tokenizer stopped after an earlier structural error")
            }
        }
    }
}

impl std::error::Error for StructuralError {}

/// A problem with one embedded Perfetto blob. The enclosing stream continues.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BlobError {
    /// The declared payload size does not fit in the record.
    SizeMismatch { declared: usize, available: usize },
    /// The payload does not start with a `Trace.packet` field.
    NotATrace { first_byte: u8 },
    /// A packet length or varint runs past the end of the payload.
    Truncated { offset: usize },
    /// A top-level field with a wire type that cannot be skipped.
    BadWireType { offset: usize, wire_type: u8 },
}

impl fmt::Display for BlobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlobError::SizeMismatch {
                declared,
                available,
            } => {
                write!(
                    f,
                    "blob declares {declared} bytes, record holds {available}"
                )
            }
            BlobError::NotATrace { first_byte } => {
                write!(f, "blob is not a Perfetto trace (first byte {first_byte:#04x})")
            }
            BlobError::Truncated { offset } => {
                write!(f, "blob truncated at byte {offset}")
            }
            BlobError::BadWireType { offset, wire_type } => {
                write!(f, "unknown wire type {wire_type} at blob byte {offset}")
            }
        }
    }
}

impl std::error::Error for BlobError {}

/// Misuse of the sorter's state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SorterError {
    /// `push` after `extract_forced`.
    Closed,
    /// `extract_forced` called a second time.
    AlreadyDrained,
}

impl fmt::Display for SorterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SorterError::Closed => write!(f, "sorter is closed"),
            SorterError::AlreadyDrained => write!(f, "sorter was already drained"),
        }
    }
}

impl std::error::Error for SorterError {}
