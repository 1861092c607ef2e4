//! Chunked FXT tokenizing.
//!
//! [`FxtTokenizer`] wraps the record decoder with the state needed to accept
//! a trace in pieces: the magic check, the partial record carried over from
//! the previous chunk, and the poisoned flag set by a structural error.

use std::borrow::Cow;

use tracing::{debug, warn};

use crate::error::StructuralError;
use crate::fxt::{decode_next, DecodeStep, DecodedRecord, DecoderState, WordCursor, MAGIC_WORD};
use crate::stats::Stats;
use crate::strings::StringPool;

#[derive(Debug, Default)]
pub struct FxtTokenizer {
    state: DecoderState,
    /// Bytes of a record that straddled the previous chunk boundary.
    pending: Vec<u8>,
    /// Absolute offset of the first byte not yet handed to the decoder.
    offset: usize,
    magic_checked: bool,
    poisoned: bool,
    records: u64,
}

impl FxtTokenizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records decoded so far.
    pub fn records(&self) -> u64 {
        self.records
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Decode every complete record in `chunk`, calling `on_record` for each.
    ///
    /// A record cut off by the end of the chunk is kept and completed by the
    /// next call.
    pub fn parse<F>(
        &mut self,
        chunk: &[u8],
        pool: &mut StringPool,
        stats: &mut Stats,
        on_record: F,
    ) -> Result<(), StructuralError>
    where
        F: FnMut(DecodedRecord<'_>, &mut StringPool, &mut Stats),
    {
        self.feed(chunk, false, pool, stats, on_record)
    }

    /// Decode `data` as the whole remainder of the trace.
    ///
    /// Running out of bytes mid-record is reported directly as a truncated
    /// header or an invalid length.
    pub fn parse_final<F>(
        &mut self,
        data: &[u8],
        pool: &mut StringPool,
        stats: &mut Stats,
        on_record: F,
    ) -> Result<(), StructuralError>
    where
        F: FnMut(DecodedRecord<'_>, &mut StringPool, &mut Stats),
    {
        self.feed(data, true, pool, stats, on_record)
    }

    /// Signal that no more chunks will arrive.
    pub fn notify_end_of_file(&mut self) -> Result<(), StructuralError> {
        if self.poisoned {
            return Err(StructuralError::Poisoned);
        }
        if !self.pending.is_empty() {
            self.poisoned = true;
            let pending_bytes = self.pending.len();
            warn!(
                "trace ended with {} bytes of an incomplete record at byte {}",
                pending_bytes, self.offset
            );
            return Err(StructuralError::TruncatedRecord { pending_bytes });
        }
        debug!("tokenized {} records ({} bytes)", self.records, self.offset);
        Ok(())
    }

    fn feed<F>(
        &mut self,
        chunk: &[u8],
        final_chunk: bool,
        pool: &mut StringPool,
        stats: &mut Stats,
        on_record: F,
    ) -> Result<(), StructuralError>
    where
        F: FnMut(DecodedRecord<'_>, &mut StringPool, &mut Stats),
    {
        if self.poisoned {
            return Err(StructuralError::Poisoned);
        }
        let buffer: Cow<'_, [u8]> = if self.pending.is_empty() {
            Cow::Borrowed(chunk)
        } else {
            let mut joined = std::mem::take(&mut self.pending);
            joined.extend_from_slice(chunk);
            Cow::Owned(joined)
        };

        match self.decode_buffer(&buffer, final_chunk, pool, stats, on_record) {
            Ok(consumed) => {
                self.offset += consumed;
                self.pending = buffer[consumed..].to_vec();
                Ok(())
            }
            Err(e) => {
                warn!("structural error, stopping: {}", e);
                self.poisoned = true;
                Err(e)
            }
        }
    }

    /// Returns the number of bytes consumed from `data`.
    fn decode_buffer<F>(
        &mut self,
        data: &[u8],
        final_chunk: bool,
        pool: &mut StringPool,
        stats: &mut Stats,
        mut on_record: F,
    ) -> Result<usize, StructuralError>
    where
        F: FnMut(DecodedRecord<'_>, &mut StringPool, &mut Stats),
    {
        let mut cursor = WordCursor::with_offset(data, self.offset, final_chunk);
        if !self.magic_checked {
            match cursor.peek_word() {
                Some(MAGIC_WORD) => self.magic_checked = true,
                Some(found) => return Err(StructuralError::BadMagic { found }),
                None if final_chunk && !data.is_empty() => {
                    return Err(StructuralError::TruncatedHeader {
                        offset: self.offset,
                        remaining: data.len(),
                    });
                }
                None => return Ok(0),
            }
        }

        loop {
            match decode_next(&mut cursor, &mut self.state, pool, stats)? {
                DecodeStep::Record(record) => {
                    self.records += 1;
                    on_record(record, pool, stats);
                }
                DecodeStep::NeedMoreData | DecodeStep::EndOfBuffer => break,
            }
        }
        Ok(cursor.position())
    }
}
