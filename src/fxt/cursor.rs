//! Forward-only views over an FXT byte buffer.

use crate::error::StructuralError;

use super::{words_for, WORD_SIZE};

/// A read position in an immutable buffer.
///
/// The cursor never copies the buffer; every read hands back a sub-slice.
/// `offset` is the absolute byte offset of `data[0]` in the trace, used only
/// for error messages.
#[derive(Clone, Copy, Debug)]
pub struct WordCursor<'a> {
    data: &'a [u8],
    pos: usize,
    offset: usize,
    final_chunk: bool,
}

impl<'a> WordCursor<'a> {
    /// A cursor over the whole of the input: running out of bytes is an error.
    pub fn new(data: &'a [u8]) -> Self {
        Self::with_offset(data, 0, true)
    }

    /// A cursor over one chunk of a longer stream. When `final_chunk` is false
    /// a record running past the end is reported as needing more data.
    pub fn with_offset(data: &'a [u8], offset: usize, final_chunk: bool) -> Self {
        Self {
            data,
            pos: 0,
            offset,
            final_chunk,
        }
    }

    pub fn is_final(&self) -> bool {
        self.final_chunk
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    /// Absolute byte offset of the current position.
    pub fn absolute_position(&self) -> usize {
        self.offset + self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn remaining_words(&self) -> usize {
        self.remaining() / WORD_SIZE
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Read the next word without consuming it.
    pub fn peek_word(&self) -> Option<u64> {
        let bytes = self.data.get(self.pos..self.pos + WORD_SIZE)?;
        let mut word = [0u8; WORD_SIZE];
        word.copy_from_slice(bytes);
        Some(u64::from_le_bytes(word))
    }

    pub fn read_word(&mut self) -> Option<u64> {
        let word = self.peek_word()?;
        self.pos += WORD_SIZE;
        Some(word)
    }

    /// Split off the next `words` words as a cursor of their own.
    pub fn take_words(&mut self, words: usize) -> Option<WordCursor<'a>> {
        let len = words.checked_mul(WORD_SIZE)?;
        if len > self.remaining() {
            return None;
        }
        let view = WordCursor {
            data: &self.data[self.pos..self.pos + len],
            pos: 0,
            offset: self.absolute_position(),
            final_chunk: true,
        };
        self.pos += len;
        Some(view)
    }

    /// Read `len` bytes and skip the padding up to the next word boundary.
    pub fn read_padded(&mut self, len: usize) -> Option<&'a [u8]> {
        let padded = words_for(len) * WORD_SIZE;
        if padded > self.remaining() {
            return None;
        }
        let bytes = &self.data[self.pos..self.pos + len];
        self.pos += padded;
        Some(bytes)
    }

    pub fn skip_words(&mut self, words: usize) -> bool {
        match words.checked_mul(WORD_SIZE) {
            Some(len) if len <= self.remaining() => {
                self.pos += len;
                true
            }
            _ => false,
        }
    }

    /// Everything left in the buffer.
    pub fn rest(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }
}

/// Reader over exactly one record's words.
///
/// Reads past the record's declared end are structural errors naming the
/// record kind, since the record cannot be laid out as its kind requires.
#[derive(Debug)]
pub struct RecordReader<'a> {
    cursor: WordCursor<'a>,
    kind: &'static str,
    declared_words: usize,
}

impl<'a> RecordReader<'a> {
    pub fn new(cursor: WordCursor<'a>, kind: &'static str) -> Self {
        let declared_words = cursor.remaining_words();
        Self {
            cursor,
            kind,
            declared_words,
        }
    }

    fn too_short(&self) -> StructuralError {
        StructuralError::RecordTooShort {
            offset: self.cursor.offset,
            kind: self.kind,
            declared_words: self.declared_words,
        }
    }

    pub fn word(&mut self) -> Result<u64, StructuralError> {
        self.cursor.read_word().ok_or_else(|| self.too_short())
    }

    pub fn padded_bytes(&mut self, len: usize) -> Result<&'a [u8], StructuralError> {
        self.cursor.read_padded(len).ok_or_else(|| self.too_short())
    }

    /// Split off a nested item (an argument) of `words` words.
    pub fn sub_reader(
        &mut self,
        words: usize,
        kind: &'static str,
    ) -> Result<RecordReader<'a>, StructuralError> {
        let cursor = self.cursor.take_words(words).ok_or_else(|| self.too_short())?;
        Ok(RecordReader::new(cursor, kind))
    }

    pub fn absolute_position(&self) -> usize {
        self.cursor.absolute_position()
    }

    pub fn peek_word(&self) -> Option<u64> {
        self.cursor.peek_word()
    }

    pub fn remaining_words(&self) -> usize {
        self.cursor.remaining_words()
    }

    pub fn rest(&self) -> &'a [u8] {
        self.cursor.rest()
    }
}
