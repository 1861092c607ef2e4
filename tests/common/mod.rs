//! Common test utilities for fxt-import integration tests.

#![allow(dead_code)]

use fxt_import::fxt::{BLOB_TYPE_PERFETTO, MAGIC_WORD};

/// Builds an FXT buffer one word at a time.
#[derive(Default)]
pub struct TraceBuilder {
    words: Vec<u64>,
}

/// Pack `s` into little-endian words, zero padded.
pub fn string_words(s: &str) -> Vec<u64> {
    bytes_words(s.as_bytes())
}

pub fn bytes_words(bytes: &[u8]) -> Vec<u64> {
    bytes
        .chunks(8)
        .map(|chunk| {
            let mut word = [0u8; 8];
            word[..chunk.len()].copy_from_slice(chunk);
            u64::from_le_bytes(word)
        })
        .collect()
}

fn inline_ref(s: &str) -> u64 {
    0x8000 | s.len() as u64
}

impl TraceBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// A buffer that starts with the magic record.
    pub fn with_magic() -> Self {
        let mut builder = Self::new();
        builder.word(MAGIC_WORD);
        builder
    }

    pub fn word(&mut self, word: u64) -> &mut Self {
        self.words.push(word);
        self
    }

    /// An event record with an inline thread, inline category and name, and
    /// already encoded argument words.
    #[allow(clippy::too_many_arguments)]
    pub fn event(
        &mut self,
        event_type: u64,
        ts: u64,
        (pid, tid): (u64, u64),
        category: &str,
        name: &str,
        arg_count: u64,
        args: &[u64],
        trailing: &[u64],
    ) -> &mut Self {
        let category_words = string_words(category);
        let name_words = string_words(name);
        let size = 1
            + 1
            + 2
            + category_words.len()
            + name_words.len()
            + args.len()
            + trailing.len();
        let header = 4
            | (size as u64) << 4
            | event_type << 16
            | arg_count << 20
            | inline_ref(category) << 32
            | inline_ref(name) << 48;
        self.word(header).word(ts).word(pid).word(tid);
        self.words.extend(category_words);
        self.words.extend(name_words);
        self.words.extend_from_slice(args);
        self.words.extend_from_slice(trailing);
        self
    }

    pub fn instant(
        &mut self,
        ts: u64,
        thread: (u64, u64),
        category: &str,
        name: &str,
    ) -> &mut Self {
        self.event(0, ts, thread, category, name, 0, &[], &[])
    }

    /// A Perfetto blob record with an inline name.
    pub fn perfetto_blob(&mut self, name: &str, payload: &[u8]) -> &mut Self {
        let name_words = string_words(name);
        let payload_words = bytes_words(payload);
        let size = 1 + name_words.len() + payload_words.len();
        let header = 5
            | (size as u64) << 4
            | inline_ref(name) << 16
            | (payload.len() as u64) << 32
            | (BLOB_TYPE_PERFETTO as u64) << 48;
        self.word(header);
        self.words.extend(name_words);
        self.words.extend(payload_words);
        self
    }

    pub fn bytes(&self) -> Vec<u8> {
        self.words.iter().flat_map(|w| w.to_le_bytes()).collect()
    }
}

/// Words of a uint64 argument with an inline key.
pub fn uint64_arg(key: &str, value: u64) -> Vec<u64> {
    let key_words = string_words(key);
    let size = 1 + key_words.len() + 1;
    let mut words = vec![4 | (size as u64) << 4 | inline_ref(key) << 16];
    words.extend(key_words);
    words.push(value);
    words
}
