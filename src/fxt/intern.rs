//! Inline and interned references.
//!
//! FXT records refer to strings and threads either inline (the value follows
//! the header) or by a small index registered earlier in the same provider's
//! stream by a string or thread record.

use std::collections::HashMap;

use tracing::debug;

use crate::error::StructuralError;
use crate::stats::{Stat, Stats};

use super::cursor::RecordReader;
use super::{STRING_REF_INLINE_FLAG, STRING_REF_LENGTH_MASK};

/// Process and thread koids of an FXT thread reference.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct FxtThread {
    pub pid: u64,
    pub tid: u64,
}

#[derive(Debug, Default)]
struct ProviderTables {
    name: String,
    strings: HashMap<u16, String>,
    threads: HashMap<u8, FxtThread>,
}

/// String and thread tables, one set per trace provider.
#[derive(Debug)]
pub struct InternTables {
    providers: HashMap<u32, ProviderTables>,
    current: u32,
}

impl Default for InternTables {
    fn default() -> Self {
        Self::new()
    }
}

impl InternTables {
    pub fn new() -> Self {
        let mut providers = HashMap::new();
        providers.insert(0, ProviderTables::default());
        Self {
            providers,
            current: 0,
        }
    }

    pub fn current_provider(&self) -> u32 {
        self.current
    }

    pub fn provider_name(&self, id: u32) -> Option<&str> {
        self.providers.get(&id).map(|p| p.name.as_str())
    }

    /// Start a fresh provider and make it current.
    pub fn register_provider(&mut self, id: u32, name: String) {
        self.providers.insert(
            id,
            ProviderTables {
                name,
                ..Default::default()
            },
        );
        self.current = id;
    }

    /// Switch to a provider's tables, creating empty ones if it is new.
    pub fn switch_provider(&mut self, id: u32) {
        self.providers.entry(id).or_default();
        self.current = id;
    }

    fn tables(&self) -> Option<&ProviderTables> {
        self.providers.get(&self.current)
    }

    fn tables_mut(&mut self) -> &mut ProviderTables {
        self.providers.entry(self.current).or_default()
    }

    /// Register or overwrite an interned string.
    pub fn insert_string(&mut self, index: u16, value: String) {
        self.tables_mut().strings.insert(index, value);
    }

    /// Register or overwrite an interned thread.
    pub fn insert_thread(&mut self, index: u8, thread: FxtThread) {
        self.tables_mut().threads.insert(index, thread);
    }

    pub fn lookup_string(&self, index: u16) -> Option<&str> {
        self.tables()?.strings.get(&index).map(String::as_str)
    }

    pub fn lookup_thread(&self, index: u8) -> Option<FxtThread> {
        self.tables()?.threads.get(&index).copied()
    }

    /// Resolve a 16-bit string ref, reading inline bytes from `reader`.
    ///
    /// Unknown indices resolve to `unknown(<index>)`.
    pub fn resolve_string(
        &self,
        string_ref: u16,
        reader: &mut RecordReader<'_>,
        stats: &mut Stats,
    ) -> Result<String, StructuralError> {
        if string_ref == 0 {
            return Ok(String::new());
        }
        if string_ref & STRING_REF_INLINE_FLAG != 0 {
            let len = (string_ref & STRING_REF_LENGTH_MASK) as usize;
            let bytes = reader.padded_bytes(len)?;
            return Ok(String::from_utf8_lossy(bytes).into_owned());
        }
        match self.lookup_string(string_ref) {
            Some(s) => Ok(s.to_string()),
            None => {
                debug!(
                    "unresolved string index {} for provider {}",
                    string_ref, self.current
                );
                stats.increment(Stat::FxtUnresolvedString);
                Ok(format!("unknown({string_ref})"))
            }
        }
    }

    /// Resolve an 8-bit thread ref, reading the inline koid pair from `reader`.
    pub fn resolve_thread(
        &self,
        thread_ref: u8,
        reader: &mut RecordReader<'_>,
        stats: &mut Stats,
    ) -> Result<FxtThread, StructuralError> {
        if thread_ref == 0 {
            let pid = reader.word()?;
            let tid = reader.word()?;
            return Ok(FxtThread { pid, tid });
        }
        match self.lookup_thread(thread_ref) {
            Some(thread) => Ok(thread),
            None => {
                debug!(
                    "unresolved thread index {} for provider {}",
                    thread_ref, self.current
                );
                stats.increment(Stat::FxtUnresolvedThread);
                Ok(FxtThread::default())
            }
        }
    }
}
