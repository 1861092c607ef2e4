//! Symbol sources for argument translation.
//!
//! The importer never builds these tables itself. They are handed in by the
//! caller, usually loaded from a JSON symbol file:
//!
//! ```json
//! {
//!   "histograms": { "2748": "MyHistogram" },
//!   "user_events": { "17": "MyAction" },
//!   "performance_mark_sites": {},
//!   "performance_mark_marks": {},
//!   "native_symbols": [
//!     { "mapping_id": 1, "rel_pc": 4096,
//!       "function_name": "mojom::Foo::Bar_Sym::IPCStableHash" }
//!   ]
//! }
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

/// A registered binary or module mapping.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MappingId(pub u32);

/// Where a (mapping, relative pc) pair lands.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub function_name: String,
    pub file_name: Option<String>,
    pub line_number: Option<u32>,
}

#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
struct NativeSymbolEntry {
    mapping_id: u32,
    rel_pc: u64,
    function_name: String,
    file_name: Option<String>,
    line_number: Option<u32>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
struct SymbolFile {
    #[serde(default)]
    histograms: HashMap<u64, String>,
    #[serde(default)]
    user_events: HashMap<u64, String>,
    #[serde(default)]
    performance_mark_sites: HashMap<u64, String>,
    #[serde(default)]
    performance_mark_marks: HashMap<u64, String>,
    #[serde(default)]
    native_symbols: Vec<NativeSymbolEntry>,
}

/// Read-only lookup tables consulted by the translation table.
#[derive(Clone, Debug, Default)]
pub struct SymbolTables {
    histograms: HashMap<u64, String>,
    user_events: HashMap<u64, String>,
    performance_mark_sites: HashMap<u64, String>,
    performance_mark_marks: HashMap<u64, String>,
    native_symbols: HashMap<(MappingId, u64), SourceLocation>,
}

impl SymbolTables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(buf: &str) -> Result<Self> {
        let file: SymbolFile = serde_json::from_str(buf)?;
        let mut tables = SymbolTables {
            histograms: file.histograms,
            user_events: file.user_events,
            performance_mark_sites: file.performance_mark_sites,
            performance_mark_marks: file.performance_mark_marks,
            native_symbols: HashMap::new(),
        };
        for entry in file.native_symbols {
            tables.add_native_symbol(
                MappingId(entry.mapping_id),
                entry.rel_pc,
                SourceLocation {
                    function_name: entry.function_name,
                    file_name: entry.file_name,
                    line_number: entry.line_number,
                },
            );
        }
        Ok(tables)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let buf = fs::read_to_string(path)
            .with_context(|| format!("Failed to read symbol file {}", path.display()))?;
        let tables = Self::from_json(&buf)
            .with_context(|| format!("Failed to parse symbol file {}", path.display()))?;
        info!(
            "loaded {} hash names and {} native symbols from {}",
            tables.hash_count(),
            tables.native_symbols.len(),
            path.display()
        );
        Ok(tables)
    }

    fn hash_count(&self) -> usize {
        self.histograms.len()
            + self.user_events.len()
            + self.performance_mark_sites.len()
            + self.performance_mark_marks.len()
    }

    pub fn add_histogram(&mut self, hash: u64, name: impl Into<String>) {
        self.histograms.insert(hash, name.into());
    }

    pub fn add_user_event(&mut self, hash: u64, action: impl Into<String>) {
        self.user_events.insert(hash, action.into());
    }

    pub fn add_performance_mark_site(&mut self, hash: u64, site: impl Into<String>) {
        self.performance_mark_sites.insert(hash, site.into());
    }

    pub fn add_performance_mark_mark(&mut self, hash: u64, mark: impl Into<String>) {
        self.performance_mark_marks.insert(hash, mark.into());
    }

    pub fn add_native_symbol(&mut self, mapping: MappingId, rel_pc: u64, loc: SourceLocation) {
        self.native_symbols.insert((mapping, rel_pc), loc);
    }

    pub fn histogram(&self, hash: u64) -> Option<&str> {
        self.histograms.get(&hash).map(String::as_str)
    }

    pub fn user_event(&self, hash: u64) -> Option<&str> {
        self.user_events.get(&hash).map(String::as_str)
    }

    pub fn performance_mark_site(&self, hash: u64) -> Option<&str> {
        self.performance_mark_sites.get(&hash).map(String::as_str)
    }

    pub fn performance_mark_mark(&self, hash: u64) -> Option<&str> {
        self.performance_mark_marks.get(&hash).map(String::as_str)
    }

    pub fn native_symbol(&self, mapping: MappingId, rel_pc: u64) -> Option<&SourceLocation> {
        self.native_symbols.get(&(mapping, rel_pc))
    }
}
