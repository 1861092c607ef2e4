//! fxt-import library.
//!
//! Decodes Fuchsia trace format (FXT) buffers, including Perfetto traces
//! embedded as blob records, orders every event by timestamp and hands the
//! result to a set of downstream trackers. Hashed argument values are
//! resolved to names on the way out.
//!
//! # Modules
//!
//! - [`fxt`] - record framing, references and the single-record decoder
//! - [`tokenizer`] - chunked decoding across buffer boundaries
//! - [`perfetto`] - demuxing of embedded Perfetto blobs
//! - [`sorter`] - global timestamp ordering
//! - [`translation`] - hash and native symbol resolution for arguments
//! - [`session`] - one import, tying the above together
//!
//! # Example
//!
//! ```no_run
//! use fxt_import::{ImportConfig, ImportSession, InMemorySink, SymbolTables};
//!
//! let data = std::fs::read("trace.fxt").expect("Failed to read trace");
//! let mut session = ImportSession::new(ImportConfig::default(), SymbolTables::new());
//! let mut sink = InMemorySink::new();
//! let stats = session
//!     .import_buffer(&data, &mut sink)
//!     .expect("Failed to import trace");
//! println!("{} calls, {:?}", sink.calls().len(), stats);
//! ```

pub mod args;
pub mod config;
pub mod error;
pub mod events;
pub mod fxt;
pub mod output;
pub mod parser;
pub mod perfetto;
pub mod record;
pub mod session;
pub mod sorter;
pub mod stats;
pub mod strings;
pub mod symbolize;
pub mod tokenizer;
pub mod translation;

pub use args::{Arg, ArgInserter, ArgSet, UpdatePolicy, Variadic, VariadicType};
pub use config::ImportConfig;
pub use error::{BlobError, SorterError, StructuralError};
pub use output::{SliceData, Track, TraceSink};
pub use record::{InMemorySink, SinkCall};
pub use session::ImportSession;
pub use sorter::{SorterState, SortingMode, TraceSorter};
pub use stats::{Stat, Stats};
pub use strings::{StringId, StringPool};
pub use symbolize::{MappingId, SourceLocation, SymbolTables};
pub use translation::{ArgsTranslationTable, TranslationKind};
