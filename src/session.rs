//! One trace import.
//!
//! An [`ImportSession`] owns everything scoped to a single trace: the string
//! pool, the FXT tokenizer, the Perfetto sequence state, the sorter and the
//! statistics. Bytes go in through [`ImportSession::parse`]; tracker calls
//! come out on the sink passed alongside.

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::config::ImportConfig;
use crate::error::SorterError;
use crate::events::TraceEvent;
use crate::fxt::{DecodedRecord, BLOB_TYPE_PERFETTO};
use crate::output::TraceSink;
use crate::parser::EventParser;
use crate::perfetto::{decode_blob, BlobItem, PerfettoState};
use crate::sorter::TraceSorter;
use crate::stats::{Stat, Stats};
use crate::strings::{StringId, StringPool};
use crate::symbolize::SymbolTables;
use crate::tokenizer::FxtTokenizer;
use crate::translation::ArgsTranslationTable;

/// Process and thread names. These carry no timestamp and skip the sorter.
#[derive(Debug, Clone, Copy)]
enum NameUpdate {
    Process {
        pid: u64,
        name: StringId,
    },
    Thread {
        pid: Option<u64>,
        tid: u64,
        name: StringId,
    },
}

pub struct ImportSession {
    pool: StringPool,
    stats: Stats,
    tokenizer: FxtTokenizer,
    perfetto: PerfettoState,
    sorter: TraceSorter<TraceEvent>,
    parser: EventParser,
    finished: bool,
}

impl ImportSession {
    pub fn new(config: ImportConfig, symbols: SymbolTables) -> Self {
        let mut pool = StringPool::new();
        let translation = ArgsTranslationTable::new(&mut pool, symbols);
        Self {
            pool,
            stats: Stats::new(),
            tokenizer: FxtTokenizer::new(),
            perfetto: PerfettoState::new(),
            sorter: TraceSorter::with_window(config.sorting_mode, config.window_ns),
            parser: EventParser::new(translation),
            finished: false,
        }
    }

    pub fn pool(&self) -> &StringPool {
        &self.pool
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    /// Feed the next chunk of the trace.
    ///
    /// A structural error stops tokenization for good. Events decoded before
    /// it stay buffered and are still delivered by [`ImportSession::finish`].
    pub fn parse<S: TraceSink + ?Sized>(&mut self, chunk: &[u8], sink: &mut S) -> Result<()> {
        self.feed(chunk, false, sink)
    }

    /// Feed the final piece of the trace.
    pub fn parse_final<S: TraceSink + ?Sized>(&mut self, data: &[u8], sink: &mut S) -> Result<()> {
        self.feed(data, true, sink)
    }

    /// Import a complete in-memory trace and drain it.
    pub fn import_buffer<S: TraceSink + ?Sized>(
        &mut self,
        data: &[u8],
        sink: &mut S,
    ) -> Result<Stats> {
        let parsed = self.parse_final(data, sink);
        let finished = self.finish(sink);
        parsed?;
        finished
    }

    fn feed<S: TraceSink + ?Sized>(
        &mut self,
        chunk: &[u8],
        final_chunk: bool,
        sink: &mut S,
    ) -> Result<()> {
        let Self {
            pool,
            stats,
            tokenizer,
            perfetto,
            sorter,
            ..
        } = self;

        let mut names = Vec::new();
        let mut push_error = None;
        let on_record = |record: DecodedRecord<'_>, pool: &mut StringPool, stats: &mut Stats| {
            let mut push = |event: TraceEvent| {
                if let Err(e) = sorter.push(event.source, event.ts, event) {
                    if push_error.is_none() {
                        push_error = Some(e);
                    }
                }
            };
            match record {
                DecodedRecord::Event(event) => push(event.into()),
                DecodedRecord::ContextSwitch(switch) => push(switch.into()),
                DecodedRecord::ProcessName { pid, name } => {
                    names.push(NameUpdate::Process { pid, name })
                }
                DecodedRecord::ThreadName { pid, tid, name } => {
                    names.push(NameUpdate::Thread { pid, tid, name })
                }
                DecodedRecord::Blob(blob) if blob.blob_type == BLOB_TYPE_PERFETTO => {
                    let mut blob_error = None;
                    match decode_blob(&blob, perfetto, pool, stats) {
                        Ok(items) => {
                            for item in items {
                                match item {
                                    Ok(BlobItem::Event(event)) => push(event.into()),
                                    Ok(BlobItem::Process { pid, name }) => {
                                        names.push(NameUpdate::Process { pid, name })
                                    }
                                    Ok(BlobItem::Thread { pid, tid, name }) => {
                                        names.push(NameUpdate::Thread {
                                            pid: Some(pid),
                                            tid,
                                            name,
                                        })
                                    }
                                    Err(e) => blob_error = Some(e),
                                }
                            }
                        }
                        Err(e) => blob_error = Some(e),
                    }
                    if let Some(e) = blob_error {
                        warn!("dropping rest of blob from provider {}: {}", blob.provider, e);
                        stats.increment(Stat::FxtInvalidBlob);
                    }
                }
                DecodedRecord::Blob(blob) => {
                    debug!("ignoring blob of type {}", blob.blob_type);
                }
                DecodedRecord::Internal(_) | DecodedRecord::Skipped(_) => {}
            }
        };

        let result = if final_chunk {
            tokenizer.parse_final(chunk, pool, stats, on_record)
        } else {
            tokenizer.parse(chunk, pool, stats, on_record)
        };

        for update in names {
            match update {
                NameUpdate::Process { pid, name } => sink.update_process(pid, name)?,
                NameUpdate::Thread { pid, tid, name } => sink.update_thread(pid, tid, name)?,
            }
        }
        if let Some(e) = push_error {
            return Err(e.into());
        }
        self.dispatch_ready(sink)?;
        result?;
        Ok(())
    }

    fn dispatch_ready<S: TraceSink + ?Sized>(&mut self, sink: &mut S) -> Result<()> {
        for event in self.sorter.flush_ready() {
            self.parser
                .parse_event(event, &mut self.pool, &mut self.stats, sink)?;
        }
        Ok(())
    }

    /// Signal end of input, drain the sorter and return the final counters.
    ///
    /// Everything still buffered is dispatched even if the trace turned out
    /// to be truncated; the truncation is reported afterwards.
    pub fn finish<S: TraceSink + ?Sized>(&mut self, sink: &mut S) -> Result<Stats> {
        if self.finished {
            return Err(SorterError::AlreadyDrained.into());
        }
        self.finished = true;

        // A poisoned tokenizer already reported its error from parse.
        let eof = if self.tokenizer.is_poisoned() {
            Ok(())
        } else {
            self.tokenizer.notify_end_of_file()
        };

        for event in self.sorter.extract_forced()? {
            self.parser
                .parse_event(event, &mut self.pool, &mut self.stats, sink)?;
        }
        self.stats
            .add(Stat::SorterLateEvent, self.sorter.late_events());

        info!(
            "imported {} records, {} perfetto sequences, {} strings",
            self.tokenizer.records(),
            self.perfetto.sequence_count(),
            self.pool.len()
        );
        for (stat, value) in self.stats.non_zero() {
            debug!("{}: {}", stat, value);
        }
        eof?;
        Ok(self.stats.clone())
    }
}
