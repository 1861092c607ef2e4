//! Soft-anomaly counters.
//!
//! Nothing counted here aborts an import. Each counter records a place where
//! the importer substituted a placeholder or a raw fallback value so the row
//! could still be produced.

use std::fmt;

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

/// A named statistics counter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stat {
    /// Record of a kind the decoder does not handle; skipped by its size.
    FxtUnknownRecord,
    /// Event record with an unknown event type or unusable payload.
    FxtInvalidEvent,
    /// Argument of an unknown type; skipped by its size.
    FxtInvalidArg,
    /// Interned string index with no registration.
    FxtUnresolvedString,
    /// Interned thread index with no registration.
    FxtUnresolvedThread,
    /// Blob whose embedded container failed validation.
    FxtInvalidBlob,
    /// Provider reported that its buffer filled up and records were dropped.
    FxtProviderBufferOverflow,
    /// Perfetto packet that failed protobuf parsing.
    PerfettoPacketInvalid,
    /// Perfetto delta timestamp with no reference anchor on its sequence.
    PerfettoMissingAnchor,
    /// Perfetto interned id with no matching interned data.
    PerfettoUnresolvedInterned,
    /// Hash argument with no entry in its dictionary.
    ArgsUnresolvedHash,
    /// Mapping id / relative pc pair with no native symbol.
    ArgsUnresolvedNativeSymbol,
    /// Windowed sorter received an event older than one already emitted.
    SorterLateEvent,
}

impl Stat {
    pub const ALL: [Stat; 13] = [
        Stat::FxtUnknownRecord,
        Stat::FxtInvalidEvent,
        Stat::FxtInvalidArg,
        Stat::FxtUnresolvedString,
        Stat::FxtUnresolvedThread,
        Stat::FxtInvalidBlob,
        Stat::FxtProviderBufferOverflow,
        Stat::PerfettoPacketInvalid,
        Stat::PerfettoMissingAnchor,
        Stat::PerfettoUnresolvedInterned,
        Stat::ArgsUnresolvedHash,
        Stat::ArgsUnresolvedNativeSymbol,
        Stat::SorterLateEvent,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Stat::FxtUnknownRecord => "fxt_unknown_record",
            Stat::FxtInvalidEvent => "fxt_invalid_event",
            Stat::FxtInvalidArg => "fxt_invalid_arg",
            Stat::FxtUnresolvedString => "fxt_unresolved_string",
            Stat::FxtUnresolvedThread => "fxt_unresolved_thread",
            Stat::FxtInvalidBlob => "fxt_invalid_blob",
            Stat::FxtProviderBufferOverflow => "fxt_provider_buffer_overflow",
            Stat::PerfettoPacketInvalid => "perfetto_packet_invalid",
            Stat::PerfettoMissingAnchor => "perfetto_missing_anchor",
            Stat::PerfettoUnresolvedInterned => "perfetto_unresolved_interned",
            Stat::ArgsUnresolvedHash => "args_unresolved_hash",
            Stat::ArgsUnresolvedNativeSymbol => "args_unresolved_native_symbol",
            Stat::SorterLateEvent => "sorter_late_event",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Stat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Counter values for one import session.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Stats {
    counts: [u64; Stat::ALL.len()],
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&mut self, stat: Stat) {
        self.add(stat, 1);
    }

    pub fn add(&mut self, stat: Stat, n: u64) {
        self.counts[stat.index()] += n;
    }

    pub fn get(&self, stat: Stat) -> u64 {
        self.counts[stat.index()]
    }

    /// Counters with a non-zero value, in declaration order.
    pub fn non_zero(&self) -> impl Iterator<Item = (Stat, u64)> + '_ {
        Stat::ALL
            .iter()
            .map(|&s| (s, self.get(s)))
            .filter(|&(_, v)| v > 0)
    }
}

impl Serialize for Stats {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(Stat::ALL.len()))?;
        for stat in Stat::ALL {
            map.serialize_entry(stat.name(), &self.get(stat))?;
        }
        map.end()
    }
}
