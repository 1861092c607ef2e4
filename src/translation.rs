//! Hash argument translation.
//!
//! Producers record some names as hashes to keep traces small. When an event's
//! arguments are committed, [`ArgsTranslationTable::translate_args`] keeps the
//! raw hash and adds the resolved name next to it. Mojo method arguments come
//! as a (mapping id, relative pc) pair and are resolved together once the
//! whole set has been seen.

use tracing::debug;

use crate::args::{Arg, ArgInserter, UpdatePolicy, Variadic, VariadicType};
use crate::stats::{Stat, Stats};
use crate::strings::{StringId, StringPool};
use crate::symbolize::{MappingId, SymbolTables};

pub const CHROME_HISTOGRAM_HASH_KEY: &str = "chrome_histogram_sample.name_hash";
pub const CHROME_HISTOGRAM_NAME_KEY: &str = "chrome_histogram_sample.name";
pub const CHROME_USER_EVENT_HASH_KEY: &str = "chrome_user_event.action_hash";
pub const CHROME_USER_EVENT_ACTION_KEY: &str = "chrome_user_event.action";
pub const CHROME_PERFORMANCE_MARK_SITE_HASH_KEY: &str = "chrome_hashed_performance_mark.site_hash";
pub const CHROME_PERFORMANCE_MARK_SITE_KEY: &str = "chrome_hashed_performance_mark.site";
pub const CHROME_PERFORMANCE_MARK_MARK_HASH_KEY: &str = "chrome_hashed_performance_mark.mark_hash";
pub const CHROME_PERFORMANCE_MARK_MARK_KEY: &str = "chrome_hashed_performance_mark.mark";
pub const MOJO_METHOD_MAPPING_ID_KEY: &str =
    "chrome_mojo_event_info.mojo_interface_method.native_symbol.mapping_id";
pub const MOJO_METHOD_REL_PC_KEY: &str =
    "chrome_mojo_event_info.mojo_interface_method.native_symbol.rel_pc";
pub const MOJO_METHOD_NAME_KEY: &str = "chrome_mojo_event_info.mojo_method_name";
pub const MOJO_INTERFACE_TAG_KEY: &str = "chrome_mojo_event_info.mojo_interface_tag";

/// Suffix the Mojo bindings generator appends to method symbols.
const MOJO_SYM_SUFFIX: &str = "_Sym::IPCStableHash";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TranslationKind {
    HistogramHash,
    UserEventHash,
    PerformanceMarkSiteHash,
    PerformanceMarkMarkHash,
    MojoMethodMappingId,
    MojoMethodRelPc,
}

/// Session ids of the fixed keys.
#[derive(Clone, Copy, Debug)]
struct Keys {
    histogram_hash: StringId,
    histogram_name: StringId,
    user_event_hash: StringId,
    user_event_action: StringId,
    mark_site_hash: StringId,
    mark_site: StringId,
    mark_mark_hash: StringId,
    mark_mark: StringId,
    mojo_mapping_id: StringId,
    mojo_rel_pc: StringId,
    mojo_method_name: StringId,
    mojo_interface_tag: StringId,
}

impl Keys {
    fn intern(pool: &mut StringPool) -> Self {
        Self {
            histogram_hash: pool.intern(CHROME_HISTOGRAM_HASH_KEY),
            histogram_name: pool.intern(CHROME_HISTOGRAM_NAME_KEY),
            user_event_hash: pool.intern(CHROME_USER_EVENT_HASH_KEY),
            user_event_action: pool.intern(CHROME_USER_EVENT_ACTION_KEY),
            mark_site_hash: pool.intern(CHROME_PERFORMANCE_MARK_SITE_HASH_KEY),
            mark_site: pool.intern(CHROME_PERFORMANCE_MARK_SITE_KEY),
            mark_mark_hash: pool.intern(CHROME_PERFORMANCE_MARK_MARK_HASH_KEY),
            mark_mark: pool.intern(CHROME_PERFORMANCE_MARK_MARK_KEY),
            mojo_mapping_id: pool.intern(MOJO_METHOD_MAPPING_ID_KEY),
            mojo_rel_pc: pool.intern(MOJO_METHOD_REL_PC_KEY),
            mojo_method_name: pool.intern(MOJO_METHOD_NAME_KEY),
            mojo_interface_tag: pool.intern(MOJO_INTERFACE_TAG_KEY),
        }
    }
}

pub struct ArgsTranslationTable {
    keys: Keys,
    symbols: SymbolTables,
}

impl ArgsTranslationTable {
    /// Interns the fixed keys into this session's pool.
    pub fn new(pool: &mut StringPool, symbols: SymbolTables) -> Self {
        Self {
            keys: Keys::intern(pool),
            symbols,
        }
    }

    /// Only unsigned values under one of the fixed keys are translated.
    pub fn classify(&self, key: StringId, value_type: VariadicType) -> Option<TranslationKind> {
        if value_type != VariadicType::UInt {
            return None;
        }
        let k = &self.keys;
        match key {
            _ if key == k.histogram_hash => Some(TranslationKind::HistogramHash),
            _ if key == k.user_event_hash => Some(TranslationKind::UserEventHash),
            _ if key == k.mark_site_hash => Some(TranslationKind::PerformanceMarkSiteHash),
            _ if key == k.mark_mark_hash => Some(TranslationKind::PerformanceMarkMarkHash),
            _ if key == k.mojo_mapping_id => Some(TranslationKind::MojoMethodMappingId),
            _ if key == k.mojo_rel_pc => Some(TranslationKind::MojoMethodRelPc),
            _ => None,
        }
    }

    pub fn needs_translation(&self, key: StringId, value_type: VariadicType) -> bool {
        self.classify(key, value_type).is_some()
    }

    /// Replay one event's arguments into `inserter`, adding resolved names.
    pub fn translate_args(
        &self,
        args: &[Arg],
        pool: &mut StringPool,
        inserter: &mut dyn ArgInserter,
        stats: &mut Stats,
    ) {
        let mut mapping_id = None;
        let mut rel_pc = None;

        for arg in args {
            let kind = self.classify(arg.key, arg.value.value_type());
            let (Some(kind), Some(hash)) = (kind, arg.value.as_uint()) else {
                inserter.add_arg(arg.key, arg.value, arg.update_policy);
                continue;
            };
            let k = &self.keys;
            let (resolved_key, resolved) = match kind {
                TranslationKind::HistogramHash => (k.histogram_name, self.symbols.histogram(hash)),
                TranslationKind::UserEventHash => {
                    (k.user_event_action, self.symbols.user_event(hash))
                }
                TranslationKind::PerformanceMarkSiteHash => {
                    (k.mark_site, self.symbols.performance_mark_site(hash))
                }
                TranslationKind::PerformanceMarkMarkHash => {
                    (k.mark_mark, self.symbols.performance_mark_mark(hash))
                }
                TranslationKind::MojoMethodMappingId => {
                    mapping_id = Some(hash);
                    continue;
                }
                TranslationKind::MojoMethodRelPc => {
                    rel_pc = Some(hash);
                    continue;
                }
            };
            inserter.add(arg.key, arg.value);
            match resolved {
                Some(name) => inserter.add(resolved_key, Variadic::String(pool.intern(name))),
                None => {
                    debug!("no name for {} {:#x}", pool.get(arg.key), hash);
                    stats.increment(Stat::ArgsUnresolvedHash);
                }
            }
        }

        self.emit_mojo_method(mapping_id, rel_pc, pool, inserter, stats);
    }

    fn emit_mojo_method(
        &self,
        mapping_id: Option<u64>,
        rel_pc: Option<u64>,
        pool: &mut StringPool,
        inserter: &mut dyn ArgInserter,
        stats: &mut Stats,
    ) {
        let k = &self.keys;
        let (mapping_id, rel_pc) = match (mapping_id, rel_pc) {
            (Some(mapping_id), Some(rel_pc)) => (mapping_id, rel_pc),
            // Half a pair cannot be resolved and is dropped.
            _ => return,
        };

        let location = u32::try_from(mapping_id)
            .ok()
            .and_then(|m| self.symbols.native_symbol(MappingId(m), rel_pc));
        match location {
            Some(loc) => {
                let method = extract_mojo_method(&loc.function_name);
                let tag = extract_mojo_interface_tag(&loc.function_name);
                inserter.add(k.mojo_method_name, Variadic::String(pool.intern(method)));
                // Older producers write the tag directly and theirs wins.
                inserter.add_arg(
                    k.mojo_interface_tag,
                    Variadic::String(pool.intern(&tag)),
                    UpdatePolicy::SkipIfExists,
                );
            }
            None => {
                debug!(
                    "no native symbol for mapping {} rel_pc {:#x}",
                    mapping_id, rel_pc
                );
                stats.increment(Stat::ArgsUnresolvedNativeSymbol);
                inserter.add(k.mojo_mapping_id, Variadic::UInt(mapping_id));
                inserter.add(k.mojo_rel_pc, Variadic::UInt(rel_pc));
            }
        }
    }
}

/// `ns::Iface::Method_Sym::IPCStableHash[()]` to `ns::Iface::Method`.
pub fn extract_mojo_method(symbol: &str) -> &str {
    let symbol = symbol.strip_suffix("()").unwrap_or(symbol);
    symbol.strip_suffix(MOJO_SYM_SUFFIX).unwrap_or(symbol)
}

/// `ns::Iface::Method_Sym::IPCStableHash` to `ns.Iface`.
///
/// Symbols with two or fewer `::` segments are returned unchanged.
pub fn extract_mojo_interface_tag(symbol: &str) -> String {
    let parts: Vec<&str> = symbol.split("::").collect();
    if parts.len() <= 2 {
        return symbol.to_string();
    }
    parts[..parts.len() - 2].join(".")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args::ArgSet;
    use crate::symbolize::SourceLocation;

    struct Fixture {
        pool: StringPool,
        stats: Stats,
        table: ArgsTranslationTable,
    }

    impl Fixture {
        fn new(symbols: SymbolTables) -> Self {
            let mut pool = StringPool::new();
            let table = ArgsTranslationTable::new(&mut pool, symbols);
            Self {
                pool,
                stats: Stats::new(),
                table,
            }
        }

        fn arg(&mut self, key: &str, value: Variadic) -> Arg {
            Arg::new(self.pool.intern(key), value)
        }

        fn translate(&mut self, args: &[Arg]) -> Vec<(String, Variadic)> {
            let mut set = ArgSet::new();
            self.table
                .translate_args(args, &mut self.pool, &mut set, &mut self.stats);
            set.iter()
                .map(|a| (self.pool.get(a.key).to_string(), a.value))
                .collect()
        }

        fn string(&self, value: &Variadic) -> &str {
            match value {
                Variadic::String(id) => self.pool.get(*id),
                other => panic!("not a string: {other:?}"),
            }
        }
    }

    fn mojo_symbols(function_name: &str) -> SymbolTables {
        let mut symbols = SymbolTables::new();
        symbols.add_native_symbol(
            MappingId(1),
            0x1234,
            SourceLocation {
                function_name: function_name.to_string(),
                file_name: None,
                line_number: None,
            },
        );
        symbols
    }

    #[test]
    fn test_histogram_hash_resolved() {
        let mut symbols = SymbolTables::new();
        symbols.add_histogram(0xABC, "MyHistogram");
        let mut f = Fixture::new(symbols);
        let arg = f.arg(CHROME_HISTOGRAM_HASH_KEY, Variadic::UInt(0xABC));
        let out = f.translate(&[arg]);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0], (CHROME_HISTOGRAM_HASH_KEY.to_string(), Variadic::UInt(0xABC)));
        assert_eq!(out[1].0, CHROME_HISTOGRAM_NAME_KEY);
        assert_eq!(f.string(&out[1].1), "MyHistogram");
    }

    #[test]
    fn test_other_hash_kinds() {
        let mut symbols = SymbolTables::new();
        symbols.add_user_event(1, "Back");
        symbols.add_performance_mark_site(2, "site");
        symbols.add_performance_mark_mark(3, "mark");
        let mut f = Fixture::new(symbols);
        let args = [
            f.arg(CHROME_USER_EVENT_HASH_KEY, Variadic::UInt(1)),
            f.arg(CHROME_PERFORMANCE_MARK_SITE_HASH_KEY, Variadic::UInt(2)),
            f.arg(CHROME_PERFORMANCE_MARK_MARK_HASH_KEY, Variadic::UInt(3)),
        ];
        let out = f.translate(&args);
        let keys: Vec<_> = out.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(
            keys,
            vec![
                CHROME_USER_EVENT_HASH_KEY,
                CHROME_USER_EVENT_ACTION_KEY,
                CHROME_PERFORMANCE_MARK_SITE_HASH_KEY,
                CHROME_PERFORMANCE_MARK_SITE_KEY,
                CHROME_PERFORMANCE_MARK_MARK_HASH_KEY,
                CHROME_PERFORMANCE_MARK_MARK_KEY,
            ]
        );
        assert_eq!(f.string(&out[1].1), "Back");
        assert_eq!(f.string(&out[5].1), "mark");
    }

    #[test]
    fn test_unresolved_hash_keeps_raw() {
        let mut f = Fixture::new(SymbolTables::new());
        let arg = f.arg(CHROME_USER_EVENT_HASH_KEY, Variadic::UInt(99));
        let out = f.translate(&[arg]);
        assert_eq!(out, vec![(CHROME_USER_EVENT_HASH_KEY.to_string(), Variadic::UInt(99))]);
        assert_eq!(f.stats.get(Stat::ArgsUnresolvedHash), 1);
    }

    #[test]
    fn test_only_uint_values_classify() {
        let mut symbols = SymbolTables::new();
        symbols.add_histogram(5, "h");
        let mut f = Fixture::new(symbols);
        let key = f.pool.intern(CHROME_HISTOGRAM_HASH_KEY);
        assert_eq!(
            f.table.classify(key, VariadicType::UInt),
            Some(TranslationKind::HistogramHash)
        );
        assert!(!f.table.needs_translation(key, VariadicType::String));
        assert!(!f.table.needs_translation(key, VariadicType::Int));

        let name = f.pool.intern("five");
        let arg = f.arg(CHROME_HISTOGRAM_HASH_KEY, Variadic::String(name));
        assert_eq!(f.translate(&[arg]).len(), 1);
    }

    #[test]
    fn test_plain_args_pass_through() {
        let mut f = Fixture::new(SymbolTables::new());
        let resolved = f.pool.intern("MyHistogram");
        let mut skip = f.arg("x", Variadic::Int(-3));
        skip.update_policy = UpdatePolicy::SkipIfExists;
        let args = [
            f.arg(CHROME_HISTOGRAM_NAME_KEY, Variadic::String(resolved)),
            skip,
            f.arg("ptr", Variadic::Pointer(0x10)),
        ];
        let mut set = ArgSet::new();
        f.table
            .translate_args(&args, &mut f.pool, &mut set, &mut f.stats);
        let out: Vec<Arg> = set.iter().copied().collect();
        assert_eq!(out, args.to_vec());
        assert_eq!(f.stats, Stats::new());
    }

    #[test]
    fn test_mojo_method_resolved() {
        let mut f = Fixture::new(mojo_symbols("ns::Iface::Method_Sym::IPCStableHash"));
        let args = [
            f.arg(MOJO_METHOD_MAPPING_ID_KEY, Variadic::UInt(1)),
            f.arg("other", Variadic::Bool(true)),
            f.arg(MOJO_METHOD_REL_PC_KEY, Variadic::UInt(0x1234)),
        ];
        let out = f.translate(&args);
        let keys: Vec<_> = out.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["other", MOJO_METHOD_NAME_KEY, MOJO_INTERFACE_TAG_KEY]);
        assert_eq!(f.string(&out[1].1), "ns::Iface::Method");
        assert_eq!(f.string(&out[2].1), "ns.Iface");
    }

    #[test]
    fn test_existing_interface_tag_wins() {
        let mut f = Fixture::new(mojo_symbols("ns::Iface::Method_Sym::IPCStableHash()"));
        let raw_tag = f.pool.intern("raw.Tag");
        let args = [
            f.arg(MOJO_INTERFACE_TAG_KEY, Variadic::String(raw_tag)),
            f.arg(MOJO_METHOD_MAPPING_ID_KEY, Variadic::UInt(1)),
            f.arg(MOJO_METHOD_REL_PC_KEY, Variadic::UInt(0x1234)),
        ];
        let out = f.translate(&args);
        assert_eq!(out.len(), 2);
        assert_eq!(f.string(&out[0].1), "raw.Tag");
        assert_eq!(f.string(&out[1].1), "ns::Iface::Method");
    }

    #[test]
    fn test_missing_native_symbol_emits_raw_pair() {
        let mut f = Fixture::new(mojo_symbols("ns::Iface::Method_Sym::IPCStableHash"));
        let args = [
            f.arg(MOJO_METHOD_MAPPING_ID_KEY, Variadic::UInt(2)),
            f.arg(MOJO_METHOD_REL_PC_KEY, Variadic::UInt(0x1234)),
        ];
        let out = f.translate(&args);
        assert_eq!(
            out,
            vec![
                (MOJO_METHOD_MAPPING_ID_KEY.to_string(), Variadic::UInt(2)),
                (MOJO_METHOD_REL_PC_KEY.to_string(), Variadic::UInt(0x1234)),
            ]
        );
        assert_eq!(f.stats.get(Stat::ArgsUnresolvedNativeSymbol), 1);
    }

    #[test]
    fn test_half_pair_is_dropped() {
        let mut f = Fixture::new(mojo_symbols("ns::Iface::Method_Sym::IPCStableHash"));
        let rel_pc = f.arg(MOJO_METHOD_REL_PC_KEY, Variadic::UInt(0x1234));
        assert!(f.translate(&[rel_pc]).is_empty());
        let mapping_id = f.arg(MOJO_METHOD_MAPPING_ID_KEY, Variadic::UInt(1));
        let other = f.arg("other", Variadic::Int(-1));
        let out = f.translate(&[mapping_id, other]);
        assert_eq!(out, vec![("other".to_string(), Variadic::Int(-1))]);
        assert_eq!(f.stats, Stats::new());
    }

    #[test]
    fn test_mojo_symbol_with_call_suffix() {
        let mut f = Fixture::new(mojo_symbols("ns::Iface::Method_Sym::IPCStableHash()"));
        let args = [
            f.arg(MOJO_METHOD_MAPPING_ID_KEY, Variadic::UInt(1)),
            f.arg(MOJO_METHOD_REL_PC_KEY, Variadic::UInt(0x1234)),
        ];
        let out = f.translate(&args);
        let keys: Vec<_> = out.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec![MOJO_METHOD_NAME_KEY, MOJO_INTERFACE_TAG_KEY]);
        assert_eq!(f.string(&out[0].1), "ns::Iface::Method");
        assert_eq!(f.string(&out[1].1), "ns.Iface");
    }

    #[test]
    fn test_mojo_symbol_decomposition() {
        assert_eq!(
            extract_mojo_method("ns::Iface::Method_Sym::IPCStableHash"),
            "ns::Iface::Method"
        );
        assert_eq!(
            extract_mojo_method("ns::Iface::Method_Sym::IPCStableHash()"),
            "ns::Iface::Method"
        );
        assert_eq!(extract_mojo_method("plain"), "plain");
        assert_eq!(
            extract_mojo_interface_tag("a::b::Iface::Method_Sym::IPCStableHash"),
            "a.b.Iface"
        );
        assert_eq!(
            extract_mojo_interface_tag("ns::Iface::Method_Sym::IPCStableHash()"),
            "ns.Iface"
        );
        assert_eq!(
            extract_mojo_interface_tag("Method_Sym::IPCStableHash"),
            "Method_Sym::IPCStableHash"
        );
        assert_eq!(extract_mojo_interface_tag("single"), "single");
    }
}
