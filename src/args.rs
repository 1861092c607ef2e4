//! Event arguments and the inserter capability.
//!
//! Decoders attach a flat list of [`Arg`]s to every event. Before the event
//! reaches a tracker the list is replayed through the translation table into
//! an [`ArgInserter`], which decides how repeated keys are merged.

use std::fmt::Write as _;

use crate::strings::{StringId, StringPool};

/// A dynamically typed argument value.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Variadic {
    Null,
    Int(i64),
    UInt(u64),
    Real(f64),
    String(StringId),
    Pointer(u64),
    Bool(bool),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VariadicType {
    Null,
    Int,
    UInt,
    Real,
    String,
    Pointer,
    Bool,
}

impl Variadic {
    pub fn value_type(&self) -> VariadicType {
        match self {
            Variadic::Null => VariadicType::Null,
            Variadic::Int(_) => VariadicType::Int,
            Variadic::UInt(_) => VariadicType::UInt,
            Variadic::Real(_) => VariadicType::Real,
            Variadic::String(_) => VariadicType::String,
            Variadic::Pointer(_) => VariadicType::Pointer,
            Variadic::Bool(_) => VariadicType::Bool,
        }
    }

    pub fn as_uint(&self) -> Option<u64> {
        match *self {
            Variadic::UInt(v) => Some(v),
            _ => None,
        }
    }

    /// Numeric view used for counter samples.
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Variadic::Int(v) => Some(v as f64),
            Variadic::UInt(v) => Some(v as f64),
            Variadic::Real(v) => Some(v),
            _ => None,
        }
    }
}

/// How an insert treats a key that already holds a value.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum UpdatePolicy {
    #[default]
    AddOrUpdate,
    SkipIfExists,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Arg {
    pub key: StringId,
    pub value: Variadic,
    pub update_policy: UpdatePolicy,
}

impl Arg {
    pub fn new(key: StringId, value: Variadic) -> Self {
        Self {
            key,
            value,
            update_policy: UpdatePolicy::default(),
        }
    }
}

/// Sink for one event's arguments.
pub trait ArgInserter {
    fn add_arg(&mut self, key: StringId, value: Variadic, policy: UpdatePolicy);

    fn add(&mut self, key: StringId, value: Variadic) {
        self.add_arg(key, value, UpdatePolicy::default());
    }
}

/// An ordered argument set that honors [`UpdatePolicy`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ArgSet {
    args: Vec<Arg>,
}

impl ArgSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: StringId) -> Option<&Variadic> {
        self.args.iter().find(|a| a.key == key).map(|a| &a.value)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arg> {
        self.args.iter()
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    /// Render as ` key=value` pairs, the way raw event rows display them.
    pub fn serialize(&self, pool: &StringPool) -> String {
        let mut out = String::new();
        for arg in &self.args {
            out.push(' ');
            out.push_str(pool.get(arg.key));
            out.push('=');
            write_value(&mut out, &arg.value, pool);
        }
        out
    }
}

fn write_value(out: &mut String, value: &Variadic, pool: &StringPool) {
    // Writing to a String cannot fail.
    let _ = match *value {
        Variadic::Null => write!(out, "[NULL]"),
        Variadic::Int(v) => write!(out, "{v}"),
        Variadic::UInt(v) | Variadic::Pointer(v) => write!(out, "{v}"),
        Variadic::Real(v) => write!(out, "{v}"),
        Variadic::String(id) => write!(out, "{}", pool.get(id)),
        Variadic::Bool(v) => write!(out, "{v}"),
    };
}

impl ArgInserter for ArgSet {
    fn add_arg(&mut self, key: StringId, value: Variadic, policy: UpdatePolicy) {
        match self.args.iter_mut().find(|a| a.key == key) {
            Some(existing) => {
                if policy == UpdatePolicy::AddOrUpdate {
                    existing.value = value;
                }
            }
            None => self.args.push(Arg {
                key,
                value,
                update_policy: policy,
            }),
        }
    }
}

impl<'a> IntoIterator for &'a ArgSet {
    type Item = &'a Arg;
    type IntoIter = std::slice::Iter<'a, Arg>;

    fn into_iter(self) -> Self::IntoIter {
        self.args.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skip_if_exists_keeps_first() {
        let mut pool = StringPool::new();
        let key = pool.intern("chrome_mojo_event_info.mojo_interface_tag");
        let raw = pool.intern("raw.Tag");
        let resolved = pool.intern("resolved.Tag");

        let mut set = ArgSet::new();
        set.add(key, Variadic::String(raw));
        set.add_arg(key, Variadic::String(resolved), UpdatePolicy::SkipIfExists);
        assert_eq!(set.len(), 1);
        assert_eq!(set.get(key), Some(&Variadic::String(raw)));

        set.add(key, Variadic::String(resolved));
        assert_eq!(set.get(key), Some(&Variadic::String(resolved)));
    }

    #[test]
    fn test_serialize() {
        let mut pool = StringPool::new();
        let mut set = ArgSet::new();
        let name = pool.intern("name");
        let value = pool.intern("vsync");
        set.add(name, Variadic::String(value));
        set.add(pool.intern("ptr"), Variadic::Pointer(0xdead));
        set.add(pool.intern("count"), Variadic::UInt(3));
        set.add(pool.intern("delta"), Variadic::Int(-2));
        assert_eq!(
            set.serialize(&pool),
            " name=vsync ptr=57005 count=3 delta=-2"
        );
    }

    #[test]
    fn test_numeric_views() {
        assert_eq!(Variadic::UInt(4).as_uint(), Some(4));
        assert_eq!(Variadic::Int(4).as_uint(), None);
        assert_eq!(Variadic::Int(-4).as_f64(), Some(-4.0));
        assert_eq!(Variadic::Bool(true).as_f64(), None);
        assert_eq!(Variadic::String(StringId::NULL).value_type(), VariadicType::String);
    }
}
