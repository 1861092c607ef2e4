//! Session-scoped string interning.
//!
//! Every string that reaches the trackers (categories, names, argument keys,
//! resolved symbol names) is interned once per import session and referred to
//! by a small [`StringId`]. Id 0 is reserved for the null string so that a
//! missing name can be expressed without an `Option`.

use std::collections::HashMap;

/// Interned string handle, only meaningful for the pool that produced it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StringId(u32);

impl StringId {
    /// The null string. Resolves to `""`.
    pub const NULL: StringId = StringId(0);

    pub fn is_null(self) -> bool {
        self == Self::NULL
    }
}

/// Interning table owned by one import session.
#[derive(Debug)]
pub struct StringPool {
    strings: Vec<String>,
    ids: HashMap<String, StringId>,
}

impl Default for StringPool {
    fn default() -> Self {
        Self::new()
    }
}

impl StringPool {
    pub fn new() -> Self {
        Self {
            strings: vec![String::new()],
            ids: HashMap::new(),
        }
    }

    /// Intern `s`, returning the existing id if it was seen before.
    ///
    /// The empty string always maps to [`StringId::NULL`].
    pub fn intern(&mut self, s: &str) -> StringId {
        if s.is_empty() {
            return StringId::NULL;
        }
        if let Some(&id) = self.ids.get(s) {
            return id;
        }
        let id = StringId(self.strings.len() as u32);
        self.strings.push(s.to_string());
        self.ids.insert(s.to_string(), id);
        id
    }

    /// Look up an id without interning.
    pub fn find(&self, s: &str) -> Option<StringId> {
        if s.is_empty() {
            return Some(StringId::NULL);
        }
        self.ids.get(s).copied()
    }

    pub fn get(&self, id: StringId) -> &str {
        self.strings
            .get(id.0 as usize)
            .map(String::as_str)
            .unwrap_or("")
    }

    /// Number of interned strings, including the null string.
    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.len() == 1
    }
}
