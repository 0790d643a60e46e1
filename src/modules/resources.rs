//! Embedded resource store
//!
//! Read-only table of script payloads bundled with the host, addressed by
//! application-relative names such as `lib/path.js`.

use std::borrow::Cow;
use std::collections::HashMap;

#[derive(Debug, Default, Clone)]
pub struct ResourceStore {
    entries: HashMap<String, Cow<'static, str>>,
}

impl ResourceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a payload; an existing entry under `name` is replaced.
    pub fn insert(&mut self, name: impl Into<String>, text: impl Into<Cow<'static, str>>) {
        self.entries.insert(name.into(), text.into());
    }

    pub fn with(mut self, name: impl Into<String>, text: impl Into<Cow<'static, str>>) -> Self {
        self.insert(name, text);
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(|text| text.as_ref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
