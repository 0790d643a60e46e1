//! Command line options
//!
//! The grammar is deliberately tiny: every `--name` token is a boolean flag
//! and everything else (including a lone `--`) stays positional, in order.
//! Position 0 is the program name.

use std::collections::BTreeSet;

use indexmap::IndexMap;

use crate::value::Value;

/// Parsed argument vector. Immutable once built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Options {
    flags: BTreeSet<String>,
    args: Vec<String>,
}

impl Options {
    /// Split a raw argument vector into flags and positionals.
    pub fn parse<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut flags = BTreeSet::new();
        let mut args = Vec::new();

        for arg in argv {
            let arg = arg.into();
            match arg.strip_prefix("--") {
                Some(name) if !name.is_empty() => {
                    flags.insert(name.to_string());
                }
                _ => args.push(arg),
            }
        }

        Self { flags, args }
    }

    /// Whether `--name` was given.
    pub fn flag(&self, name: &str) -> bool {
        self.flags.contains(name)
    }

    pub fn flags(&self) -> impl Iterator<Item = &str> {
        self.flags.iter().map(String::as_str)
    }

    /// Positional arguments, program name first.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn arg(&self, index: usize) -> Option<&str> {
        self.args.get(index).map(String::as_str)
    }

    pub fn esm(&self) -> bool {
        self.flag("esm")
    }

    pub fn bare(&self) -> bool {
        self.flag("bare")
    }

    /// Options as a script value: one boolean member per flag plus `args`.
    pub fn to_value(&self) -> Value {
        let mut members: IndexMap<String, Value> = self
            .flags
            .iter()
            .map(|name| (name.clone(), Value::Bool(true)))
            .collect();
        members.insert(
            "args".to_string(),
            Value::Array(self.args.iter().map(|a| Value::from(a.as_str())).collect()),
        );
        Value::Object(members)
    }
}
