//! The enumerated rule vocabulary.

use serde::{Deserialize, Serialize};

/// Whether a member is exposed at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Perm {
    Allow,
    Deny,
}

/// Write access for an allowed property.
///
/// Only meaningful under [`Perm::Allow`]; a denied property is neither
/// readable nor writable regardless.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Access {
    #[default]
    ReadOnly,
    Write,
}

/// Constraint on one positional call argument.
///
/// In TOML: `"any"`, `{ one_of = ["5", "50"] }`, or
/// `{ filter = "fivefilter" }`. A filter names a host-registered predicate
/// resolved by the membrane when the policy is registered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgRule {
    /// Any value is permitted at this position.
    Any,
    /// The argument, coerced to a string, must be one of these values.
    OneOf(Vec<String>),
    /// The argument must pass the named host-side filter.
    Filter(String),
}
