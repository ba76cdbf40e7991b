//! Policy table schema, loading, and decisions.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::rule::{Access, ArgRule, Perm};
use crate::{Error, Result};

/// Rule for one named property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyRule {
    pub perm: Perm,

    /// Write access. Defaults to read-only.
    #[serde(default)]
    pub access: Access,

    /// If present, a write must coerce to one of these strings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_values: Option<Vec<String>>,

    /// Author's note, surfaced in denial reasons.
    #[serde(default)]
    pub comment: String,
}

/// Rule for one named method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionRule {
    pub perm: Perm,

    /// Ordered per-positional-argument constraints. Positions past the end
    /// of this list are unconstrained.
    #[serde(default)]
    pub args: Vec<ArgRule>,

    /// Author's note, surfaced in denial reasons.
    #[serde(default)]
    pub comment: String,
}

/// The per-type access-control table consumed by the membrane.
///
/// Default-deny: any member not named here is inaccessible through a tamed
/// reference, whatever the underlying object exposes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    #[serde(default)]
    pub properties: BTreeMap<String, PropertyRule>,

    #[serde(default)]
    pub functions: BTreeMap<String, FunctionRule>,
}

/// Result of a policy decision.
#[derive(Debug, Clone)]
pub enum Decision {
    Allow,
    Deny { reason: String },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }

    fn deny(reason: impl Into<String>) -> Self {
        Decision::Deny {
            reason: reason.into(),
        }
    }
}

fn with_comment(base: &str, comment: &str) -> String {
    if comment.is_empty() {
        base.to_string()
    } else {
        format!("{base}: {comment}")
    }
}

impl Table {
    /// Load and validate a table from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// Parse and validate a table from a TOML string.
    pub fn parse(toml: &str) -> Result<Self> {
        let table: Self = toml::from_str(toml).map_err(|e| Error::Parse(e.to_string()))?;
        table.validate()?;
        Ok(table)
    }

    /// Check table shape, failing fast on contradictory authoring.
    ///
    /// Called by [`Table::parse`]; call it directly for tables built in
    /// code.
    pub fn validate(&self) -> Result<()> {
        for name in self.properties.keys() {
            if self.functions.contains_key(name) {
                return Err(Error::Invalid(format!(
                    "'{name}' declared as both property and function"
                )));
            }
        }

        for (name, rule) in &self.properties {
            if rule.perm == Perm::Deny {
                if rule.access == Access::Write {
                    return Err(Error::Invalid(format!(
                        "denied property '{name}' declares write access"
                    )));
                }
                if rule.allowed_values.is_some() {
                    return Err(Error::Invalid(format!(
                        "denied property '{name}' declares allowed_values"
                    )));
                }
            }
            if let Some(values) = &rule.allowed_values {
                if values.is_empty() {
                    return Err(Error::Invalid(format!(
                        "property '{name}' has an empty allowed_values list"
                    )));
                }
            }
        }

        for (name, rule) in &self.functions {
            if rule.perm == Perm::Deny && !rule.args.is_empty() {
                return Err(Error::Invalid(format!(
                    "denied function '{name}' declares argument constraints"
                )));
            }
            for (index, arg) in rule.args.iter().enumerate() {
                match arg {
                    ArgRule::Any => {}
                    ArgRule::OneOf(values) if values.is_empty() => {
                        return Err(Error::Invalid(format!(
                            "function '{name}' arg {index} has an empty one_of list"
                        )));
                    }
                    ArgRule::OneOf(_) => {}
                    ArgRule::Filter(filter) if filter.is_empty() => {
                        return Err(Error::Invalid(format!(
                            "function '{name}' arg {index} names an empty filter"
                        )));
                    }
                    ArgRule::Filter(_) => {}
                }
            }
        }

        Ok(())
    }

    /// The rule for a property, if declared.
    pub fn property(&self, name: &str) -> Option<&PropertyRule> {
        self.properties.get(name)
    }

    /// The rule for a function, if declared.
    pub fn function(&self, name: &str) -> Option<&FunctionRule> {
        self.functions.get(name)
    }

    /// Decide a read of `name`.
    ///
    /// Reads of allowed function members are permitted too (the membrane
    /// decides what a function-valued read yields); everything undeclared
    /// is denied.
    pub fn decide_read(&self, name: &str) -> Decision {
        if let Some(rule) = self.properties.get(name) {
            return match rule.perm {
                Perm::Allow => Decision::Allow,
                Perm::Deny => Decision::deny(with_comment("read denied", &rule.comment)),
            };
        }
        if let Some(rule) = self.functions.get(name) {
            return match rule.perm {
                Perm::Allow => Decision::Allow,
                Perm::Deny => Decision::deny(with_comment("read denied", &rule.comment)),
            };
        }
        Decision::deny("not included in API")
    }

    /// Decide a write of `coerced` (the stringified value, or `None` when
    /// the value does not coerce to a string) to `name`.
    pub fn decide_write(&self, name: &str, coerced: Option<&str>) -> Decision {
        if self.functions.contains_key(name) {
            return Decision::deny("API functions are not settable");
        }
        let Some(rule) = self.properties.get(name) else {
            return Decision::deny("not included in API");
        };
        if rule.perm == Perm::Deny {
            return Decision::deny(with_comment("write denied", &rule.comment));
        }
        if rule.access != Access::Write {
            return Decision::deny(with_comment("property is read-only", &rule.comment));
        }
        if let Some(values) = &rule.allowed_values {
            let allowed = coerced.is_some_and(|value| values.iter().any(|v| v == value));
            if !allowed {
                return Decision::deny("value is not in the allowed set");
            }
        }
        Decision::Allow
    }

    /// Decide a call of `name`. Argument constraints are the membrane's
    /// job (filters live there); this covers the member itself.
    pub fn decide_call(&self, name: &str) -> Decision {
        if let Some(rule) = self.functions.get(name) {
            return match rule.perm {
                Perm::Allow => Decision::Allow,
                Perm::Deny => Decision::deny(with_comment("call denied", &rule.comment)),
            };
        }
        if self.properties.contains_key(name) {
            return Decision::deny("API properties are not callable");
        }
        Decision::deny("not included in API")
    }
}
