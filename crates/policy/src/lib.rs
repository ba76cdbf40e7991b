//! Declarative taming policy tables.
//!
//! Core principle: **everything not named in the table is denied.**
//!
//! A [`Table`] describes, for one exposed host type, which properties may
//! be read or written and which methods may be called, along with value
//! whitelists for writes and per-positional-argument constraints for
//! calls. Tables are plain data — authored as TOML, validated at load
//! time, immutable afterwards, and shared across every instance of the
//! tamed type. The membrane consults them on every boundary crossing.
//!
//! ```toml
//! [properties.label]
//! perm = "allow"
//! access = "write"
//! allowed_values = ["12", "13"]
//!
//! [functions.high_five]
//! perm = "allow"
//! args = [{ one_of = ["5", "50"] }, { filter = "fivefilter" }]
//! ```

mod error;
mod rule;
mod table;

pub use error::{Error, Result};
pub use rule::{Access, ArgRule, Perm};
pub use table::{Decision, FunctionRule, PropertyRule, Table};
