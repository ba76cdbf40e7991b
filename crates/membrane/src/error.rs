//! Membrane error types.
//!
//! Every denial is a distinguishable, terminal error — a silent failure at
//! a security boundary is itself a vulnerability class, so nothing here is
//! ever reported as a bare `false` or swallowed.

use thiserror::Error;

use crate::feral::FeralError;

/// Membrane errors.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The policy table denies this member, or does not declare it.
    #[error("access denied: {type_tag}.{member}: {reason}")]
    AccessDenied {
        type_tag: String,
        member: String,
        reason: String,
    },

    /// A write failed the property's value whitelist.
    #[error("value not allowed for {type_tag}.{member}")]
    ValueNotAllowed { type_tag: String, member: String },

    /// A call argument failed its positional constraint.
    #[error("argument {index} rejected for {type_tag}.{member}: {reason}")]
    ArgumentRejected {
        type_tag: String,
        member: String,
        index: usize,
        reason: String,
    },

    /// An object of an unregistered type tried to cross the boundary.
    /// The membrane fails closed.
    #[error("no policy registered for type '{0}'")]
    NoPolicy(String),

    /// A policy references a filter the membrane does not know.
    #[error("unknown filter '{filter}' referenced by {type_tag}.{member}")]
    UnknownFilter {
        type_tag: String,
        member: String,
        filter: String,
    },

    /// The policy layer rejected a table at registration.
    #[error(transparent)]
    Policy(#[from] policy::Error),

    /// The feral object itself failed an allowed operation.
    #[error("feral object error: {0}")]
    Feral(#[from] FeralError),
}

pub type Result<T> = std::result::Result<T, Error>;
