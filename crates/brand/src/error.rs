//! Brand error types.

use thiserror::Error;

/// Brand errors.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// An argument failed validation before any state changed.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Unseal was attempted on a box not sealed by the matching sealer.
    ///
    /// The caller must treat this as "not my box" — the payload is not
    /// revealed and no brand state is left behind.
    #[error("sealer/unsealer mismatch: not a box of brand '{brand}'")]
    BrandMismatch { brand: String },
}

pub type Result<T> = std::result::Result<T, Error>;
