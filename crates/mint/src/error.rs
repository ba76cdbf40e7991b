//! Mint error types.

use thiserror::Error;

/// Mint errors.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// A constructor argument was rejected, such as an empty currency name.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The source purse was not issued by this mint.
    ///
    /// Surfaced when unsealing the source's decrement box fails the brand
    /// check. No balance changes.
    #[error("foreign purse: not issued by the '{currency}' mint")]
    ForeignPurse { currency: String },

    /// The source purse cannot cover the requested amount. No balance
    /// changes.
    #[error("insufficient funds: requested {requested}, available {available}")]
    InsufficientFunds { requested: u64, available: u64 },

    /// Crediting the target purse would overflow its balance. The debit is
    /// refunded before this is reported.
    #[error("balance overflow")]
    Overflow,

    /// An error from the underlying brand primitive.
    #[error(transparent)]
    Brand(#[from] brand::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
