//! Capability-style money: the canonical consumer of the brand primitive.
//!
//! A [`Mint`] issues [`Purse`]s for one currency. Purses hold non-negative
//! balances, and the only way to move money is [`Mint::deposit`], which
//! proves that the source purse belongs to the same mint by unsealing the
//! decrement capability the purse carries in a sealed box. A purse from a
//! different mint fails that proof — there is no way to forge membership,
//! because the proof is the brand's unforgeability guarantee, not a field
//! check.
//!
//! This crate exists as the conformance exercise of `brand`: if the mint's
//! invariants hold (conservation of total balance, no negative balances,
//! cross-mint deposits always rejected), the brand is doing its job.
//!
//! # Example
//!
//! ```
//! use mint::Mint;
//!
//! let usd = Mint::new("usd")?;
//! let alice = usd.mint_purse(100);
//! let payment = usd.make_purse();
//! usd.deposit(&payment, 10, &alice)?;
//! assert_eq!(alice.balance(), 90);
//! assert_eq!(payment.balance(), 10);
//! # Ok::<(), mint::Error>(())
//! ```

mod error;
mod money;

pub use error::{Error, Result};
pub use money::{Mint, Purse};
