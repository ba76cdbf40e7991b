//! Mint and purse implementation.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use brand::{Brand, SealedBox, Sealer, Unsealer};

use crate::{Error, Result};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The capability to debit one specific purse.
///
/// This is the payload sealed into every purse's box. Only a holder of the
/// mint's unsealer can get at it, which is exactly what makes `deposit`
/// safe: possession of a purse grants no authority over its balance.
#[derive(Clone)]
struct DecrementCap {
    balance: Arc<Mutex<u64>>,
}

impl DecrementCap {
    fn decrement(&self, amount: u64) -> Result<()> {
        let mut balance = lock(&self.balance);
        if amount > *balance {
            return Err(Error::InsufficientFunds {
                requested: amount,
                available: *balance,
            });
        }
        *balance -= amount;
        Ok(())
    }

    /// Undo a decrement that just happened. The amount was debited from the
    /// same conserved supply moments before, so this cannot overflow.
    fn refund(&self, amount: u64) {
        let mut balance = lock(&self.balance);
        *balance = balance.saturating_add(amount);
    }
}

/// Issues purses for one currency and mediates deposits between them.
pub struct Mint {
    currency: String,
    sealer: Sealer<DecrementCap>,
    unsealer: Unsealer<DecrementCap>,
}

impl Mint {
    /// Create a mint. Fails only if `currency` is empty.
    pub fn new(currency: impl Into<String>) -> Result<Self> {
        let currency = currency.into();
        let (sealer, unsealer) =
            Brand::make_pair(currency.clone()).map_err(|err| match err {
                brand::Error::InvalidArgument(message) => Error::InvalidArgument(message),
                other => Error::Brand(other),
            })?;
        Ok(Self {
            currency,
            sealer,
            unsealer,
        })
    }

    /// The currency this mint issues.
    pub fn currency(&self) -> &str {
        &self.currency
    }

    /// Issue an empty purse. Always succeeds.
    pub fn make_purse(&self) -> Purse {
        self.mint_purse(0)
    }

    /// Issue a purse pre-funded with `initial`.
    ///
    /// Host-side only: this creates money. Guests are handed purses, never
    /// the mint itself.
    pub fn mint_purse(&self, initial: u64) -> Purse {
        let balance = Arc::new(Mutex::new(initial));
        let decrement = DecrementCap {
            balance: Arc::clone(&balance),
        };
        Purse {
            balance,
            decrement_box: self.sealer.seal(decrement),
        }
    }

    /// Move `amount` from `source` into `target`.
    ///
    /// Proves that `source` belongs to this mint by unsealing its decrement
    /// box; a purse of any other mint fails with [`Error::ForeignPurse`]
    /// before any state changes. The debit and credit are all-or-nothing:
    /// an [`Error::InsufficientFunds`] leaves both purses untouched, and a
    /// credit overflow refunds the debit before reporting.
    pub fn deposit(&self, target: &Purse, amount: u64, source: &Purse) -> Result<()> {
        let decrement = self
            .unsealer
            .unseal(&source.decrement_box)
            .map_err(|err| match err {
                brand::Error::BrandMismatch { .. } => Error::ForeignPurse {
                    currency: self.currency.clone(),
                },
                other => Error::Brand(other),
            })?;

        decrement.decrement(amount)?;
        if let Err(err) = target.credit(amount) {
            decrement.refund(amount);
            return Err(err);
        }
        Ok(())
    }
}

impl fmt::Debug for Mint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mint").field("currency", &self.currency).finish()
    }
}

/// A non-negative balance plus the sealed capability to debit it.
pub struct Purse {
    balance: Arc<Mutex<u64>>,
    decrement_box: SealedBox<DecrementCap>,
}

impl Purse {
    /// The current balance.
    pub fn balance(&self) -> u64 {
        *lock(&self.balance)
    }

    fn credit(&self, amount: u64) -> Result<()> {
        let mut balance = lock(&self.balance);
        *balance = balance.checked_add(amount).ok_or(Error::Overflow)?;
        Ok(())
    }
}

impl fmt::Debug for Purse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Purse")
            .field("currency", &self.decrement_box.brand_name())
            .field("balance", &self.balance())
            .finish()
    }
}
