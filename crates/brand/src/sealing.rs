//! The sealed-box protocol.
//!
//! Each brand owns a private scratch cell. A box never returns its payload;
//! its crate-private `provoke` deposits a copy into the owning brand's cell
//! and raises a flag. The unsealer clears the cell, provokes the box, and
//! checks the flag: a box of a foreign brand deposits into the *foreign*
//! brand's cell, so the flag here stays down and the unseal fails. The cell
//! is cleared again after every attempt so no payload is retained.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::{Error, Result};

/// Scratch state written by `provoke` and read back by `unseal`.
struct Cell<T> {
    value: Option<T>,
    flag: bool,
}

/// State shared by a brand's sealer, unsealer, and every box it seals.
struct Shared<T> {
    name: String,
    cell: Mutex<Cell<T>>,
    /// Serializes provoke-then-read sequences touching this brand's cell.
    /// Every unseal takes the guard of *both* brands involved (the
    /// unsealer's and the box's), so not even a cross-brand provoke can
    /// land inside another brand's provoke-then-read window.
    unseal_guard: Mutex<()>,
}

// A poisoned lock means some holder panicked mid-access; the cell is
// cleared at the start and end of every unseal, so stale state is harmless.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A named capability domain producing a matched [`Sealer`]/[`Unsealer`]
/// pair.
///
/// Create one brand per capability domain (per currency, per channel) and
/// hand out the two capabilities separately; whoever holds both can prove
/// and verify provenance, whoever holds neither can do nothing with a box.
pub struct Brand<T: Clone> {
    shared: Arc<Shared<T>>,
}

impl<T: Clone> Brand<T> {
    /// Create a brand. Fails only if `name` is empty.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(Error::InvalidArgument(
                "brand name must be non-empty".into(),
            ));
        }
        Ok(Self {
            shared: Arc::new(Shared {
                name,
                cell: Mutex::new(Cell {
                    value: None,
                    flag: false,
                }),
                unseal_guard: Mutex::new(()),
            }),
        })
    }

    /// Create a brand and return its two capabilities directly.
    pub fn make_pair(name: impl Into<String>) -> Result<(Sealer<T>, Unsealer<T>)> {
        let brand = Self::new(name)?;
        Ok((brand.sealer(), brand.unsealer()))
    }

    /// The brand's domain name.
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// The sealing capability for this brand.
    pub fn sealer(&self) -> Sealer<T> {
        Sealer {
            shared: Arc::clone(&self.shared),
        }
    }

    /// The unsealing capability for this brand.
    pub fn unsealer(&self) -> Unsealer<T> {
        Unsealer {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Clone> fmt::Debug for Brand<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Brand").field("name", &self.shared.name).finish()
    }
}

/// Wraps payloads into opaque boxes for one brand.
pub struct Sealer<T: Clone> {
    shared: Arc<Shared<T>>,
}

impl<T: Clone> Sealer<T> {
    /// Seal a payload into a box.
    ///
    /// Pure allocation: no brand state is touched until the box is later
    /// provoked by an unseal attempt.
    pub fn seal(&self, payload: T) -> SealedBox<T> {
        SealedBox {
            payload,
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Clone> Clone for Sealer<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Clone> fmt::Debug for Sealer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sealer").field("brand", &self.shared.name).finish()
    }
}

/// Extracts payloads from boxes sealed by the matching [`Sealer`].
pub struct Unsealer<T: Clone> {
    shared: Arc<Shared<T>>,
}

impl<T: Clone> Unsealer<T> {
    /// Open a box, returning its payload.
    ///
    /// Fails with [`Error::BrandMismatch`] for any box not sealed by this
    /// brand's sealer. Re-unsealing the same box is allowed and always
    /// succeeds for the matching unsealer.
    pub fn unseal(&self, boxed: &SealedBox<T>) -> Result<T> {
        // Take the guard of every brand this sequence touches: ours for
        // the clear-and-read side, the box's for the provoke side. A
        // foreign box deposits into *its* brand's cell, and that write
        // must not land inside that brand's own provoke-then-read window.
        // Address order prevents deadlock between opposed unseals.
        let mine = &self.shared.unseal_guard;
        let theirs = &boxed.shared.unseal_guard;
        let _guards = if std::ptr::eq(mine, theirs) {
            (lock(mine), None)
        } else if (mine as *const Mutex<()>) < (theirs as *const Mutex<()>) {
            let first = lock(mine);
            let second = lock(theirs);
            (first, Some(second))
        } else {
            let second = lock(theirs);
            let first = lock(mine);
            (first, Some(second))
        };

        {
            let mut cell = lock(&self.shared.cell);
            cell.value = None;
            cell.flag = false;
        }

        // The cell lock is not held here: a box of this same brand must be
        // able to take it inside provoke.
        boxed.provoke();

        let mut cell = lock(&self.shared.cell);
        let flag = cell.flag;
        let value = cell.value.take();
        cell.flag = false;

        match (flag, value) {
            (true, Some(payload)) => Ok(payload),
            _ => Err(Error::BrandMismatch {
                brand: self.shared.name.clone(),
            }),
        }
    }
}

impl<T: Clone> Clone for Unsealer<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Clone> fmt::Debug for Unsealer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unsealer").field("brand", &self.shared.name).finish()
    }
}

/// An opaque capsule holding exactly one payload.
///
/// There is no accessor for the payload; the only way out is through the
/// matching brand's [`Unsealer`]. Boxes are immutable and cheap to clone.
pub struct SealedBox<T: Clone> {
    payload: T,
    shared: Arc<Shared<T>>,
}

impl<T: Clone> SealedBox<T> {
    /// The name of the brand that sealed this box.
    pub fn brand_name(&self) -> &str {
        &self.shared.name
    }

    /// Deposit the payload into the owning brand's cell and raise the flag.
    ///
    /// Crate-private: this is the box's only output channel, and only the
    /// matching unsealer reads the cell immediately afterwards.
    fn provoke(&self) {
        let mut cell = lock(&self.shared.cell);
        cell.value = Some(self.payload.clone());
        cell.flag = true;
    }
}

impl<T: Clone> Clone for SealedBox<T> {
    fn clone(&self) -> Self {
        Self {
            payload: self.payload.clone(),
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Clone> fmt::Debug for SealedBox<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never reveal the payload.
        f.debug_struct("SealedBox").field("brand", &self.shared.name).finish()
    }
}
