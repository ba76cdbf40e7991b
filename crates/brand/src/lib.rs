//! Unforgeable sealer/unsealer capability pairs.
//!
//! A [`Brand`] is a named capability domain that produces exactly two
//! capabilities: a [`Sealer`] that wraps a payload into an opaque
//! [`SealedBox`], and an [`Unsealer`] that can extract the payload — but
//! only from boxes made by the matching sealer. Holding a box grants
//! nothing; holding the unsealer proves membership in the brand's domain.
//!
//! This is the primitive used to build private channels between mutually
//! suspicious parties: party A seals a payload and hands the box to B; B
//! can pass it around freely but learns nothing, and only a holder of A's
//! unsealer can open it. Provenance is structural, not a type tag — a box
//! communicates with its brand through a private cell that no other code
//! can observe or write, so forgery and duck-typing spoofs are impossible
//! by construction.
//!
//! # Example
//!
//! ```
//! use brand::Brand;
//!
//! let brand = Brand::new("invites")?;
//! let boxed = brand.sealer().seal("golden ticket");
//! assert_eq!(brand.unsealer().unseal(&boxed)?, "golden ticket");
//!
//! // A different brand's unsealer cannot open it.
//! let other = Brand::<&str>::new("tickets")?;
//! assert!(other.unsealer().unseal(&boxed).is_err());
//! # Ok::<(), brand::Error>(())
//! ```

mod error;
mod sealing;

pub use error::{Error, Result};
pub use sealing::{Brand, SealedBox, Sealer, Unsealer};
