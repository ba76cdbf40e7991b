//! Policy-applying membrane between host objects and guest code.
//!
//! Host-side ("feral") objects are dangerous to expose directly: a single
//! leaked reference hands out everything the object can do. The membrane
//! wraps each feral object in a [`TamedRef`] that mediates every property
//! read, property write, and method call through the [`policy::Table`]
//! registered for the object's type. Values crossing the boundary are
//! recursively tamed (objects wrapped) on the way out and untamed
//! (unwrapped to their feral originals) on the way in, so guest code never
//! holds a raw host reference.
//!
//! Wrapping is identity-stable: wrapping the same feral object twice
//! yields the same tamed node, so identity comparisons behave consistently
//! on the guest side. The association is weak — the membrane keeps neither
//! side alive.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use membrane::{FeralObject, Membrane, TamedValue};
//! use policy::Table;
//!
//! # fn demo(gadget: Arc<dyn FeralObject>, table: Table) -> membrane::Result<()> {
//! let membrane = Membrane::new();
//! membrane.register_policy("gadget", table)?;
//!
//! let tamed = membrane.wrap(gadget)?;
//! let label = membrane.get_property(&tamed, "label")?;
//! membrane.call(&tamed, "high_five", vec![TamedValue::from("5")])?;
//! # Ok(())
//! # }
//! ```

mod engine;
mod error;
mod feral;

pub use engine::{Membrane, TamedRef, TamedValue};
pub use error::{Error, Result};
pub use feral::{FeralError, FeralObject, FeralValue};
