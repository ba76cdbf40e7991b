//! The host-object seam.

use std::sync::Arc;

use thiserror::Error;

/// Errors raised by feral objects themselves.
///
/// These are host-side failures on *allowed* operations; policy denials
/// never reach the feral object.
#[derive(Debug, Error)]
pub enum FeralError {
    #[error("no such property: {0}")]
    NoSuchProperty(String),

    #[error("no such method: {0}")]
    NoSuchMethod(String),

    #[error("{0}")]
    Other(String),
}

/// A value on the host side of the boundary.
#[derive(Clone)]
pub enum FeralValue {
    /// Plain data, passed through the membrane by copy.
    Data(serde_json::Value),
    /// A host object; must be tamed before a guest may touch it.
    Object(Arc<dyn FeralObject>),
}

impl std::fmt::Debug for FeralValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FeralValue::Data(value) => f.debug_tuple("Data").field(value).finish(),
            FeralValue::Object(object) => {
                f.debug_tuple("Object").field(&object.type_tag()).finish()
            }
        }
    }
}

impl From<serde_json::Value> for FeralValue {
    fn from(value: serde_json::Value) -> Self {
        FeralValue::Data(value)
    }
}

impl From<&str> for FeralValue {
    fn from(value: &str) -> Self {
        FeralValue::Data(value.into())
    }
}

impl From<u64> for FeralValue {
    fn from(value: u64) -> Self {
        FeralValue::Data(value.into())
    }
}

/// A host object the membrane can mediate.
///
/// Implementations use interior mutability; the membrane only ever holds
/// shared references. Calls the object makes to itself are its own
/// business — policy applies solely at the boundary, so an allowed method
/// may freely invoke members the table denies to guests.
pub trait FeralObject: Send + Sync {
    /// The tag used to look up this type's policy table.
    fn type_tag(&self) -> &str;

    /// Read a property.
    fn get(&self, property: &str) -> Result<FeralValue, FeralError>;

    /// Write a property.
    fn set(&self, property: &str, value: FeralValue) -> Result<(), FeralError>;

    /// Invoke a method with the object itself as receiver.
    fn call(&self, method: &str, args: Vec<FeralValue>) -> Result<FeralValue, FeralError>;
}
