//! Network capability consumed by the core
//!
//! The byte-level protocol and the session that actually talks to the
//! controller live outside this crate. Everything the core needs from them
//! is the [`Network`] trait: text queries in, [`Value`]s out.
//!
//! Query shape:
//!
//! ```text
//! <address> <objectType> <objectInstance> <property> [<property> ...]
//! ```
//!
//! Batched reads repeat `<objectType> <objectInstance> presentValue` after the
//! address, once per point.

mod simulated;

pub use simulated::{ControllerFixture, FixtureError, ObjectFixture, SimulatedController, SimulatorStats};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Property read for present values
pub const PRESENT_VALUE: &str = "presentValue";

/// Object type of the controller itself
pub const DEVICE_OBJECT: &str = "device";

/// A value exchanged with the network capability
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Boolean
    Boolean(bool),
    /// Unsigned integer (enumerations, multi-state values, instances)
    Unsigned(u64),
    /// Floating point value
    Real(f64),
    /// Character string or enumeration token
    Text(String),
    /// Sequence of values (object lists, state tables)
    List(Vec<Value>),
    /// No value
    Null,
}

impl Value {
    /// Get as text, if this is a character string
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Get as unsigned integer
    pub fn as_unsigned(&self) -> Option<u64> {
        match self {
            Self::Unsigned(n) => Some(*n),
            Self::Real(f) if *f >= 0.0 && f.fract() == 0.0 => Some(*f as u64),
            _ => None,
        }
    }

    /// Get as floating point number
    pub fn as_real(&self) -> Option<f64> {
        match self {
            Self::Real(f) => Some(*f),
            Self::Unsigned(n) => Some(*n as f64),
            _ => None,
        }
    }

    /// Get as list
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Check for null
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Render as a plain string (text values are not quoted)
    pub fn to_text(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boolean(b) => write!(f, "{}", b),
            Self::Unsigned(n) => write!(f, "{}", n),
            Self::Real(v) => write!(f, "{}", v),
            Self::Text(s) => write!(f, "{:?}", s),
            Self::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Self::Null => write!(f, "null"),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

impl From<u64> for Value {
    fn from(n: u64) -> Self {
        Self::Unsigned(n)
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Self::Unsigned(u64::from(n))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Real(v)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Self::List(items.into_iter().map(Into::into).collect())
    }
}

/// Object identifier: (object type, instance)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId {
    /// Symbolic object type, e.g. `analogInput`
    pub object_type: String,
    /// Object instance on the controller
    pub instance: u32,
}

impl ObjectId {
    /// Create a new object identifier
    pub fn new(object_type: impl Into<String>, instance: u32) -> Self {
        Self {
            object_type: object_type.into(),
            instance,
        }
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.object_type, self.instance)
    }
}

/// Build a read query for one object and one or more properties
pub fn property_query(address: &str, object: &ObjectId, properties: &[&str]) -> String {
    let mut query = format!("{} {}", address, object);
    for property in properties {
        query.push(' ');
        query.push_str(property);
    }
    query
}

/// Errors raised by the network capability
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
    /// No response (timeout, controller offline)
    #[error("No response from controller: {0}")]
    Unreachable(String),

    /// Write rejected by the controller
    #[error("Write access denied: {0}")]
    AccessDenied(String),

    /// Any other negative response (unknown object, unknown property...)
    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// Network capability used to reach one or more controllers
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Network: Send + Sync {
    /// Read a single property
    async fn read(&self, query: &str) -> Result<Value, NetworkError>;

    /// Read several properties (possibly of several objects) in one request.
    /// Values come back in request order.
    async fn read_multiple(&self, query: &str) -> Result<Vec<Value>, NetworkError>;

    /// Write a property
    async fn write(&self, query: &str) -> Result<(), NetworkError>;
}
