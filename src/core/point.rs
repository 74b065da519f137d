//! Points: named, classified data on a remote controller
//!
//! A point is created once during discovery. Afterwards only its cached
//! value, its trend history and its simulated flag change.

use super::controller::Controller;
use super::error::{Error, Result};
use super::network::{ObjectId, Value, PRESENT_VALUE};
use chrono::{DateTime, Local};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Weak;

/// Point family, decided once from the object type at discovery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PointFamily {
    /// Analog objects and anything not binary or multi-state
    Numeric,
    /// Binary objects
    Boolean,
    /// Multi-state objects
    Enum,
}

impl PointFamily {
    /// Classify an object type token
    pub fn classify(object_type: &str) -> Self {
        if object_type.contains("binary") {
            Self::Boolean
        } else if object_type.contains("multiState") {
            Self::Enum
        } else {
            Self::Numeric
        }
    }

    /// Properties read at discovery on top of name, description and present value
    pub fn metadata_properties(&self) -> &'static [&'static str] {
        match self {
            Self::Numeric => &["units"],
            Self::Boolean => &["inactiveText", "activeText"],
            Self::Enum => &["stateText"],
        }
    }

    /// Get name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Numeric => "Numeric",
            Self::Boolean => "Boolean",
            Self::Enum => "Enum",
        }
    }
}

impl fmt::Display for PointFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

/// Family-specific metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PointKind {
    /// Analog value with engineering units
    Numeric {
        /// Units string
        units: String,
    },
    /// Two-state value
    Boolean {
        /// Text shown for the inactive state
        inactive_text: String,
        /// Text shown for the active state
        active_text: String,
    },
    /// Multi-state value, states are numbered from 1
    Enum {
        /// State names, in state order
        states: Vec<String>,
    },
}

impl PointKind {
    /// Family of this kind
    pub fn family(&self) -> PointFamily {
        match self {
            Self::Numeric { .. } => PointFamily::Numeric,
            Self::Boolean { .. } => PointFamily::Boolean,
            Self::Enum { .. } => PointFamily::Enum,
        }
    }

    /// Units for numeric points, state texts for the others
    pub fn units_or_states(&self) -> String {
        match self {
            Self::Numeric { units } => units.clone(),
            Self::Boolean { inactive_text, active_text } => format!("{}/{}", inactive_text, active_text),
            Self::Enum { states } => states.join("/"),
        }
    }
}

/// One observed value
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendSample {
    /// Value read
    pub value: Value,
    /// When it was recorded
    pub timestamp: DateTime<Local>,
}

#[derive(Debug)]
struct PointState {
    value: Value,
    history: Vec<TrendSample>,
    simulated: bool,
}

/// A point on a remote controller
pub struct Point {
    object: ObjectId,
    name: String,
    description: String,
    kind: PointKind,
    state: RwLock<PointState>,
    controller: Weak<Controller>,
}

impl Point {
    /// Create a point. `value` is the present value read at discovery.
    pub(crate) fn new(
        object: ObjectId,
        name: String,
        description: String,
        kind: PointKind,
        value: Value,
        controller: Weak<Controller>,
    ) -> Self {
        Self {
            object,
            name,
            description,
            kind,
            state: RwLock::new(PointState {
                value,
                history: Vec::new(),
                simulated: false,
            }),
            controller,
        }
    }

    /// Point name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Object identifier on the controller
    pub fn object(&self) -> &ObjectId {
        &self.object
    }

    /// Object type token
    pub fn object_type(&self) -> &str {
        &self.object.object_type
    }

    /// Object instance
    pub fn instance(&self) -> u32 {
        self.object.instance
    }

    /// Description
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Family
    pub fn family(&self) -> PointFamily {
        self.kind.family()
    }

    /// Family-specific metadata
    pub fn kind(&self) -> &PointKind {
        &self.kind
    }

    /// Last value obtained by a single read (or at discovery)
    pub fn value(&self) -> Value {
        self.state.read().value.clone()
    }

    /// Copy of the trend history, oldest first
    pub fn history(&self) -> Vec<TrendSample> {
        self.state.read().history.clone()
    }

    /// Number of trend samples
    pub fn history_len(&self) -> usize {
        self.state.read().history.len()
    }

    /// Most recent trend sample
    pub fn last_sample(&self) -> Option<TrendSample> {
        self.state.read().history.last().cloned()
    }

    /// Check if the point is currently simulated (out of service)
    pub fn is_simulated(&self) -> bool {
        self.state.read().simulated
    }

    /// Flag the point as simulated. Called by override/simulation paths.
    pub fn set_simulated(&self, simulated: bool) {
        self.state.write().simulated = simulated;
    }

    /// Map a raw value to its state text (binary and multi-state points)
    pub fn state_label(&self, value: &Value) -> Option<String> {
        match &self.kind {
            PointKind::Numeric { .. } => None,
            PointKind::Boolean { inactive_text, active_text } => {
                let active = match value {
                    Value::Boolean(b) => *b,
                    Value::Text(t) if t == "active" => true,
                    Value::Text(t) if t == "inactive" => false,
                    other => other.as_unsigned()? != 0,
                };
                Some(if active { active_text.clone() } else { inactive_text.clone() })
            }
            PointKind::Enum { states } => {
                let index = value.as_unsigned()?.checked_sub(1)?;
                states.get(usize::try_from(index).ok()?).cloned()
            }
        }
    }

    /// Read the present value from the controller and refresh the cached value.
    /// History is left untouched.
    pub async fn read(&self) -> Result<Value> {
        let controller = self
            .controller
            .upgrade()
            .ok_or_else(|| Error::Detached(self.name.clone()))?;
        let value = controller.read_property(&self.object, PRESENT_VALUE).await?;
        self.state.write().value = value.clone();
        Ok(value)
    }

    /// Append a value to the trend history
    pub(crate) fn trend(&self, value: Value) {
        self.state.write().history.push(TrendSample {
            value,
            timestamp: Local::now(),
        });
    }

    /// `<type> <instance> presentValue`, as used in batched requests
    pub(crate) fn present_value_request(&self) -> String {
        format!("{} {}", self.object, PRESENT_VALUE)
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = self.value();
        match &self.kind {
            PointKind::Numeric { units } => write!(f, "{} : {} {}", self.name, value.to_text(), units),
            _ => match self.state_label(&value) {
                Some(label) => write!(f, "{} : {}", self.name, label),
                None => write!(f, "{} : {}", self.name, value.to_text()),
            },
        }
    }
}

impl fmt::Debug for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Point")
            .field("object", &self.object)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("state", &*self.state.read())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detached(kind: PointKind, value: Value) -> Point {
        Point::new(
            ObjectId::new("analogValue", 1),
            "SP".to_string(),
            String::new(),
            kind,
            value,
            Weak::new(),
        )
    }

    #[test]
    fn test_classify() {
        assert_eq!(PointFamily::classify("analogInput"), PointFamily::Numeric);
        assert_eq!(PointFamily::classify("binaryOutput"), PointFamily::Boolean);
        assert_eq!(PointFamily::classify("multiStateValue"), PointFamily::Enum);
        assert_eq!(PointFamily::classify("accumulator"), PointFamily::Numeric);
    }

    #[test]
    fn test_state_labels() {
        let binary = detached(
            PointKind::Boolean {
                inactive_text: "Off".to_string(),
                active_text: "On".to_string(),
            },
            Value::from("active"),
        );
        assert_eq!(binary.state_label(&Value::from("active")).as_deref(), Some("On"));
        assert_eq!(binary.state_label(&Value::Unsigned(0)).as_deref(), Some("Off"));
        assert_eq!(binary.to_string(), "SP : On");

        let enumerated = detached(
            PointKind::Enum {
                states: vec!["Occ".to_string(), "Unocc".to_string()],
            },
            Value::Unsigned(2),
        );
        assert_eq!(enumerated.state_label(&Value::Unsigned(1)).as_deref(), Some("Occ"));
        assert_eq!(enumerated.state_label(&Value::Unsigned(0)), None);
        assert_eq!(enumerated.state_label(&Value::Unsigned(3)), None);
    }

    #[test]
    fn test_trend_appends() {
        let point = detached(
            PointKind::Numeric {
                units: "degreesCelsius".to_string(),
            },
            Value::Real(20.0),
        );
        point.trend(Value::Real(21.0));
        point.trend(Value::Real(22.0));

        let history = point.history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].value, Value::Real(21.0));
        assert_eq!(point.last_sample().unwrap().value, Value::Real(22.0));
        // Trend updates do not touch the cached value
        assert_eq!(point.value(), Value::Real(20.0));
        assert_eq!(point.present_value_request(), "analogValue 1 presentValue");
    }

    #[tokio::test]
    async fn test_read_detached_point() {
        let point = detached(PointKind::Numeric { units: String::new() }, Value::Null);
        let err = point.read().await.unwrap_err();
        assert_eq!(err, Error::Detached("SP".to_string()));
    }
}
