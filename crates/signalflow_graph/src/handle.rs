// SPDX-License-Identifier: MIT OR Apache-2.0
//! Handle definitions: the typed connection points of a node.

use serde::{Deserialize, Serialize};

/// Canonical signal input of a bangable node
pub const SIGNAL_IN: &str = "_bangin";
/// Canonical signal output of a bangable node
pub const SIGNAL_OUT: &str = "_bangout";
/// The single continuous-value output
pub const MAIN_OUTPUT: &str = "_output";
/// Boolean input gating the node
pub const ACTIVE: &str = "_active";

/// Whether a handle id is one of the reserved ids
pub fn is_reserved(id: &str) -> bool {
    matches!(id, SIGNAL_IN | SIGNAL_OUT | MAIN_OUTPUT | ACTIVE)
}

/// Data type carried by a handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    /// 64-bit float
    Number,
    /// true/false
    Boolean,
    /// Valueless discrete event
    Signal,
}

impl DataType {
    /// Value a handle of this type holds before anything is written.
    /// Signals hold nothing.
    pub fn default_value(self) -> Option<Value> {
        match self {
            Self::Number => Some(Value::Number(0.0)),
            Self::Boolean => Some(Value::Boolean(false)),
            Self::Signal => None,
        }
    }

    /// Whether `value` fits this type
    pub fn accepts(self, value: Value) -> bool {
        matches!(
            (self, value),
            (Self::Number, Value::Number(_)) | (Self::Boolean, Value::Boolean(_))
        )
    }
}

/// Role of a handle on its node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HandleKind {
    /// Continuous value input
    Input,
    /// The node's canonical output
    MainOutput,
    /// Additional continuous or signal output
    ExtraOutput,
    /// Signal input
    SignalIn,
    /// Signal output
    SignalOut,
}

impl HandleKind {
    /// Whether an edge may start at this handle
    pub fn is_source(self) -> bool {
        matches!(self, Self::MainOutput | Self::ExtraOutput | Self::SignalOut)
    }

    /// Whether an edge may end at this handle
    pub fn is_target(self) -> bool {
        matches!(self, Self::Input | Self::SignalIn)
    }
}

/// A value stored in a handle
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Boolean value
    Boolean(bool),
    /// Numeric value
    Number(f64),
}

impl Value {
    /// Numeric view; booleans read as 0 or 1
    pub fn as_number(self) -> f64 {
        match self {
            Self::Number(n) => n,
            Self::Boolean(b) => f64::from(u8::from(b)),
        }
    }

    /// Boolean view; numbers are true when non-zero
    pub fn as_bool(self) -> bool {
        match self {
            Self::Boolean(b) => b,
            Self::Number(n) => n != 0.0 && !n.is_nan(),
        }
    }

    /// Data type of this value
    pub fn data_type(self) -> DataType {
        match self {
            Self::Boolean(_) => DataType::Boolean,
            Self::Number(_) => DataType::Number,
        }
    }

    /// Whether the value survives a JSON round trip
    pub fn is_persistable(self) -> bool {
        match self {
            Self::Number(n) => n.is_finite(),
            Self::Boolean(_) => true,
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

/// A handle on a node type
#[derive(Debug, Clone, PartialEq)]
pub struct HandleDef {
    /// Handle id, unique within the type
    pub id: String,
    /// Display label
    pub label: Option<String>,
    /// Data type
    pub data_type: DataType,
    /// Role
    pub kind: HandleKind,
    /// Initial value for value handles
    pub default: Option<Value>,
}

impl HandleDef {
    /// Create a handle
    pub fn new(id: impl Into<String>, data_type: DataType, kind: HandleKind) -> Self {
        Self {
            id: id.into(),
            label: None,
            data_type,
            kind,
            default: None,
        }
    }

    /// Value input
    pub fn input(id: impl Into<String>, data_type: DataType) -> Self {
        Self::new(id, data_type, HandleKind::Input)
    }

    /// The main output
    pub fn main_output(data_type: DataType) -> Self {
        Self::new(MAIN_OUTPUT, data_type, HandleKind::MainOutput)
    }

    /// Extra value output
    pub fn extra_output(id: impl Into<String>, data_type: DataType) -> Self {
        Self::new(id, data_type, HandleKind::ExtraOutput)
    }

    /// Extra signal output
    pub fn signal_out(id: impl Into<String>) -> Self {
        Self::new(id, DataType::Signal, HandleKind::SignalOut)
    }

    /// Extra signal input
    pub fn signal_in(id: impl Into<String>) -> Self {
        Self::new(id, DataType::Signal, HandleKind::SignalIn)
    }

    /// Set the display label
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Set the initial value
    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Value written into state when a node is created
    pub fn initial_value(&self) -> Option<Value> {
        if self.data_type == DataType::Signal {
            return None;
        }
        self.default.or_else(|| self.data_type.default_value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_serialization() {
        assert_eq!(serde_json::to_string(&Value::Number(2.5)).unwrap(), "2.5");
        assert_eq!(serde_json::to_string(&Value::Boolean(true)).unwrap(), "true");
        assert_eq!(serde_json::from_str::<Value>("3").unwrap(), Value::Number(3.0));
        assert_eq!(serde_json::from_str::<Value>("false").unwrap(), Value::Boolean(false));
    }

    #[test]
    fn test_data_type_names() {
        assert_eq!(serde_json::to_string(&DataType::Signal).unwrap(), "\"signal\"");
        assert_eq!(serde_json::from_str::<DataType>("\"number\"").unwrap(), DataType::Number);
    }

    #[test]
    fn test_initial_values() {
        assert_eq!(
            HandleDef::input("p1", DataType::Number).initial_value(),
            Some(Value::Number(0.0))
        );
        assert_eq!(
            HandleDef::input("min", DataType::Number).with_default(1.0).initial_value(),
            Some(Value::Number(1.0))
        );
        assert_eq!(HandleDef::signal_out("pulse").initial_value(), None);
    }

    #[test]
    fn test_kinds() {
        assert!(HandleKind::MainOutput.is_source());
        assert!(HandleKind::SignalOut.is_source());
        assert!(!HandleKind::Input.is_source());
        assert!(HandleKind::SignalIn.is_target());
        assert!(!HandleKind::ExtraOutput.is_target());
        assert!(DataType::Number.accepts(Value::Number(1.0)));
        assert!(!DataType::Signal.accepts(Value::Boolean(true)));
    }
}
