// SPDX-License-Identifier: MIT OR Apache-2.0
//! Built-in node kinds.
//!
//! Each submodule provides behaviors plus a `types()` function returning
//! their type definitions. Nodes with a selectable operator keep it in
//! non-reactive state as `{"operator": "<symbol>"}`.

pub mod logic;
pub mod math;
pub mod random;
pub mod timing;
pub mod value;

use crate::node::NodeTypeDef;

/// Key of the operator in non-reactive state
pub const OPERATOR_KEY: &str = "operator";

/// Every built-in type in menu order
pub fn builtin_types() -> Vec<NodeTypeDef> {
    let mut types = Vec::new();
    types.extend(value::types());
    types.extend(math::types());
    types.extend(logic::types());
    types.extend(random::types());
    types.extend(timing::types());
    types
}

/// An operator selectable on a node
pub trait Operator: Copy + Sized + 'static {
    /// All operators in menu order
    const ALL: &'static [Self];

    /// Display and persisted symbol
    fn symbol(self) -> &'static str;

    /// Parse a persisted symbol
    fn from_symbol(symbol: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|op| op.symbol() == symbol)
    }
}

/// Persisted form of an operator
pub(crate) fn operator_state<O: Operator>(op: O) -> serde_json::Value {
    let mut state = serde_json::Map::new();
    state.insert(OPERATOR_KEY.to_string(), op.symbol().into());
    serde_json::Value::Object(state)
}

/// Read an operator from persisted state. Absent means keep the current one.
pub(crate) fn read_operator<O: Operator>(other: &serde_json::Value) -> Result<Option<O>, String> {
    match other.get(OPERATOR_KEY) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(symbol)) => O::from_symbol(symbol)
            .map(Some)
            .ok_or_else(|| format!("unknown operator '{symbol}'")),
        Some(other) => Err(format!("operator must be a string, got {other}")),
    }
}
