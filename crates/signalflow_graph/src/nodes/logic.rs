// SPDX-License-Identifier: MIT OR Apache-2.0
//! Boolean logic, conversions, toggles and last-changed selectors.

use super::{operator_state, read_operator, Operator};
use crate::behavior::{NodeBehavior, Outcome, TransformCx};
use crate::handle::{DataType, HandleDef, Value, SIGNAL_IN};
use crate::node::{NodeTypeDef, Tag};

/// Signal fired when a Boolean node's output turns true
pub const SIGNAL_TRUE: &str = "signalTrue";

/// Boolean operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BooleanOp {
    /// `&`
    And,
    /// `|`
    Or,
}

impl Operator for BooleanOp {
    const ALL: &'static [Self] = &[Self::And, Self::Or];

    fn symbol(self) -> &'static str {
        match self {
            Self::And => "&",
            Self::Or => "|",
        }
    }
}

/// `p_1 <op> p_2`, optionally inverted
#[derive(Debug)]
pub struct BooleanNode {
    op: BooleanOp,
}

impl BooleanNode {
    /// Type identifier
    pub const NAME: &'static str = "Boolean";

    /// Behavior factory
    pub fn create() -> Box<dyn NodeBehavior> {
        Box::new(Self { op: BooleanOp::And })
    }
}

impl NodeBehavior for BooleanNode {
    fn transform(&mut self, cx: &mut TransformCx<'_>, _trigger: &str) -> Outcome {
        let (a, b) = (cx.boolean("p_1"), cx.boolean("p_2"));
        let result = match self.op {
            BooleanOp::And => a && b,
            BooleanOp::Or => a || b,
        };
        Outcome::Emit(Value::Boolean(result != cx.boolean("invert")))
    }

    fn on_output_change(&mut self, cx: &mut TransformCx<'_>, previous: Option<Value>) {
        let was_true = previous.is_some_and(Value::as_bool);
        if cx.output().is_some_and(Value::as_bool) && !was_true {
            cx.fire(SIGNAL_TRUE);
        }
    }

    fn save_state(&self) -> serde_json::Value {
        operator_state(self.op)
    }

    fn restore_state(&mut self, other: &serde_json::Value) -> Result<(), String> {
        if let Some(op) = read_operator(other)? {
            self.op = op;
        }
        Ok(())
    }
}

/// Number to boolean
#[derive(Debug, Default)]
pub struct ToBooleanNode;

impl ToBooleanNode {
    /// Type identifier
    pub const NAME: &'static str = "To Boolean";

    /// Behavior factory
    pub fn create() -> Box<dyn NodeBehavior> {
        Box::new(Self)
    }
}

impl NodeBehavior for ToBooleanNode {
    fn transform(&mut self, cx: &mut TransformCx<'_>, _trigger: &str) -> Outcome {
        Outcome::Emit(Value::Boolean(cx.boolean("input")))
    }
}

/// Boolean to number
#[derive(Debug, Default)]
pub struct ToNumberNode;

impl ToNumberNode {
    /// Type identifier
    pub const NAME: &'static str = "To Number";

    /// Behavior factory
    pub fn create() -> Box<dyn NodeBehavior> {
        Box::new(Self)
    }
}

impl NodeBehavior for ToNumberNode {
    fn transform(&mut self, cx: &mut TransformCx<'_>, _trigger: &str) -> Outcome {
        Outcome::Emit(Value::Number(cx.number("input")))
    }
}

/// Flips its output on each bang
#[derive(Debug, Default)]
pub struct ToggleNode;

impl ToggleNode {
    /// Type identifier
    pub const NAME: &'static str = "Toggle";

    /// Behavior factory
    pub fn create() -> Box<dyn NodeBehavior> {
        Box::new(Self)
    }
}

impl NodeBehavior for ToggleNode {
    fn transform(&mut self, cx: &mut TransformCx<'_>, trigger: &str) -> Outcome {
        if trigger != SIGNAL_IN {
            return Outcome::Unchanged;
        }
        let current = cx.output().is_some_and(Value::as_bool);
        Outcome::Emit(Value::Boolean(!current))
    }
}

/// Outputs whichever of `p1`/`p2` changed last
#[derive(Debug, Default)]
pub struct LastChangedNode;

impl LastChangedNode {
    /// Number variant identifier
    pub const NUMBER_NAME: &'static str = "Last Changed Number";
    /// Boolean variant identifier
    pub const BOOLEAN_NAME: &'static str = "Last Changed Boolean";

    /// Behavior factory
    pub fn create() -> Box<dyn NodeBehavior> {
        Box::new(Self)
    }
}

impl NodeBehavior for LastChangedNode {
    fn transform(&mut self, cx: &mut TransformCx<'_>, trigger: &str) -> Outcome {
        match trigger {
            "p1" | "p2" => cx.value(trigger).map_or(Outcome::Unchanged, Outcome::Emit),
            _ => Outcome::Unchanged,
        }
    }
}

fn last_changed(name: &str, data_type: DataType) -> NodeTypeDef {
    NodeTypeDef::builtin(name, LastChangedNode::create)
        .handle(HandleDef::input("p1", data_type))
        .handle(HandleDef::input("p2", data_type))
        .handle(HandleDef::main_output(data_type))
}

/// Type definitions for this module
pub fn types() -> Vec<NodeTypeDef> {
    vec![
        NodeTypeDef::builtin(BooleanNode::NAME, BooleanNode::create)
            .handle(HandleDef::input("p_1", DataType::Boolean))
            .handle(HandleDef::input("p_2", DataType::Boolean))
            .handle(HandleDef::input("invert", DataType::Boolean).with_label("Invert"))
            .handle(HandleDef::main_output(DataType::Boolean))
            .handle(HandleDef::signal_out(SIGNAL_TRUE).with_label("Signal if true"))
            .tag(Tag::Operation),
        NodeTypeDef::builtin(ToBooleanNode::NAME, ToBooleanNode::create)
            .handle(HandleDef::input("input", DataType::Number))
            .handle(HandleDef::main_output(DataType::Boolean)),
        NodeTypeDef::builtin(ToNumberNode::NAME, ToNumberNode::create)
            .handle(HandleDef::input("input", DataType::Boolean))
            .handle(HandleDef::main_output(DataType::Number)),
        NodeTypeDef::builtin(ToggleNode::NAME, ToggleNode::create)
            .handle(HandleDef::main_output(DataType::Boolean))
            .bangable()
            .action_label("Toggle"),
        last_changed(LastChangedNode::NUMBER_NAME, DataType::Number),
        last_changed(LastChangedNode::BOOLEAN_NAME, DataType::Boolean),
    ]
}
