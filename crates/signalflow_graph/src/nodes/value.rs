// SPDX-License-Identifier: MIT OR Apache-2.0
//! Value holders and the plain bang source.

use crate::behavior::{NodeBehavior, Outcome, TransformCx};
use crate::handle::{DataType, HandleDef, SIGNAL_IN};
use crate::node::NodeTypeDef;

/// Passes `in` through to its output
#[derive(Debug, Default)]
pub struct NumberNode;

impl NumberNode {
    /// Type identifier
    pub const NAME: &'static str = "Number";

    /// Behavior factory
    pub fn create() -> Box<dyn NodeBehavior> {
        Box::new(Self)
    }
}

impl NodeBehavior for NumberNode {
    fn transform(&mut self, cx: &mut TransformCx<'_>, _trigger: &str) -> Outcome {
        cx.value("in").map_or(Outcome::Unchanged, Outcome::Emit)
    }
}

/// Latches `in` into its output on each bang
#[derive(Debug, Default)]
pub struct SetValueNode;

impl SetValueNode {
    /// Number variant identifier
    pub const NUMBER_NAME: &'static str = "Set Number";
    /// Boolean variant identifier
    pub const BOOLEAN_NAME: &'static str = "Set Boolean";

    /// Behavior factory
    pub fn create() -> Box<dyn NodeBehavior> {
        Box::new(Self)
    }
}

impl NodeBehavior for SetValueNode {
    fn transform(&mut self, cx: &mut TransformCx<'_>, trigger: &str) -> Outcome {
        if trigger != SIGNAL_IN {
            return Outcome::Suppress;
        }
        cx.value("in").map_or(Outcome::Unchanged, Outcome::Emit)
    }
}

/// Passes bangs straight through
#[derive(Debug, Default)]
pub struct BangNode;

impl BangNode {
    /// Type identifier
    pub const NAME: &'static str = "Bang";

    /// Behavior factory
    pub fn create() -> Box<dyn NodeBehavior> {
        Box::new(Self)
    }
}

impl NodeBehavior for BangNode {
    fn transform(&mut self, _cx: &mut TransformCx<'_>, trigger: &str) -> Outcome {
        if trigger == SIGNAL_IN {
            Outcome::Unchanged
        } else {
            Outcome::Suppress
        }
    }
}

fn set_value(name: &str, data_type: DataType) -> NodeTypeDef {
    NodeTypeDef::builtin(name, SetValueNode::create)
        .handle(HandleDef::input("in", data_type))
        .handle(HandleDef::main_output(data_type))
        .bangable()
        .action_label("Set")
}

/// Type definitions for this module
pub fn types() -> Vec<NodeTypeDef> {
    vec![
        NodeTypeDef::builtin(BangNode::NAME, BangNode::create)
            .bangable()
            .action_label("Bang"),
        NodeTypeDef::builtin(NumberNode::NAME, NumberNode::create)
            .handle(HandleDef::input("in", DataType::Number))
            .handle(HandleDef::main_output(DataType::Number)),
        set_value(SetValueNode::NUMBER_NAME, DataType::Number),
        set_value(SetValueNode::BOOLEAN_NAME, DataType::Boolean),
    ]
}
