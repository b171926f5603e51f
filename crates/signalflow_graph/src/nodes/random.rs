// SPDX-License-Identifier: MIT OR Apache-2.0
//! Random number and chance nodes.

use crate::behavior::{NodeBehavior, Outcome, TransformCx};
use crate::handle::{DataType, HandleDef, Value, SIGNAL_IN};
use crate::node::NodeTypeDef;

/// Integer in `[min, max]` from a uniform `r` in `[0, 1)`
fn roll(r: f64, min: f64, max: f64) -> f64 {
    (r * (max - min + 1.0)).floor() + min
}

/// Random integer in `[min, max]` on each bang
#[derive(Debug, Default)]
pub struct RngNode;

impl RngNode {
    /// Type identifier
    pub const NAME: &'static str = "RNG";

    /// Behavior factory
    pub fn create() -> Box<dyn NodeBehavior> {
        Box::new(Self)
    }
}

impl NodeBehavior for RngNode {
    fn transform(&mut self, cx: &mut TransformCx<'_>, trigger: &str) -> Outcome {
        if trigger != SIGNAL_IN {
            return Outcome::Suppress;
        }
        let r = cx.random();
        Outcome::Emit(Value::Number(roll(r, cx.number("min"), cx.number("max"))))
    }
}

/// Succeeds with roughly `percent`% probability
#[derive(Debug, Default)]
pub struct ChancePercentNode;

impl ChancePercentNode {
    /// Type identifier
    pub const NAME: &'static str = "Chance Percent";

    /// Behavior factory
    pub fn create() -> Box<dyn NodeBehavior> {
        Box::new(Self)
    }
}

impl NodeBehavior for ChancePercentNode {
    fn transform(&mut self, cx: &mut TransformCx<'_>, trigger: &str) -> Outcome {
        if trigger != SIGNAL_IN {
            return Outcome::Unchanged;
        }
        let r = cx.random();
        Outcome::Emit(Value::Boolean(roll(r, 1.0, 100.0) < cx.number("percent")))
    }
}

/// Succeeds when a roll in `[min, max]` reaches `pass`
#[derive(Debug, Default)]
pub struct ChanceThresholdNode;

impl ChanceThresholdNode {
    /// Type identifier
    pub const NAME: &'static str = "Chance Threshold";

    /// Behavior factory
    pub fn create() -> Box<dyn NodeBehavior> {
        Box::new(Self)
    }
}

impl NodeBehavior for ChanceThresholdNode {
    fn transform(&mut self, cx: &mut TransformCx<'_>, trigger: &str) -> Outcome {
        if trigger != SIGNAL_IN {
            return Outcome::Unchanged;
        }
        let r = cx.random();
        let rolled = roll(r, cx.number("min"), cx.number("max"));
        Outcome::Emit(Value::Boolean(rolled >= cx.number("pass")))
    }
}

/// Type definitions for this module
pub fn types() -> Vec<NodeTypeDef> {
    vec![
        NodeTypeDef::builtin(RngNode::NAME, RngNode::create)
            .handle(
                HandleDef::input("max", DataType::Number)
                    .with_label("Max")
                    .with_default(10.0),
            )
            .handle(
                HandleDef::input("min", DataType::Number)
                    .with_label("Min")
                    .with_default(1.0),
            )
            .handle(HandleDef::main_output(DataType::Number))
            .bangable()
            .action_label("Generate"),
        NodeTypeDef::builtin(ChancePercentNode::NAME, ChancePercentNode::create)
            .handle(
                HandleDef::input("percent", DataType::Number)
                    .with_label("% Chance")
                    .with_default(50.0),
            )
            .handle(HandleDef::main_output(DataType::Boolean))
            .bangable()
            .action_label("Try"),
        NodeTypeDef::builtin(ChanceThresholdNode::NAME, ChanceThresholdNode::create)
            .handle(HandleDef::input("max", DataType::Number).with_label("Max"))
            .handle(HandleDef::input("min", DataType::Number).with_label("Min"))
            .handle(HandleDef::input("pass", DataType::Number).with_label("Pass"))
            .handle(HandleDef::main_output(DataType::Boolean))
            .bangable()
            .action_label("Try"),
    ]
}
