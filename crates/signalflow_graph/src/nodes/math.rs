// SPDX-License-Identifier: MIT OR Apache-2.0
//! Arithmetic, modulus, comparison and counter nodes.

use super::{operator_state, read_operator, Operator};
use crate::behavior::{NodeBehavior, Outcome, TransformCx};
use crate::handle::{DataType, HandleDef, Value, SIGNAL_IN};
use crate::node::{NodeTypeDef, Tag};

/// Binary arithmetic operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MathOp {
    /// `+`
    Add,
    /// `-`
    Subtract,
    /// `*`
    Multiply,
    /// `/`
    Divide,
}

impl Operator for MathOp {
    const ALL: &'static [Self] = &[Self::Add, Self::Subtract, Self::Multiply, Self::Divide];

    fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Subtract => "-",
            Self::Multiply => "*",
            Self::Divide => "/",
        }
    }
}

impl MathOp {
    /// Apply the operator. Division by zero yields `None`.
    pub fn apply(self, a: f64, b: f64) -> Option<f64> {
        match self {
            Self::Add => Some(a + b),
            Self::Subtract => Some(a - b),
            Self::Multiply => Some(a * b),
            Self::Divide if b == 0.0 => None,
            Self::Divide => Some(a / b),
        }
    }
}

/// Comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOp {
    /// `==`
    Equal,
    /// `!=`
    NotEqual,
    /// `>`
    Greater,
    /// `<`
    Less,
    /// `>=`
    GreaterEqual,
    /// `<=`
    LessEqual,
}

impl Operator for ComparisonOp {
    const ALL: &'static [Self] = &[
        Self::Equal,
        Self::NotEqual,
        Self::Greater,
        Self::Less,
        Self::GreaterEqual,
        Self::LessEqual,
    ];

    fn symbol(self) -> &'static str {
        match self {
            Self::Equal => "==",
            Self::NotEqual => "!=",
            Self::Greater => ">",
            Self::Less => "<",
            Self::GreaterEqual => ">=",
            Self::LessEqual => "<=",
        }
    }
}

impl ComparisonOp {
    /// Compare two numbers
    pub fn apply(self, a: f64, b: f64) -> bool {
        match self {
            Self::Equal => a == b,
            Self::NotEqual => a != b,
            Self::Greater => a > b,
            Self::Less => a < b,
            Self::GreaterEqual => a >= b,
            Self::LessEqual => a <= b,
        }
    }
}

/// Counter step direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountOp {
    /// `++`
    Increment,
    /// `--`
    Decrement,
}

impl Operator for CountOp {
    const ALL: &'static [Self] = &[Self::Increment, Self::Decrement];

    fn symbol(self) -> &'static str {
        match self {
            Self::Increment => "++",
            Self::Decrement => "--",
        }
    }
}

/// `p1 <op> p2`
#[derive(Debug)]
pub struct MathNode {
    op: MathOp,
}

impl MathNode {
    /// Type identifier
    pub const NAME: &'static str = "Math";

    /// Behavior factory
    pub fn create() -> Box<dyn NodeBehavior> {
        Box::new(Self { op: MathOp::Add })
    }
}

impl NodeBehavior for MathNode {
    fn transform(&mut self, cx: &mut TransformCx<'_>, _trigger: &str) -> Outcome {
        match self.op.apply(cx.number("p1"), cx.number("p2")) {
            Some(result) => Outcome::Emit(Value::Number(result)),
            None => Outcome::Unchanged,
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

/// `p1 % p2 + offset`
#[derive(Debug, Default)]
pub struct ModNode;

impl ModNode {
    /// Type identifier
    pub const NAME: &'static str = "Modulus";

    /// Behavior factory
    pub fn create() -> Box<dyn NodeBehavior> {
        Box::new(Self)
    }
}

impl NodeBehavior for ModNode {
    fn transform(&mut self, cx: &mut TransformCx<'_>, _trigger: &str) -> Outcome {
        let remainder = cx.number("p1") % cx.number("p2");
        if remainder.is_nan() {
            return Outcome::Unchanged;
        }
        Outcome::Emit(Value::Number(remainder + cx.number("offset")))
    }
}

/// `p1 <cmp> p2`
#[derive(Debug)]
pub struct ComparisonNode {
    op: ComparisonOp,
}

impl ComparisonNode {
    /// Type identifier
    pub const NAME: &'static str = "Comparison";

    /// Behavior factory
    pub fn create() -> Box<dyn NodeBehavior> {
        Box::new(Self {
            op: ComparisonOp::Equal,
        })
    }
}

impl NodeBehavior for ComparisonNode {
    fn transform(&mut self, cx: &mut TransformCx<'_>, _trigger: &str) -> Outcome {
        Outcome::Emit(Value::Boolean(self.op.apply(cx.number("p1"), cx.number("p2"))))
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

/// Accumulator stepped on each bang
#[derive(Debug)]
pub struct CounterNode {
    op: CountOp,
}

impl CounterNode {
    /// Type identifier
    pub const NAME: &'static str = "Counter";

    /// Behavior factory
    pub fn create() -> Box<dyn NodeBehavior> {
        Box::new(Self {
            op: CountOp::Increment,
        })
    }
}

impl NodeBehavior for CounterNode {
    fn transform(&mut self, cx: &mut TransformCx<'_>, trigger: &str) -> Outcome {
        if trigger != SIGNAL_IN {
            return Outcome::Suppress;
        }
        let accumulator = cx.output().map_or(0.0, Value::as_number);
        let step = cx.number("step");
        let next = match self.op {
            CountOp::Increment => accumulator + step,
            CountOp::Decrement => accumulator - step,
        };
        Outcome::Emit(Value::Number(next))
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

/// Type definitions for this module
pub fn types() -> Vec<NodeTypeDef> {
    vec![
        NodeTypeDef::builtin(MathNode::NAME, MathNode::create)
            .handle(HandleDef::input("p1", DataType::Number))
            .handle(HandleDef::input("p2", DataType::Number))
            .handle(HandleDef::main_output(DataType::Number))
            .tag(Tag::Operation),
        NodeTypeDef::builtin(ModNode::NAME, ModNode::create)
            .handle(HandleDef::input("p1", DataType::Number).with_default(1.0))
            .handle(HandleDef::input("p2", DataType::Number).with_default(1.0))
            .handle(HandleDef::input("offset", DataType::Number).with_label("Offset"))
            .handle(HandleDef::main_output(DataType::Number))
            .tag(Tag::Operation),
        NodeTypeDef::builtin(ComparisonNode::NAME, ComparisonNode::create)
            .handle(HandleDef::input("p1", DataType::Number))
            .handle(HandleDef::input("p2", DataType::Number).with_default(1.0))
            .handle(HandleDef::main_output(DataType::Boolean)),
        NodeTypeDef::builtin(CounterNode::NAME, CounterNode::create)
            .handle(
                HandleDef::input("step", DataType::Number)
                    .with_label("Step")
                    .with_default(1.0),
            )
            .handle(HandleDef::main_output(DataType::Number))
            .bangable()
            .tag(Tag::Operation),
    ]
}
