// SPDX-License-Identifier: MIT OR Apache-2.0
//! Per-kind node behavior.
//!
//! A behavior sees its node's handle state through a [`TransformCx`] and
//! answers with an [`Outcome`]. Anything beyond the main output (firing
//! extra handles, timers) is requested as an [`Effect`], which the engine
//! applies right after the transform returns.

use crate::handle::{HandleDef, HandleKind, Value, MAIN_OUTPUT};
use crate::records::empty_object;
use indexmap::IndexMap;
use rand::rngs::StdRng;
use rand::Rng;
use std::time::Duration;

/// Result of a transform
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Outcome {
    /// New main output value
    Emit(Value),
    /// Output unchanged; downstream still sees the current value
    Unchanged,
    /// Stop propagation here
    Suppress,
}

/// Side effect requested by a behavior
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Fan out from one of the node's own handles
    Fire(String),
    /// Fan out from a composite's boundary handle into its internal graph
    ForwardInward(String),
    /// Fire a signal handle later
    StartTimer {
        /// Handle to fire
        handle: String,
        /// Delay, and period when repeating
        delay: Duration,
        /// Keep firing every `delay`
        repeat: bool,
    },
    /// Cancel every timer of this node
    CancelTimers,
}

/// View of a node during a transform
pub struct TransformCx<'a> {
    state: &'a IndexMap<String, Value>,
    handles: &'a IndexMap<String, HandleDef>,
    rng: &'a mut StdRng,
    effects: Vec<Effect>,
}

impl<'a> TransformCx<'a> {
    pub(crate) fn new(
        state: &'a IndexMap<String, Value>,
        handles: &'a IndexMap<String, HandleDef>,
        rng: &'a mut StdRng,
    ) -> Self {
        Self {
            state,
            handles,
            rng,
            effects: Vec::new(),
        }
    }

    /// Stored value of a handle
    pub fn value(&self, handle: &str) -> Option<Value> {
        self.state.get(handle).copied()
    }

    /// Numeric value of a handle, 0 when unset
    pub fn number(&self, handle: &str) -> f64 {
        self.value(handle).map_or(0.0, Value::as_number)
    }

    /// Boolean value of a handle, false when unset
    pub fn boolean(&self, handle: &str) -> bool {
        self.value(handle).is_some_and(Value::as_bool)
    }

    /// Current main output
    pub fn output(&self) -> Option<Value> {
        self.value(MAIN_OUTPUT)
    }

    /// Kind of a handle on this node
    pub fn kind_of(&self, handle: &str) -> Option<HandleKind> {
        self.handles.get(handle).map(|h| h.kind)
    }

    /// Uniform random number in `[0, 1)`
    pub fn random(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }

    /// Fan out from one of this node's handles
    pub fn fire(&mut self, handle: impl Into<String>) {
        self.effects.push(Effect::Fire(handle.into()));
    }

    /// Fan out from a boundary handle into the internal graph
    pub fn forward_inward(&mut self, handle: impl Into<String>) {
        self.effects.push(Effect::ForwardInward(handle.into()));
    }

    /// Fire `handle` after `delay`, optionally repeating
    pub fn start_timer(&mut self, handle: impl Into<String>, delay: Duration, repeat: bool) {
        self.effects.push(Effect::StartTimer {
            handle: handle.into(),
            delay,
            repeat,
        });
    }

    /// Cancel this node's timers
    pub fn cancel_timers(&mut self) {
        self.effects.push(Effect::CancelTimers);
    }

    pub(crate) fn into_effects(self) -> Vec<Effect> {
        self.effects
    }
}

/// Runtime behavior of a node kind
pub trait NodeBehavior: Send {
    /// Recompute after `trigger` changed or was banged
    fn transform(&mut self, cx: &mut TransformCx<'_>, trigger: &str) -> Outcome;

    /// Called after the main output was committed and fanned out
    fn on_output_change(&mut self, _cx: &mut TransformCx<'_>, _previous: Option<Value>) {}

    /// Non-reactive state to persist
    fn save_state(&self) -> serde_json::Value {
        empty_object()
    }

    /// Apply persisted non-reactive state
    fn restore_state(&mut self, _other: &serde_json::Value) -> Result<(), String> {
        Ok(())
    }

    /// The node was switched off; its timers are already cancelled
    fn deactivate(&mut self) {}

    /// Label for the action button, if it depends on runtime state
    fn action_label(&self) -> Option<String> {
        None
    }
}

/// Behavior that never produces output
#[derive(Debug, Default)]
pub struct Inert;

impl NodeBehavior for Inert {
    fn transform(&mut self, _cx: &mut TransformCx<'_>, _trigger: &str) -> Outcome {
        Outcome::Suppress
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Helpers to run a behavior without an engine.

    use super::*;
    use crate::node::NodeTypeDef;
    use rand::SeedableRng;

    /// A behavior with its node state
    pub(crate) struct Harness {
        pub(crate) behavior: Box<dyn NodeBehavior>,
        pub(crate) state: IndexMap<String, Value>,
        pub(crate) handles: IndexMap<String, HandleDef>,
        pub(crate) rng: StdRng,
    }

    impl Harness {
        /// Build from a registered type definition
        pub(crate) fn new(def: &NodeTypeDef, behavior: Box<dyn NodeBehavior>) -> Self {
            let mut state = IndexMap::new();
            let mut handles = IndexMap::new();
            for handle in &def.handles {
                if let Some(value) = handle.initial_value() {
                    state.insert(handle.id.clone(), value);
                }
                handles.insert(handle.id.clone(), handle.clone());
            }
            Self {
                behavior,
                state,
                handles,
                rng: StdRng::seed_from_u64(7),
            }
        }

        /// Set a value and transform, committing emitted output
        pub(crate) fn set(&mut self, handle: &str, value: impl Into<Value>) -> (Outcome, Vec<Effect>) {
            self.state.insert(handle.to_string(), value.into());
            self.trigger(handle)
        }

        /// Transform on a trigger, committing emitted output
        pub(crate) fn trigger(&mut self, trigger: &str) -> (Outcome, Vec<Effect>) {
            let mut cx = TransformCx::new(&self.state, &self.handles, &mut self.rng);
            let outcome = self.behavior.transform(&mut cx, trigger);
            let effects = cx.into_effects();
            if let Outcome::Emit(value) = outcome {
                self.state.insert(MAIN_OUTPUT.to_string(), value);
            }
            (outcome, effects)
        }

        /// Current main output
        pub(crate) fn output(&self) -> Option<Value> {
            self.state.get(MAIN_OUTPUT).copied()
        }
    }
}
