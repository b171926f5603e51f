// SPDX-License-Identifier: MIT OR Apache-2.0
//! Value and signal propagation.
//!
//! Everything here runs depth first: a commit fans out to the first edge's
//! target, which finishes its own downstream work before the next edge is
//! visited. The walk keeps its pending work on an explicit stack rather
//! than the call stack, so feedback loops cannot overflow it; a firing that
//! exceeds [`EngineConfig::step_budget`](crate::EngineConfig::step_budget)
//! is cut off with a [`EngineEvent::RuntimeLoopWarning`].
//!
//! Edge lists are snapshotted when a fan-out starts and each edge is
//! re-checked before use, so edits made by the shell between calls never
//! observe a half-walked list.

use super::Engine;
use crate::behavior::{Effect, Outcome, TransformCx};
use crate::connection::Edge;
use crate::error::{NotFoundError, Result, ValidationError};
use crate::events::EngineEvent;
use crate::handle::{DataType, Value, ACTIVE, MAIN_OUTPUT, SIGNAL_IN, SIGNAL_OUT};
use crate::instance::Placement;
use crate::registry::{InstanceKey, ScopeId};

/// Pending propagation work
#[derive(Debug)]
pub(crate) enum Step {
    /// Commit a value into a handle, then run the transform
    Input {
        key: InstanceKey,
        handle: String,
        value: Value,
    },
    /// Deliver a signal to a handle
    Bang { key: InstanceKey, handle: String },
    /// Re-run a transform without an input change
    Transform { key: InstanceKey, trigger: String },
    /// Apply a transform's outcome to the main output
    Settle { key: InstanceKey, outcome: Outcome },
    /// Notify the behavior once its new output has been fanned out
    AfterOutput {
        key: InstanceKey,
        previous: Option<Value>,
    },
    /// Apply one requested effect
    Effect { key: InstanceKey, effect: Effect },
    /// Start a fan-out; `scope` defaults to the node's own scope
    FanOut {
        key: InstanceKey,
        scope: Option<ScopeId>,
        handle: String,
    },
    /// Visit the remaining edges of a fan-out
    Deliver {
        source: InstanceKey,
        scope: ScopeId,
        handle: String,
        is_signal: bool,
        edges: std::vec::IntoIter<Edge>,
    },
}

impl Engine {
    fn missing(key: InstanceKey) -> NotFoundError {
        NotFoundError::Instance(format!("{key:?}"))
    }

    /// Commit a value into a handle and propagate
    pub(crate) fn set_input_key(&mut self, key: InstanceKey, handle: &str, value: Value) -> Result<()> {
        self.propagate(Step::Input {
            key,
            handle: handle.to_string(),
            value,
        })
    }

    /// Deliver a signal to a handle and propagate
    pub(crate) fn bang_key(&mut self, key: InstanceKey, handle: &str) -> Result<()> {
        self.propagate(Step::Bang {
            key,
            handle: handle.to_string(),
        })
    }

    /// Re-run a node's transform without an input change
    pub(crate) fn recompute(&mut self, key: InstanceKey) -> Result<()> {
        self.propagate(Step::Transform {
            key,
            trigger: MAIN_OUTPUT.to_string(),
        })
    }

    /// Fan out from a handle along the edges of the node's own scope
    pub(crate) fn fan_out_home(&mut self, key: InstanceKey, handle: &str) -> Result<()> {
        self.propagate(Step::FanOut {
            key,
            scope: None,
            handle: handle.to_string(),
        })
    }

    /// Run one firing to completion, or until the step budget runs out
    fn propagate(&mut self, start: Step) -> Result<()> {
        let budget = self.config.step_budget;
        let mut stack = vec![start];
        let mut steps = 0usize;
        while let Some(step) = stack.pop() {
            if steps >= budget {
                tracing::warn!(
                    "Propagation stopped after {} steps; {} pending steps dropped",
                    steps,
                    stack.len() + 1
                );
                self.events.emit(EngineEvent::RuntimeLoopWarning {
                    calls: steps as u64,
                    window: None,
                });
                return Ok(());
            }
            steps += 1;
            self.step(step, &mut stack)?;
        }
        Ok(())
    }

    fn step(&mut self, step: Step, stack: &mut Vec<Step>) -> Result<()> {
        match step {
            Step::Input { key, handle, value } => self.commit_input(key, &handle, value, stack),
            Step::Bang { key, handle } => self.receive_bang(key, &handle, stack),
            Step::Transform { key, trigger } => {
                let (outcome, effects) = self.run_transform(key, &trigger)?;
                stack.push(Step::Settle { key, outcome });
                push_effects(stack, key, effects);
                Ok(())
            }
            Step::Settle { key, outcome } => match outcome {
                Outcome::Emit(value) => self.commit_output(key, Some(value), stack),
                Outcome::Unchanged => self.commit_output(key, None, stack),
                Outcome::Suppress => Ok(()),
            },
            Step::AfterOutput { key, previous } => {
                let Some(instance) = self.instances.get_mut(key) else {
                    return Ok(());
                };
                let mut cx = TransformCx::new(&instance.state, &instance.handles, &mut self.rng);
                instance.behavior.on_output_change(&mut cx, previous);
                let effects = cx.into_effects();
                push_effects(stack, key, effects);
                Ok(())
            }
            Step::Effect { key, effect } => {
                self.apply_effect(key, effect, stack);
                Ok(())
            }
            Step::FanOut { key, scope, handle } => self.start_fan_out(key, scope, handle, stack),
            Step::Deliver {
                source,
                scope,
                handle,
                is_signal,
                mut edges,
            } => {
                let Some(edge) = edges.next() else {
                    return Ok(());
                };
                if !edges.as_slice().is_empty() {
                    stack.push(Step::Deliver {
                        source,
                        scope,
                        handle: handle.clone(),
                        is_signal,
                        edges,
                    });
                }
                self.deliver(source, scope, &handle, is_signal, edge, stack)
            }
        }
    }

    fn commit_input(
        &mut self,
        key: InstanceKey,
        handle: &str,
        value: Value,
        stack: &mut Vec<Step>,
    ) -> Result<()> {
        let instance = self.instances.get_mut(key).ok_or_else(|| Self::missing(key))?;
        if !instance.is_active() && handle != ACTIVE {
            return Ok(());
        }
        let def = instance.handles.get(handle).ok_or_else(|| NotFoundError::Handle {
            node: instance.id.clone(),
            handle: handle.to_string(),
        })?;
        if !def.data_type.accepts(value) {
            return Err(ValidationError::ValueType {
                handle: handle.to_string(),
                expected: def.data_type,
            }
            .into());
        }
        let is_source = def.kind.is_source();

        instance.state.insert(handle.to_string(), value);
        if is_source && instance.placement == Placement::Real {
            self.events.emit(EngineEvent::OutputChanged {
                node_id: instance.id.clone(),
                handle: handle.to_string(),
                value,
            });
        }
        if handle == ACTIVE && !value.as_bool() {
            self.timers.cancel_owner(key);
            instance.behavior.deactivate();
            tracing::debug!("Deactivated {}", instance.id);
        }

        let (outcome, effects) = self.run_transform(key, handle)?;
        stack.push(Step::Settle { key, outcome });
        push_effects(stack, key, effects);
        Ok(())
    }

    fn receive_bang(&mut self, key: InstanceKey, handle: &str, stack: &mut Vec<Step>) -> Result<()> {
        let instance = self.instances.get(key).ok_or_else(|| Self::missing(key))?;
        if !instance.is_active() {
            return Ok(());
        }
        let (outcome, effects) = self.run_transform(key, handle)?;
        if handle == SIGNAL_IN && outcome != Outcome::Suppress {
            stack.push(Step::FanOut {
                key,
                scope: None,
                handle: SIGNAL_OUT.to_string(),
            });
            stack.push(Step::Settle { key, outcome });
        } else if let Outcome::Emit(_) = outcome {
            stack.push(Step::Settle { key, outcome });
        }
        push_effects(stack, key, effects);
        Ok(())
    }

    /// Commit the main output (if a value is given) and queue its fan-out
    fn commit_output(&mut self, key: InstanceKey, value: Option<Value>, stack: &mut Vec<Step>) -> Result<()> {
        let instance = self.instances.get_mut(key).ok_or_else(|| Self::missing(key))?;
        if !instance.handles.contains_key(MAIN_OUTPUT) {
            return Ok(());
        }
        let previous = instance.value(MAIN_OUTPUT);
        if let Some(value) = value {
            instance.state.insert(MAIN_OUTPUT.to_string(), value);
            if instance.placement == Placement::Real {
                self.events.emit(EngineEvent::OutputChanged {
                    node_id: instance.id.clone(),
                    handle: MAIN_OUTPUT.to_string(),
                    value,
                });
            }
            stack.push(Step::AfterOutput { key, previous });
        }
        stack.push(Step::FanOut {
            key,
            scope: None,
            handle: MAIN_OUTPUT.to_string(),
        });
        Ok(())
    }

    fn run_transform(&mut self, key: InstanceKey, trigger: &str) -> Result<(Outcome, Vec<Effect>)> {
        if let Some(calls) = self.guard.tick(self.timers.now()) {
            let window = self.guard.window();
            tracing::warn!("{} transforms within {:?}; possible feedback loop", calls, window);
            self.events.emit(EngineEvent::RuntimeLoopWarning {
                calls,
                window: Some(window),
            });
        }

        let instance = self.instances.get_mut(key).ok_or_else(|| Self::missing(key))?;
        let mut cx = TransformCx::new(&instance.state, &instance.handles, &mut self.rng);
        let outcome = instance.behavior.transform(&mut cx, trigger);
        let effects = cx.into_effects();
        tracing::trace!("{} <- {}: {:?}", instance.id, trigger, outcome);
        Ok((outcome, effects))
    }

    fn apply_effect(&mut self, key: InstanceKey, effect: Effect, stack: &mut Vec<Step>) {
        match effect {
            Effect::Fire(handle) => stack.push(Step::FanOut {
                key,
                scope: None,
                handle,
            }),
            Effect::ForwardInward(handle) => {
                if let Some(inner) = self.instances.get(key).and_then(|i| i.inner_scope()) {
                    stack.push(Step::FanOut {
                        key,
                        scope: Some(inner),
                        handle,
                    });
                }
            }
            Effect::StartTimer { handle, delay, repeat } => {
                if self.timers.schedule(key, handle, delay, repeat).is_none() {
                    tracing::warn!("Ignored repeating timer with zero period");
                }
            }
            Effect::CancelTimers => {
                self.timers.cancel_owner(key);
            }
        }
    }

    /// Snapshot the edges leaving a handle in `scope` and queue them in
    /// declaration order
    fn start_fan_out(
        &mut self,
        key: InstanceKey,
        scope: Option<ScopeId>,
        handle: String,
        stack: &mut Vec<Step>,
    ) -> Result<()> {
        let instance = self.instances.get(key).ok_or_else(|| Self::missing(key))?;
        let scope = scope.unwrap_or(instance.scope);
        let is_signal = instance
            .handles
            .get(&handle)
            .map(|h| h.data_type == DataType::Signal)
            .ok_or_else(|| NotFoundError::Handle {
                node: instance.id.clone(),
                handle: handle.clone(),
            })?;

        let edges: Vec<Edge> = match self.instances.scope(scope) {
            Some(s) => s.edges.from_handle(&instance.id, &handle).cloned().collect(),
            None => return Ok(()),
        };
        if !edges.is_empty() {
            stack.push(Step::Deliver {
                source: key,
                scope,
                handle,
                is_signal,
                edges: edges.into_iter(),
            });
        }
        Ok(())
    }

    /// Queue delivery of a handle's value, or a signal, along one edge
    fn deliver(
        &mut self,
        source: InstanceKey,
        scope: ScopeId,
        handle: &str,
        is_signal: bool,
        edge: Edge,
        stack: &mut Vec<Step>,
    ) -> Result<()> {
        let still_present = self
            .instances
            .scope(scope)
            .is_some_and(|s| s.edges.contains(&edge.id));
        if !still_present {
            return Ok(());
        }
        let target = self
            .instances
            .resolve(scope, &edge.target)
            .ok_or_else(|| NotFoundError::Instance(edge.target.clone()))?;

        if is_signal {
            stack.push(Step::Bang {
                key: target,
                handle: edge.target_handle,
            });
            return Ok(());
        }
        let value = match self.instances.get(source).and_then(|i| i.value(handle)) {
            Some(value) => value,
            None => match self.handle_def(target, &edge.target_handle)?.data_type.default_value() {
                Some(value) => value,
                None => return Ok(()),
            },
        };
        stack.push(Step::Input {
            key: target,
            handle: edge.target_handle,
            value,
        });
        Ok(())
    }
}

/// Queue effects so they run in the order the behavior requested them
fn push_effects(stack: &mut Vec<Step>, key: InstanceKey, effects: Vec<Effect>) {
    stack.extend(
        effects
            .into_iter()
            .rev()
            .map(|effect| Step::Effect { key, effect }),
    );
}

#[cfg(test)]
mod tests {
    use crate::engine::tests::engine;
    use crate::events::EngineEvent;
    use crate::handle::{Value, ACTIVE, MAIN_OUTPUT, SIGNAL_IN, SIGNAL_OUT};
    use crate::records::Position;
    use std::time::Duration;

    fn place(engine: &mut crate::Engine, type_name: &str) -> String {
        engine.place(type_name, Position::default()).unwrap()
    }

    #[test]
    fn test_chain_propagates_in_order() {
        let mut engine = engine();
        let a = place(&mut engine, "Math");
        let b = place(&mut engine, "Math");
        let c = place(&mut engine, "Number");
        engine.connect(&a, MAIN_OUTPUT, &b, "p1").unwrap();
        engine.connect(&b, MAIN_OUTPUT, &c, "in").unwrap();

        engine.set_input(&b, "p2", 10.0).unwrap();
        engine.set_input(&a, "p1", 2.0).unwrap();
        engine.set_input(&a, "p2", 3.0).unwrap();

        assert_eq!(engine.state(&a, MAIN_OUTPUT).unwrap(), Some(Value::Number(5.0)));
        assert_eq!(engine.state(&b, MAIN_OUTPUT).unwrap(), Some(Value::Number(15.0)));
        assert_eq!(engine.state(&c, MAIN_OUTPUT).unwrap(), Some(Value::Number(15.0)));
    }

    #[test]
    fn test_first_edge_finishes_before_second() {
        let mut engine = engine();
        let source = place(&mut engine, "Number");
        let first = place(&mut engine, "Math");
        let downstream = place(&mut engine, "Number");
        let second = place(&mut engine, "Math");
        engine.connect(&source, MAIN_OUTPUT, &first, "p1").unwrap();
        engine.connect(&first, MAIN_OUTPUT, &downstream, "in").unwrap();
        engine.connect(&source, MAIN_OUTPUT, &second, "p1").unwrap();
        engine.drain_events();

        engine.set_input(&source, "in", 2.0).unwrap();
        let order: Vec<String> = engine
            .drain_events()
            .into_iter()
            .filter_map(|e| match e {
                EngineEvent::OutputChanged { node_id, .. } => Some(node_id),
                _ => None,
            })
            .collect();
        assert_eq!(order, vec![source, first, downstream, second]);
    }

    #[test]
    fn test_inactive_node_ignores_inputs_and_bangs() {
        let mut engine = engine();
        let counter = place(&mut engine, "Counter");
        let sink = place(&mut engine, "Number");
        engine.connect(&counter, MAIN_OUTPUT, &sink, "in").unwrap();

        engine.set_input(&counter, ACTIVE, false).unwrap();
        engine.drain_events();
        engine.bang(&counter, SIGNAL_IN).unwrap();
        engine.set_input(&counter, "step", 5.0).unwrap();

        assert_eq!(engine.state(&counter, MAIN_OUTPUT).unwrap(), Some(Value::Number(0.0)));
        assert_eq!(engine.state(&counter, "step").unwrap(), Some(Value::Number(1.0)));
        assert!(engine
            .drain_events()
            .iter()
            .all(|e| !matches!(e, EngineEvent::OutputChanged { .. })));

        engine.set_input(&counter, ACTIVE, true).unwrap();
        engine.bang(&counter, SIGNAL_IN).unwrap();
        assert_eq!(engine.state(&sink, MAIN_OUTPUT).unwrap(), Some(Value::Number(1.0)));
    }

    #[test]
    fn test_signal_fans_out_to_every_edge() {
        let mut engine = engine();
        let bang = place(&mut engine, "Bang");
        let first = place(&mut engine, "Counter");
        let second = place(&mut engine, "Counter");
        engine.connect(&bang, SIGNAL_OUT, &first, SIGNAL_IN).unwrap();
        engine.connect(&bang, SIGNAL_OUT, &second, SIGNAL_IN).unwrap();

        engine.bang(&bang, SIGNAL_IN).unwrap();
        engine.bang(&bang, SIGNAL_IN).unwrap();

        assert_eq!(engine.state(&first, MAIN_OUTPUT).unwrap(), Some(Value::Number(2.0)));
        assert_eq!(engine.state(&second, MAIN_OUTPUT).unwrap(), Some(Value::Number(2.0)));
    }

    #[test]
    fn test_boolean_fires_when_true() {
        let mut engine = engine();
        let gate = place(&mut engine, "Boolean");
        let counter = place(&mut engine, "Counter");
        engine.connect(&gate, "signalTrue", &counter, SIGNAL_IN).unwrap();

        engine.set_input(&gate, "p_1", true).unwrap();
        engine.set_input(&gate, "p_2", true).unwrap();
        engine.set_input(&gate, "p_2", false).unwrap();
        engine.set_input(&gate, "p_2", true).unwrap();

        assert_eq!(engine.state(&counter, MAIN_OUTPUT).unwrap(), Some(Value::Number(2.0)));
    }

    #[test]
    fn test_output_events_only_for_real_nodes() {
        let mut engine = engine();
        let id = place(&mut engine, "Number");
        engine.drain_events();
        engine.set_input(&id, "in", 3.0).unwrap();
        assert_eq!(
            engine.drain_events(),
            vec![EngineEvent::OutputChanged {
                node_id: id.clone(),
                handle: MAIN_OUTPUT.to_string(),
                value: Value::Number(3.0),
            }]
        );
    }

    #[test]
    fn test_clock_pulses_and_deactivation_cancels() {
        let mut engine = engine();
        let clock = place(&mut engine, "Clock Pulse");
        let counter = place(&mut engine, "Counter");
        engine.connect(&clock, "pulse", &counter, SIGNAL_IN).unwrap();

        engine.set_input(&clock, "interval", 1.0).unwrap();
        engine.bang(&clock, SIGNAL_IN).unwrap();
        assert_eq!(engine.pending_timers(), 1);

        engine.advance(Duration::from_millis(3500)).unwrap();
        assert_eq!(engine.state(&counter, MAIN_OUTPUT).unwrap(), Some(Value::Number(3.0)));

        engine.set_input(&clock, ACTIVE, false).unwrap();
        assert_eq!(engine.pending_timers(), 0);
        engine.advance(Duration::from_secs(5)).unwrap();
        assert_eq!(engine.state(&counter, MAIN_OUTPUT).unwrap(), Some(Value::Number(3.0)));
        assert_eq!(engine.action_label(&clock).unwrap().as_deref(), Some("Start"));
    }

    #[test]
    fn test_delayed_signal() {
        let mut engine = engine();
        let signal = place(&mut engine, "Signal");
        let counter = place(&mut engine, "Counter");
        engine.connect(&signal, SIGNAL_OUT, &counter, SIGNAL_IN).unwrap();
        engine.set_input(&signal, "delaySec", 2.0).unwrap();

        engine.bang(&signal, SIGNAL_IN).unwrap();
        engine.advance(Duration::from_secs(1)).unwrap();
        assert_eq!(engine.state(&counter, MAIN_OUTPUT).unwrap(), Some(Value::Number(0.0)));
        engine.advance(Duration::from_secs(1)).unwrap();
        assert_eq!(engine.state(&counter, MAIN_OUTPUT).unwrap(), Some(Value::Number(1.0)));
        assert_eq!(engine.pending_timers(), 0);
    }

    #[test]
    fn test_feedback_loop_warns_and_continues() {
        let config = crate::EngineConfig {
            rng_seed: Some(3),
            loop_guard: crate::config::LoopGuardConfig {
                threshold: 10,
                window_ms: 60_000,
            },
            ..crate::EngineConfig::default()
        };
        let mut engine = crate::Engine::in_memory(config).unwrap();
        let clock = place(&mut engine, "Clock Pulse");
        let counter = place(&mut engine, "Counter");
        engine.connect(&clock, "pulse", &counter, SIGNAL_IN).unwrap();
        engine.set_input(&clock, "interval", 0.1).unwrap();
        engine.bang(&clock, SIGNAL_IN).unwrap();
        engine.drain_events();

        engine.advance(Duration::from_secs(2)).unwrap();
        let warnings = engine
            .drain_events()
            .into_iter()
            .filter(|e| matches!(e, EngineEvent::RuntimeLoopWarning { .. }))
            .count();
        assert_eq!(warnings, 1);
        assert!(engine.state(&counter, MAIN_OUTPUT).unwrap().unwrap().as_number() >= 19.0);
    }

    #[test]
    fn test_loop_guard_counts_engine_time() {
        let config = crate::EngineConfig {
            rng_seed: Some(3),
            loop_guard: crate::config::LoopGuardConfig {
                threshold: 15,
                window_ms: 1000,
            },
            ..crate::EngineConfig::default()
        };
        let mut engine = crate::Engine::in_memory(config).unwrap();
        let clock = place(&mut engine, "Clock Pulse");
        let counter = place(&mut engine, "Counter");
        engine.connect(&clock, "pulse", &counter, SIGNAL_IN).unwrap();
        engine.set_input(&clock, "interval", 0.1).unwrap();
        engine.bang(&clock, SIGNAL_IN).unwrap();
        engine.drain_events();

        engine.advance(Duration::from_secs(10)).unwrap();
        assert!(engine
            .drain_events()
            .iter()
            .all(|e| !matches!(e, EngineEvent::RuntimeLoopWarning { .. })));
        assert!(engine.state(&counter, MAIN_OUTPUT).unwrap().unwrap().as_number() >= 99.0);
    }
}
