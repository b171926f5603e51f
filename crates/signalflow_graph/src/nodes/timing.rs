// SPDX-License-Identifier: MIT OR Apache-2.0
//! Timer driven nodes: delayed signal and clock pulse.

use crate::behavior::{NodeBehavior, Outcome, TransformCx};
use crate::handle::{DataType, HandleDef, ACTIVE, SIGNAL_IN, SIGNAL_OUT};
use crate::node::NodeTypeDef;
use std::time::Duration;

/// Signal output of the clock
pub const PULSE: &str = "pulse";

/// Positive, finite seconds as a duration
fn positive_secs(secs: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(secs).ok().filter(|d| !d.is_zero())
}

/// Forwards a bang, optionally after `delaySec`
#[derive(Debug, Default)]
pub struct SignalNode;

impl SignalNode {
    /// Type identifier
    pub const NAME: &'static str = "Signal";

    /// Behavior factory
    pub fn create() -> Box<dyn NodeBehavior> {
        Box::new(Self)
    }
}

impl NodeBehavior for SignalNode {
    fn transform(&mut self, cx: &mut TransformCx<'_>, trigger: &str) -> Outcome {
        if trigger != SIGNAL_IN {
            return Outcome::Suppress;
        }
        match positive_secs(cx.number("delaySec")) {
            Some(delay) => {
                cx.start_timer(SIGNAL_OUT, delay, false);
                Outcome::Suppress
            }
            None => Outcome::Unchanged,
        }
    }
}

/// Fires `pulse` every `interval` seconds while running
#[derive(Debug, Default)]
pub struct ClockPulseNode {
    running: bool,
}

impl ClockPulseNode {
    /// Type identifier
    pub const NAME: &'static str = "Clock Pulse";

    /// Behavior factory
    pub fn create() -> Box<dyn NodeBehavior> {
        Box::new(Self::default())
    }

    fn start(&mut self, cx: &mut TransformCx<'_>) {
        if let Some(interval) = positive_secs(cx.number("interval")) {
            cx.start_timer(PULSE, interval, true);
            self.running = true;
        }
    }

    fn stop(&mut self, cx: &mut TransformCx<'_>) {
        cx.cancel_timers();
        self.running = false;
    }

    /// Whether the clock is ticking
    pub fn is_running(&self) -> bool {
        self.running
    }
}

impl NodeBehavior for ClockPulseNode {
    fn transform(&mut self, cx: &mut TransformCx<'_>, trigger: &str) -> Outcome {
        if trigger == SIGNAL_IN {
            if self.running {
                self.stop(cx);
            } else {
                self.start(cx);
            }
        } else if self.running {
            self.stop(cx);
            if cx.boolean(ACTIVE) {
                self.start(cx);
            }
        }
        Outcome::Suppress
    }

    fn deactivate(&mut self) {
        self.running = false;
    }

    fn action_label(&self) -> Option<String> {
        Some(if self.running { "Stop" } else { "Start" }.to_string())
    }
}

/// Type definitions for this module
pub fn types() -> Vec<NodeTypeDef> {
    vec![
        NodeTypeDef::builtin(ClockPulseNode::NAME, ClockPulseNode::create)
            .handle(HandleDef::input("interval", DataType::Number).with_label("Interval Sec"))
            .handle(HandleDef::signal_out(PULSE).with_label("Pulsed Signal"))
            .bangable()
            .action_label("Start"),
        NodeTypeDef::builtin(SignalNode::NAME, SignalNode::create)
            .handle(HandleDef::input("delaySec", DataType::Number).with_label("Delay Sec"))
            .bangable()
            .action_label("Send"),
    ]
}
