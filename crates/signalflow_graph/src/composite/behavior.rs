// SPDX-License-Identifier: MIT OR Apache-2.0
//! Behaviors of composite instances and the boundary placeholder.

use crate::behavior::{NodeBehavior, Outcome, TransformCx};
use crate::handle::{ACTIVE, SIGNAL_IN, SIGNAL_OUT};

/// Relays values and signals across a composite's boundary.
///
/// Inputs arriving from outside are forwarded along the internal edges that
/// leave the matching boundary port. Values and signals reaching an output
/// port from inside are fanned out in the composite's own graph.
#[derive(Debug, Default)]
pub struct CompositeBehavior;

impl NodeBehavior for CompositeBehavior {
    fn transform(&mut self, cx: &mut TransformCx<'_>, trigger: &str) -> Outcome {
        match trigger {
            SIGNAL_IN => {
                cx.forward_inward(SIGNAL_IN);
                cx.fire(SIGNAL_OUT);
            }
            ACTIVE => {}
            port if cx.kind_of(port).is_some_and(|k| k.is_source()) => cx.fire(port),
            port if cx.kind_of(port).is_some() => cx.forward_inward(port),
            _ => {}
        }
        Outcome::Suppress
    }
}

/// The placeholder standing in for a composite's boundary while authoring.
///
/// Its ports point into the graph being authored, so writing a port or
/// banging `_bangin` drives the internal nodes directly.
#[derive(Debug, Default)]
pub struct BoundaryBehavior;

impl NodeBehavior for BoundaryBehavior {
    fn transform(&mut self, cx: &mut TransformCx<'_>, trigger: &str) -> Outcome {
        if cx.kind_of(trigger).is_some_and(|k| k.is_source()) {
            cx.fire(trigger);
        }
        Outcome::Suppress
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behavior::testing::Harness;
    use crate::behavior::Effect;
    use crate::handle::{DataType, HandleDef};
    use crate::node::{NodeTypeDef, TypeImpl};

    fn composite() -> Harness {
        let def = NodeTypeDef::with_impl("C", TypeImpl::Composite)
            .handle(HandleDef::input("in", DataType::Number))
            .handle(HandleDef::extra_output("out", DataType::Number))
            .bangable();
        let mut registry = crate::node::TypeRegistry::new();
        registry.register(def).unwrap();
        let def = registry.get("C").unwrap().clone();
        Harness::new(&def, Box::new(CompositeBehavior))
    }

    #[test]
    fn test_composite_routes_by_kind() {
        let mut node = composite();
        assert_eq!(node.set("in", 1.0).1, vec![Effect::ForwardInward("in".to_string())]);
        assert_eq!(node.set("out", 2.0).1, vec![Effect::Fire("out".to_string())]);
        assert_eq!(
            node.trigger(SIGNAL_IN).1,
            vec![
                Effect::ForwardInward(SIGNAL_IN.to_string()),
                Effect::Fire(SIGNAL_OUT.to_string())
            ]
        );
        assert!(node.set(ACTIVE, false).1.is_empty());
        assert_eq!(node.trigger("in").0, Outcome::Suppress);
    }
}
