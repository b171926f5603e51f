// SPDX-License-Identifier: MIT OR Apache-2.0
//! Edge creation and removal in the live graph.

use super::Engine;
use crate::composite::{BOUNDARY_ID, BOUNDARY_PORTS};
use crate::connection::{Edge, EdgeId};
use crate::error::{EngineError, NotFoundError, Result, ValidationError};
use crate::events::EngineEvent;
use crate::handle::{is_reserved, DataType, HandleDef, HandleKind, MAIN_OUTPUT};
use crate::registry::ScopeId;

/// End of a prospective edge
#[derive(Clone, Copy)]
struct End {
    kind: HandleKind,
    data_type: DataType,
}

/// Boundary port the edge would add to the placeholder
enum NewPort {
    None,
    Source(HandleDef),
    Target(HandleDef),
}

impl Engine {
    /// Connect two handles in the live graph.
    ///
    /// A value edge replaces any edge already entering its target handle and
    /// immediately delivers the source's current value. Edges touching the
    /// boundary placeholder create its ports on demand.
    pub fn connect(
        &mut self,
        source: &str,
        source_handle: &str,
        target: &str,
        target_handle: &str,
    ) -> Result<EdgeId> {
        if source == target {
            return Err(if source_handle == target_handle {
                ValidationError::SameHandle
            } else {
                ValidationError::SelfLoop
            }
            .into());
        }
        let source_key = self.resolve_root(source)?;
        let target_key = self.resolve_root(target)?;

        let (new_port, src, dst) = self.plan(source, source_handle, target, target_handle)?;
        if src.kind == HandleKind::MainOutput && dst.kind == HandleKind::MainOutput {
            return Err(ValidationError::OutputToOutput.into());
        }
        if !src.kind.is_source() || !dst.kind.is_target() {
            return Err(ValidationError::WrongDirection.into());
        }
        if src.data_type != dst.data_type {
            return Err(ValidationError::TypeMismatch {
                source_type: src.data_type,
                target_type: dst.data_type,
            }
            .into());
        }
        let is_signal = src.data_type == DataType::Signal;

        let adopts_target_value = matches!(new_port, NewPort::Source(_));
        match new_port {
            NewPort::Source(port) | NewPort::Target(port) => self.add_boundary_port(port),
            NewPort::None => {}
        }

        let edge = Edge::new(source, source_handle, target, target_handle);
        let root = self
            .instances
            .scope_mut(ScopeId::ROOT)
            .ok_or_else(|| NotFoundError::Instance(source.to_string()))?;
        if !is_signal {
            for replaced in root.edges.remove_into(target, target_handle) {
                tracing::debug!("Replaced edge {}", replaced.id);
            }
        }
        let id = root.edges.insert(edge);
        tracing::debug!(
            "Connected {}.{} -> {}.{}",
            source,
            source_handle,
            target,
            target_handle
        );
        self.prune_boundary_ports();

        if is_signal {
            return Ok(id);
        }
        if adopts_target_value {
            let value = self.instances.get(target_key).and_then(|i| i.value(target_handle));
            if let (Some(value), Some(boundary)) = (value, self.instances.get_mut(source_key)) {
                boundary.state.insert(source_handle.to_string(), value);
            }
            return Ok(id);
        }
        let value = match self.instances.get(source_key).and_then(|i| i.value(source_handle)) {
            Some(value) => Some(value),
            None => dst.data_type.default_value(),
        };
        if let Some(value) = value {
            self.set_input_key(target_key, target_handle, value)?;
        }
        Ok(id)
    }

    /// Connect, turning a rejected connection into a warning notification
    pub fn try_connect(
        &mut self,
        source: &str,
        source_handle: &str,
        target: &str,
        target_handle: &str,
    ) -> Result<Option<EdgeId>> {
        match self.connect(source, source_handle, target, target_handle) {
            Ok(id) => Ok(Some(id)),
            Err(EngineError::Validation(e)) => {
                tracing::warn!("Connection rejected: {}", e);
                self.events.emit(EngineEvent::warning(e.to_string()));
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Remove an edge from the live graph
    pub fn disconnect(&mut self, id: &EdgeId) -> Result<()> {
        let removed = self
            .instances
            .scope_mut(ScopeId::ROOT)
            .and_then(|root| root.edges.remove(id))
            .ok_or_else(|| NotFoundError::Edge(id.to_string()))?;
        tracing::debug!("Disconnected {}.{}", removed.source, removed.source_handle);
        self.prune_boundary_ports();
        Ok(())
    }

    /// Edges of the live graph in declaration order
    pub fn edges(&self) -> Vec<Edge> {
        self.instances
            .scope(ScopeId::ROOT)
            .map(|s| s.edges.to_vec())
            .unwrap_or_default()
    }

    /// Resolve both ends, planning a placeholder port where one is missing
    fn plan(
        &self,
        source: &str,
        source_handle: &str,
        target: &str,
        target_handle: &str,
    ) -> Result<(NewPort, End, End)> {
        let src = self.existing_end(source, source_handle)?;
        let dst = self.existing_end(target, target_handle)?;
        match (src, dst) {
            (Some(src), Some(dst)) => Ok((NewPort::None, src, dst)),
            (None, Some(dst)) if source == BOUNDARY_ID => {
                let port = boundary_port(source_handle, dst.data_type, true)?;
                let src = End {
                    kind: port.kind,
                    data_type: port.data_type,
                };
                Ok((NewPort::Source(port), src, dst))
            }
            (Some(src), None) if target == BOUNDARY_ID => {
                let port = boundary_port(target_handle, src.data_type, false)?;
                let dst = End {
                    kind: port.kind,
                    data_type: port.data_type,
                };
                Ok((NewPort::Target(port), src, dst))
            }
            (None, _) => Err(NotFoundError::Handle {
                node: source.to_string(),
                handle: source_handle.to_string(),
            }
            .into()),
            (_, None) => Err(NotFoundError::Handle {
                node: target.to_string(),
                handle: target_handle.to_string(),
            }
            .into()),
        }
    }

    fn existing_end(&self, node: &str, handle: &str) -> Result<Option<End>> {
        let key = self.resolve_root(node)?;
        Ok(self
            .instances
            .get(key)
            .and_then(|i| i.handle(handle))
            .map(|def| End {
                kind: def.kind,
                data_type: def.data_type,
            }))
    }

    /// Add a port to the placeholder
    pub(crate) fn add_boundary_port(&mut self, port: HandleDef) {
        let Some(key) = self.instances.resolve(ScopeId::ROOT, BOUNDARY_ID) else {
            return;
        };
        if let Some(boundary) = self.instances.get_mut(key) {
            if let Some(value) = port.initial_value() {
                boundary.state.insert(port.id.clone(), value);
            }
            tracing::debug!("Boundary port {} ({:?})", port.id, port.kind);
            boundary.handles.insert(port.id.clone(), port);
        }
    }

    /// Drop placeholder ports no edge touches any more
    pub(crate) fn prune_boundary_ports(&mut self) {
        let Some(key) = self.instances.resolve(ScopeId::ROOT, BOUNDARY_ID) else {
            return;
        };
        let unused: Vec<String> = match (self.instances.get(key), self.instances.scope(ScopeId::ROOT)) {
            (Some(boundary), Some(root)) => boundary
                .handles
                .keys()
                .filter(|id| !BOUNDARY_PORTS.contains(&id.as_str()))
                .filter(|id| !root.edges.is_handle_connected(BOUNDARY_ID, id))
                .cloned()
                .collect(),
            _ => return,
        };
        if let Some(boundary) = self.instances.get_mut(key) {
            for id in unused {
                boundary.handles.shift_remove(&id);
                boundary.state.shift_remove(&id);
            }
        }
    }
}

/// Port of the placeholder, seen from inside the graph being authored.
/// A port that feeds internal nodes is an output of the placeholder.
fn boundary_port(id: &str, data_type: DataType, feeds_inward: bool) -> Result<HandleDef> {
    if is_reserved(id) || id == MAIN_OUTPUT {
        return Err(ValidationError::ReservedHandle(id.to_string()).into());
    }
    let kind = match (feeds_inward, data_type == DataType::Signal) {
        (true, true) => HandleKind::SignalOut,
        (true, false) => HandleKind::ExtraOutput,
        (false, true) => HandleKind::SignalIn,
        (false, false) => HandleKind::Input,
    };
    Ok(HandleDef::new(id, data_type, kind))
}

#[cfg(test)]
mod tests {
    use crate::engine::tests::engine;
    use crate::error::{EngineError, ValidationError};
    use crate::events::{EngineEvent, NotificationLevel};
    use crate::handle::{Value, MAIN_OUTPUT, SIGNAL_IN, SIGNAL_OUT};
    use crate::records::Position;

    fn rejected(result: crate::Result<crate::EdgeId>) -> ValidationError {
        match result {
            Err(EngineError::Validation(e)) => e,
            other => panic!("expected a validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_connection_rules() {
        let mut engine = engine();
        let a = engine.place("Math", Position::default()).unwrap();
        let b = engine.place("Math", Position::default()).unwrap();
        let gate = engine.place("Boolean", Position::default()).unwrap();
        let counter = engine.place("Counter", Position::default()).unwrap();

        assert_eq!(rejected(engine.connect(&a, MAIN_OUTPUT, &a, MAIN_OUTPUT)), ValidationError::SameHandle);
        assert_eq!(rejected(engine.connect(&a, MAIN_OUTPUT, &a, "p1")), ValidationError::SelfLoop);
        assert_eq!(
            rejected(engine.connect(&a, MAIN_OUTPUT, &b, MAIN_OUTPUT)),
            ValidationError::OutputToOutput
        );
        assert_eq!(rejected(engine.connect(&a, "p1", &b, "p2")), ValidationError::WrongDirection);
        assert!(matches!(
            rejected(engine.connect(&a, MAIN_OUTPUT, &gate, "p_1")),
            ValidationError::TypeMismatch { .. }
        ));
        assert!(matches!(
            rejected(engine.connect(&gate, "signalTrue", &b, "p1")),
            ValidationError::TypeMismatch { .. }
        ));
        assert!(engine.connect(&counter, SIGNAL_OUT, &a, SIGNAL_IN).is_err());
        assert!(engine.edges().is_empty());
    }

    #[test]
    fn test_last_value_edge_wins() {
        let mut engine = engine();
        let a = engine.place("Math", Position::default()).unwrap();
        let b = engine.place("Math", Position::default()).unwrap();
        let sink = engine.place("Number", Position::default()).unwrap();
        engine.set_input(&a, "p1", 1.0).unwrap();
        engine.set_input(&b, "p1", 2.0).unwrap();

        let first = engine.connect(&a, MAIN_OUTPUT, &sink, "in").unwrap();
        assert_eq!(engine.state(&sink, MAIN_OUTPUT).unwrap(), Some(Value::Number(1.0)));
        let second = engine.connect(&b, MAIN_OUTPUT, &sink, "in").unwrap();
        assert_eq!(engine.state(&sink, MAIN_OUTPUT).unwrap(), Some(Value::Number(2.0)));

        let edges = engine.edges();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].id, second);
        assert!(engine.disconnect(&first).is_err());

        engine.set_input(&a, "p1", 7.0).unwrap();
        assert_eq!(engine.state(&sink, MAIN_OUTPUT).unwrap(), Some(Value::Number(2.0)));
    }

    #[test]
    fn test_signal_edges_accumulate() {
        let mut engine = engine();
        let x = engine.place("Bang", Position::default()).unwrap();
        let y = engine.place("Bang", Position::default()).unwrap();
        let counter = engine.place("Counter", Position::default()).unwrap();
        engine.connect(&x, SIGNAL_OUT, &counter, SIGNAL_IN).unwrap();
        engine.connect(&y, SIGNAL_OUT, &counter, SIGNAL_IN).unwrap();
        assert_eq!(engine.edges().len(), 2);
        assert!(engine.is_handle_connected(&counter, SIGNAL_IN).unwrap());
    }

    #[test]
    fn test_try_connect_reports_notification() {
        let mut engine = engine();
        let a = engine.place("Math", Position::default()).unwrap();
        engine.drain_events();
        assert_eq!(engine.try_connect(&a, MAIN_OUTPUT, &a, "p1").unwrap(), None);

        let events = engine.drain_events();
        assert!(matches!(
            &events[..],
            [EngineEvent::Notification { level: NotificationLevel::Warning, .. }]
        ));
        assert!(engine.try_connect(&a, MAIN_OUTPUT, "ghost", "p1").is_err());
    }

    #[test]
    fn test_disconnect_keeps_values() {
        let mut engine = engine();
        let a = engine.place("Math", Position::default()).unwrap();
        let sink = engine.place("Number", Position::default()).unwrap();
        engine.set_input(&a, "p1", 4.0).unwrap();
        let edge = engine.connect(&a, MAIN_OUTPUT, &sink, "in").unwrap();
        engine.disconnect(&edge).unwrap();

        engine.set_input(&a, "p1", 9.0).unwrap();
        assert_eq!(engine.state(&sink, "in").unwrap(), Some(Value::Number(4.0)));
        assert!(!engine.is_handle_connected(&sink, "in").unwrap());
    }
}
