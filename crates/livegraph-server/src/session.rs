//! Request dispatch over one owned [`LiveState`].

use livegraph::{Evaluator, ExprEvaluator, LiveState};
use tracing::{debug, info, warn};

use crate::handlers::{self, HandlerCtx, ModuleSpec, OperationMap};
use crate::protocol::{parse_frame, Inbound, Outbound, ProtocolError, SessionError};

pub struct Session {
    state: LiveState,
    evaluator: Box<dyn Evaluator>,
    operations: OperationMap,
    project_id: String,
    max_frame_bytes: usize,
}

impl Session {
    /// A session over an empty state with a single project.
    pub fn new(project_id: &str, project_name: &str, project_path: &str) -> Self {
        let mut state = LiveState::new();
        state.registry.add_project(project_id, project_name, project_path);
        Self {
            state,
            evaluator: Box::new(ExprEvaluator::new()),
            operations: handlers::operations_map(),
            project_id: project_id.to_string(),
            max_frame_bytes: usize::MAX,
        }
    }

    pub fn with_evaluator(mut self, evaluator: Box<dyn Evaluator>) -> Self {
        self.evaluator = evaluator;
        self
    }

    pub fn with_max_frame_bytes(mut self, max: usize) -> Self {
        self.max_frame_bytes = max;
        self
    }

    pub fn state(&self) -> &LiveState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut LiveState {
        &mut self.state
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn max_frame_bytes(&self) -> usize {
        self.max_frame_bytes
    }

    /// The reply to a frame longer than the limit. `len` is the frame's full
    /// length, which the caller may have counted without buffering it.
    pub fn reject_oversized(&self, len: usize) -> Vec<Outbound> {
        let err = ProtocolError::FrameTooLarge {
            len,
            max: self.max_frame_bytes,
        };
        warn!(error = %err, "frame rejected");
        vec![Outbound::from_error(&SessionError::from(err))]
    }

    /// Register modules in this session's project.
    pub fn load_modules(&mut self, specs: &[ModuleSpec]) -> Result<(), SessionError> {
        let added = handlers::load_modules(&mut self.state, self.evaluator.as_ref(), &self.project_id, specs);
        self.state.collect_garbage();
        for module in added? {
            info!(module = %module.id, name = %module.name, "module loaded");
        }
        Ok(())
    }

    /// Handle one inbound line.
    ///
    /// Always yields exactly one response, last. A request that produced
    /// change descriptors yields a `persist` frame before it.
    pub fn handle_frame(&mut self, line: &str) -> Vec<Outbound> {
        if line.len() > self.max_frame_bytes {
            return self.reject_oversized(line.len());
        }

        let (operation, args) = match parse_frame(line) {
            Ok(Inbound::Request { operation, args }) => (operation, args),
            Err(err) => {
                warn!(error = %err, "frame rejected");
                return vec![Outbound::from_error(&SessionError::from(err))];
            }
        };

        let Some(def) = self.operations.get(&operation).cloned() else {
            let err = SessionError::from(ProtocolError::UnknownOperation(operation));
            warn!(error = %err, "frame rejected");
            return vec![Outbound::from_error(&err)];
        };

        debug!(operation = %operation, "dispatch");
        let mut ctx = HandlerCtx {
            state: &mut self.state,
            evaluator: self.evaluator.as_ref(),
            project_id: &self.project_id,
        };
        let result = (def.handler)(&mut ctx, &args);
        if def.collects {
            self.state.collect_garbage();
        }

        match result {
            Ok(reply) if reply.descriptors.is_empty() => vec![Outbound::success(reply.value)],
            Ok(reply) => {
                debug!(operation = %operation, count = reply.descriptors.len(), "persist");
                vec![Outbound::persist(&reply.descriptors), Outbound::success(reply.value)]
            }
            Err(err) => {
                warn!(operation = %operation, tag = err.tag(), error = %err, "request failed");
                vec![Outbound::from_error(&err)]
            }
        }
    }

    /// Forget everything tied to the current peer. Handles mean nothing to
    /// the next connection.
    pub fn on_disconnect(&mut self) {
        let spaces = self.state.spaces.len();
        self.state.spaces.clear();
        let freed = self.state.collect_garbage();
        debug!(spaces, freed, "session reset");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn session() -> Session {
        let mut session = Session::new("p", "demo", "/demo");
        session
            .load_modules(&[ModuleSpec {
                id: "m".into(),
                name: "main".into(),
                value: json!({"a": [1, 2, 3]}),
                untracked: vec![],
                source: None,
            }])
            .unwrap();
        session
    }

    #[test]
    fn test_frame_too_large() {
        let mut session = session().with_max_frame_bytes(8);
        let out = session.handle_frame(r#"{"type":"request","operation":"sendModules"}"#);
        assert_eq!(out.len(), 1);
        assert!(matches!(&out[0], Outbound::Response { success: false, error: Some(e), .. } if e == "generic"));
    }

    #[test]
    fn test_unknown_operation() {
        let mut session = session();
        let out = session.handle_frame(r#"{"type":"request","operation":"frob","args":{}}"#);
        let Outbound::Response { success, info, .. } = &out[0] else {
            panic!("expected a response");
        };
        assert!(!success);
        assert_eq!(info.as_ref().unwrap()["message"], json!("Unknown operation: frob"));
    }

    #[test]
    fn test_disconnect_drops_spaces() {
        let mut session = session();
        session.handle_frame(
            r#"{"type":"request","operation":"replEval","args":{"spaceId":"s","codeExpr":{"k":[1]}}}"#,
        );
        assert_eq!(session.state().spaces.len(), 1);
        let live = session.state().heap.len();

        session.on_disconnect();
        assert!(session.state().spaces.is_empty());
        assert!(session.state().heap.len() < live);
    }
}
