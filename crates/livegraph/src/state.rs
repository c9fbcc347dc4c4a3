//! Owned application state threaded through the dispatcher.

use tracing::debug;

use crate::error::{Error, Result};
use crate::heap::Heap;
use crate::inspect::InspectionSpaces;
use crate::project::{Module, Registry};
use crate::value::Value;

#[derive(Debug, Default)]
pub struct LiveState {
    pub heap: Heap,
    pub registry: Registry,
    pub spaces: InspectionSpaces,
}

impl LiveState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `root` as a new module of `project_id`.
    ///
    /// The root must be a container; leaves and callables cannot be
    /// addressed into.
    pub fn add_module(&mut self, project_id: &str, id: &str, name: &str, root: Value) -> Result<&Module> {
        let module = self.new_module(id, name, &root)?;
        self.registry.add_module(project_id, module)
    }

    /// Build an unregistered module over `root`, checking that the root can
    /// be addressed into.
    pub fn new_module(&self, id: &str, name: &str, root: &Value) -> Result<Module> {
        let kind = self.heap.kind_of(root);
        match root.as_object() {
            Some(obj) if kind.is_container() => Ok(Module::new(id, name, obj)),
            _ => Err(Error::TypeMismatch {
                expected: "mapping",
                actual: kind.as_str(),
            }),
        }
    }

    /// Sweep everything unreachable from module roots and held handles.
    pub fn collect_garbage(&mut self) -> usize {
        let mut roots = self.registry.roots();
        roots.extend(self.spaces.held());
        let freed = self.heap.collect(roots);
        if freed > 0 {
            debug!(freed, live = self.heap.len(), "collected garbage");
        }
        freed
    }
}
