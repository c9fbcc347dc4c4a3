//! Projects and modules.
//!
//! A module exposes one root container for addressing. Module ids and names
//! are unique across the whole process, not just within their project.

use std::collections::BTreeSet;

use indexmap::IndexMap;

use crate::error::{Error, Result};
use crate::value::ObjId;

#[derive(Debug, Clone)]
pub struct Module {
    pub id: String,
    pub name: String,
    pub project_id: String,
    pub root: ObjId,
    /// Text the root value was produced from, if known.
    pub source: Option<String>,
    /// Root keys left out of bulk dumps and redacted in move descriptors.
    pub untracked: BTreeSet<String>,
}

impl Module {
    pub fn new(id: impl Into<String>, name: impl Into<String>, root: ObjId) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            project_id: String::new(),
            root,
            source: None,
            untracked: BTreeSet::new(),
        }
    }

    pub fn with_untracked<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.untracked = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn is_untracked(&self, key: &str) -> bool {
        self.untracked.contains(key)
    }
}

#[derive(Debug, Clone)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub path: String,
    pub module_ids: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Registry {
    projects: IndexMap<String, Project>,
    modules: IndexMap<String, Module>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a project. Re-adding an existing id keeps the first one.
    pub fn add_project(&mut self, id: &str, name: &str, path: &str) -> &Project {
        self.projects.entry(id.to_string()).or_insert_with(|| Project {
            id: id.to_string(),
            name: name.to_string(),
            path: path.to_string(),
            module_ids: Vec::new(),
        })
    }

    pub fn project(&self, id: &str) -> Option<&Project> {
        self.projects.get(id)
    }

    /// Fail with `DuplicateModule` if `id` or `name` is already taken.
    pub fn check_new_module(&self, id: &str, name: &str) -> Result<()> {
        if self.modules.contains_key(id) || self.modules.values().any(|m| m.name == name) {
            return Err(Error::DuplicateModule {
                id: id.to_string(),
                name: name.to_string(),
            });
        }
        Ok(())
    }

    /// Check a whole batch up front, including clashes inside the batch.
    pub fn check_new_modules<'a>(&self, batch: impl IntoIterator<Item = (&'a str, &'a str)>) -> Result<()> {
        let mut ids = BTreeSet::new();
        let mut names = BTreeSet::new();
        for (id, name) in batch {
            self.check_new_module(id, name)?;
            if !ids.insert(id) || !names.insert(name) {
                return Err(Error::DuplicateModule {
                    id: id.to_string(),
                    name: name.to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn add_module(&mut self, project_id: &str, mut module: Module) -> Result<&Module> {
        self.check_new_module(&module.id, &module.name)?;
        let project = self
            .projects
            .get_mut(project_id)
            .ok_or_else(|| Error::UnknownModule(format!("project {project_id}")))?;
        project.module_ids.push(module.id.clone());
        module.project_id = project_id.to_string();

        let id = module.id.clone();
        Ok(&*self.modules.entry(id).or_insert(module))
    }

    pub fn module(&self, id: &str) -> Result<&Module> {
        self.modules
            .get(id)
            .ok_or_else(|| Error::UnknownModule(id.to_string()))
    }

    pub fn module_root(&self, id: &str) -> Result<ObjId> {
        self.module(id).map(|m| m.root)
    }

    pub fn modules(&self) -> impl Iterator<Item = &Module> {
        self.modules.values()
    }

    /// Module roots, for garbage collection.
    pub fn roots(&self) -> Vec<ObjId> {
        self.modules.values().map(|m| m.root).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> Registry {
        let mut r = Registry::new();
        r.add_project("p", "Project", "/tmp/p");
        r.add_module("p", Module::new("m1", "main", ObjId(1))).unwrap();
        r
    }

    #[test]
    fn test_add_and_lookup() {
        let r = registry();
        let m = r.module("m1").unwrap();
        assert_eq!(m.project_id, "p");
        assert_eq!(r.module_root("m1").unwrap(), ObjId(1));
        assert_eq!(r.project("p").unwrap().module_ids, vec!["m1"]);
        assert_eq!(r.roots(), vec![ObjId(1)]);
    }

    #[test]
    fn test_unknown_module() {
        assert_eq!(registry().module("nope").unwrap_err(), Error::UnknownModule("nope".into()));
    }

    #[test]
    fn test_ids_and_names_unique_process_wide() {
        let mut r = registry();
        r.add_project("q", "Other", "/tmp/q");
        assert!(matches!(
            r.add_module("q", Module::new("m1", "fresh", ObjId(2))),
            Err(Error::DuplicateModule { .. })
        ));
        assert!(matches!(
            r.add_module("q", Module::new("m2", "main", ObjId(2))),
            Err(Error::DuplicateModule { .. })
        ));
        assert!(r.add_module("q", Module::new("m2", "other", ObjId(2))).is_ok());
    }

    #[test]
    fn test_batch_check_catches_internal_clash() {
        let r = registry();
        assert!(r.check_new_modules([("a", "x"), ("b", "y")]).is_ok());
        assert!(r.check_new_modules([("a", "x"), ("b", "x")]).is_err());
    }

    #[test]
    fn test_untracked_keys() {
        let m = Module::new("m", "m", ObjId(1)).with_untracked(["cache"]);
        assert!(m.is_untracked("cache"));
        assert!(!m.is_untracked("data"));
    }
}
