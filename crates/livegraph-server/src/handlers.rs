//! Operation table.
//!
//! Every request names an operation; the session looks it up here and calls
//! its handler with the raw `args` object. Handlers decode their own
//! arguments, so a bad argument shape fails only that request.

use std::collections::HashMap;
use std::sync::Arc;

use livegraph::address::{key_at, value_at};
use livegraph::inspect::{inspect, inspect_getter, inspect_handle};
use livegraph::mutation;
use livegraph::serialize::{serialize, untracked_placeholder};
use livegraph::{Descriptor, Error, Evaluator, Handle, LiveState, Module, Object, Path};
use livegraph_path::validate_path;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value as Json};

use crate::protocol::{ProtocolError, SessionError};

pub struct HandlerCtx<'a> {
    pub state: &'a mut LiveState,
    pub evaluator: &'a dyn Evaluator,
    /// Project that `loadModules` adds to.
    pub project_id: &'a str,
}

/// What a successful handler hands back to the session.
#[derive(Debug, Default, PartialEq)]
pub struct Reply {
    pub value: Json,
    /// Sent as one `persist` frame ahead of the response when non-empty.
    pub descriptors: Vec<Descriptor>,
}

impl Reply {
    pub fn value(value: Json) -> Self {
        Self {
            value,
            descriptors: Vec::new(),
        }
    }

    pub fn ack(descriptors: Vec<Descriptor>) -> Self {
        Self {
            value: Json::Null,
            descriptors,
        }
    }
}

pub type HandlerFn = for<'a> fn(&mut HandlerCtx<'a>, &Json) -> Result<Reply, SessionError>;

pub struct OperationDefinition {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    /// Sweep the heap after the handler returns, successful or not.
    pub collects: bool,
    pub handler: HandlerFn,
}

pub type OperationMap = HashMap<String, Arc<OperationDefinition>>;

pub fn operations_to_map(operations: Vec<Arc<OperationDefinition>>) -> OperationMap {
    let mut map = HashMap::new();
    for op in operations {
        map.insert(op.name.to_string(), Arc::clone(&op));
        for alias in op.aliases {
            map.insert(alias.to_string(), Arc::clone(&op));
        }
    }
    map
}

// ── Arguments ─────────────────────────────────────────────────────────────

fn decode<T: DeserializeOwned>(operation: &str, args: &Json) -> Result<T, SessionError> {
    T::deserialize(args).map_err(|e| {
        ProtocolError::BadArgs {
            operation: operation.to_string(),
            message: e.to_string(),
        }
        .into()
    })
}

fn checked(path: &[usize]) -> Result<(), SessionError> {
    validate_path(path).map_err(|e| SessionError::Live(Error::from(e)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModuleArgs {
    #[serde(alias = "mid")]
    module_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PathArgs {
    #[serde(alias = "mid")]
    module_id: String,
    path: Path,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReplaceArgs {
    #[serde(alias = "mid")]
    module_id: String,
    path: Path,
    new_value_expr: Json,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RenameArgs {
    #[serde(alias = "mid")]
    module_id: String,
    path: Path,
    new_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InsertArgs {
    #[serde(alias = "mid")]
    module_id: String,
    parent_path: Path,
    pos: usize,
    /// Present for mappings only.
    #[serde(default)]
    key: Option<String>,
    value_expr: Json,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MoveArgs {
    #[serde(alias = "mid")]
    module_id: String,
    path: Path,
    #[serde(alias = "fwd")]
    forward: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EvalArgs {
    #[serde(default, alias = "mid")]
    module_id: Option<String>,
    space_id: String,
    code_expr: Json,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HandleArgs {
    space_id: String,
    handle: Handle,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetterArgs {
    space_id: String,
    parent_handle: Handle,
    #[serde(alias = "prop")]
    property_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReleaseArgs {
    space_id: String,
    handles: Vec<Handle>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SpaceArgs {
    space_id: String,
}

/// One module to register: `value` is evaluated to produce its root.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleSpec {
    pub id: String,
    pub name: String,
    pub value: Json,
    #[serde(default)]
    pub untracked: Vec<String>,
    #[serde(default)]
    pub source: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LoadModulesArgs {
    modules: Vec<ModuleSpec>,
}

// ── Reads ─────────────────────────────────────────────────────────────────

fn get_key_at(ctx: &mut HandlerCtx<'_>, args: &Json) -> Result<Reply, SessionError> {
    let a: PathArgs = decode("getKeyAt", args)?;
    checked(&a.path)?;
    let root = ctx.state.registry.module_root(&a.module_id)?;
    Ok(Reply::value(Json::String(key_at(&ctx.state.heap, root, &a.path)?)))
}

fn get_value_at(ctx: &mut HandlerCtx<'_>, args: &Json) -> Result<Reply, SessionError> {
    let a: PathArgs = decode("getValueAt", args)?;
    checked(&a.path)?;
    let heap = &ctx.state.heap;
    let root = ctx.state.registry.module_root(&a.module_id)?;
    let value = value_at(heap, root, &a.path)?;
    Ok(Reply::value(serialize(heap, &value)?.to_json()))
}

/// `[key, serialized]` pairs of the module root. Sequence roots use the
/// index as key.
fn send_all_entries(ctx: &mut HandlerCtx<'_>, args: &Json) -> Result<Reply, SessionError> {
    let a: ModuleArgs = decode("sendAllEntries", args)?;
    let heap = &ctx.state.heap;
    let module = ctx.state.registry.module(&a.module_id)?;

    let mut out = Vec::new();
    match heap.object(module.root)? {
        Object::Sequence(items) => {
            for (i, item) in items.iter().enumerate() {
                out.push(json!([i, serialize(heap, item)?.to_json()]));
            }
        }
        Object::Mapping(_) => {
            for (key, value) in heap.entries(module.root)? {
                let serialized = if module.is_untracked(&key) {
                    untracked_placeholder()
                } else {
                    serialize(heap, &value)?
                };
                out.push(json!([key, serialized.to_json()]));
            }
        }
        Object::Callable(_) => {
            return Err(Error::TypeMismatch {
                expected: "mapping",
                actual: "callable",
            }
            .into())
        }
    }
    Ok(Reply::value(Json::Array(out)))
}

fn module_json(module: &Module) -> Json {
    json!({"id": module.id, "name": module.name, "projectId": module.project_id})
}

fn send_modules(ctx: &mut HandlerCtx<'_>, _args: &Json) -> Result<Reply, SessionError> {
    let modules = ctx.state.registry.modules().map(module_json).collect();
    Ok(Reply::value(Json::Array(modules)))
}

// ── Mutations ─────────────────────────────────────────────────────────────

fn replace(ctx: &mut HandlerCtx<'_>, args: &Json) -> Result<Reply, SessionError> {
    let a: ReplaceArgs = decode("replace", args)?;
    checked(&a.path)?;
    let state = &mut *ctx.state;
    let module = state.registry.module(&a.module_id)?;
    let value = ctx.evaluator.evaluate(&mut state.heap, Some(module.root), &a.new_value_expr)?;
    Ok(Reply::ack(mutation::replace(&mut state.heap, module, &a.path, value)?))
}

fn rename_key(ctx: &mut HandlerCtx<'_>, args: &Json) -> Result<Reply, SessionError> {
    let a: RenameArgs = decode("renameKey", args)?;
    checked(&a.path)?;
    let state = &mut *ctx.state;
    let module = state.registry.module(&a.module_id)?;
    Ok(Reply::ack(mutation::rename(&mut state.heap, module, &a.path, &a.new_name)?))
}

fn add_array_entry(ctx: &mut HandlerCtx<'_>, args: &Json) -> Result<Reply, SessionError> {
    let a: InsertArgs = decode("addArrayEntry", args)?;
    checked(&a.parent_path)?;
    let state = &mut *ctx.state;
    let module = state.registry.module(&a.module_id)?;
    let value = ctx.evaluator.evaluate(&mut state.heap, Some(module.root), &a.value_expr)?;
    let descriptors = mutation::insert_sequence(&mut state.heap, module, &a.parent_path, a.pos, value)?;
    Ok(Reply::ack(descriptors))
}

fn add_object_entry(ctx: &mut HandlerCtx<'_>, args: &Json) -> Result<Reply, SessionError> {
    let a: InsertArgs = decode("addObjectEntry", args)?;
    checked(&a.parent_path)?;
    let key = a.key.ok_or_else(|| ProtocolError::BadArgs {
        operation: "addObjectEntry".to_string(),
        message: "missing field `key`".to_string(),
    })?;
    let state = &mut *ctx.state;
    let module = state.registry.module(&a.module_id)?;
    let value = ctx.evaluator.evaluate(&mut state.heap, Some(module.root), &a.value_expr)?;
    let descriptors = mutation::insert_mapping(&mut state.heap, module, &a.parent_path, a.pos, &key, value)?;
    Ok(Reply::ack(descriptors))
}

fn move_entry(ctx: &mut HandlerCtx<'_>, args: &Json) -> Result<Reply, SessionError> {
    let a: MoveArgs = decode("move", args)?;
    checked(&a.path)?;
    let state = &mut *ctx.state;
    let module = state.registry.module(&a.module_id)?;
    let (new_path, descriptors) = mutation::move_entry(&mut state.heap, module, &a.path, a.forward)?;
    Ok(Reply {
        value: json!(new_path),
        descriptors,
    })
}

fn delete_entry(ctx: &mut HandlerCtx<'_>, args: &Json) -> Result<Reply, SessionError> {
    let a: PathArgs = decode("deleteEntry", args)?;
    checked(&a.path)?;
    let state = &mut *ctx.state;
    let module = state.registry.module(&a.module_id)?;
    Ok(Reply::ack(mutation::delete(&mut state.heap, module, &a.path)?))
}

/// Register a batch of modules in `project_id`.
///
/// Nothing is registered unless every module in the batch has a fresh id
/// and name and every value evaluates to a container.
pub fn load_modules(
    state: &mut LiveState,
    evaluator: &dyn Evaluator,
    project_id: &str,
    specs: &[ModuleSpec],
) -> Result<Vec<Module>, SessionError> {
    state
        .registry
        .check_new_modules(specs.iter().map(|s| (s.id.as_str(), s.name.as_str())))?;
    if state.registry.project(project_id).is_none() {
        return Err(Error::UnknownModule(format!("project {project_id}")).into());
    }

    let mut modules = Vec::with_capacity(specs.len());
    for spec in specs {
        let root = evaluator.evaluate(&mut state.heap, None, &spec.value)?;
        let mut module = state
            .new_module(&spec.id, &spec.name, &root)?
            .with_untracked(spec.untracked.iter().cloned());
        module.source = spec.source.clone();
        modules.push(module);
    }

    let mut added = Vec::with_capacity(modules.len());
    for module in modules {
        added.push(state.registry.add_module(project_id, module)?.clone());
    }
    Ok(added)
}

fn load_modules_op(ctx: &mut HandlerCtx<'_>, args: &Json) -> Result<Reply, SessionError> {
    let a: LoadModulesArgs = decode("loadModules", args)?;
    let added = load_modules(ctx.state, ctx.evaluator, ctx.project_id, &a.modules)?;
    Ok(Reply::value(Json::Array(added.iter().map(module_json).collect())))
}

// ── Inspection ────────────────────────────────────────────────────────────

fn repl_eval(ctx: &mut HandlerCtx<'_>, args: &Json) -> Result<Reply, SessionError> {
    let a: EvalArgs = decode("replEval", args)?;
    let state = &mut *ctx.state;
    let root = match &a.module_id {
        Some(id) => Some(state.registry.module_root(id)?),
        None => None,
    };
    let value = ctx.evaluator.evaluate(&mut state.heap, root, &a.code_expr)?;
    let space = state.spaces.space(&a.space_id);
    Ok(Reply::value(inspect(&state.heap, space, &value, true)?.to_json()))
}

fn inspect_object_by_id(ctx: &mut HandlerCtx<'_>, args: &Json) -> Result<Reply, SessionError> {
    let a: HandleArgs = decode("inspectObjectById", args)?;
    let state = &mut *ctx.state;
    let space = state
        .spaces
        .get_mut(&a.space_id)
        .ok_or(Error::UnknownHandle(a.handle))?;
    Ok(Reply::value(inspect_handle(&state.heap, space, a.handle)?.to_json()))
}

fn inspect_getter_value(ctx: &mut HandlerCtx<'_>, args: &Json) -> Result<Reply, SessionError> {
    let a: GetterArgs = decode("inspectGetterValue", args)?;
    let state = &mut *ctx.state;
    let space = state
        .spaces
        .get_mut(&a.space_id)
        .ok_or(Error::UnknownHandle(a.parent_handle))?;
    let out = inspect_getter(&mut state.heap, space, a.parent_handle, &a.property_name)?;
    Ok(Reply::value(out.to_json()))
}

/// Handles are released in order; the first unknown one stops the request
/// with the earlier releases kept.
fn release_handles(ctx: &mut HandlerCtx<'_>, args: &Json) -> Result<Reply, SessionError> {
    let a: ReleaseArgs = decode("releaseHandles", args)?;
    let Some(space) = ctx.state.spaces.get_mut(&a.space_id) else {
        return match a.handles.first() {
            Some(h) => Err(Error::UnknownHandle(*h).into()),
            None => Ok(Reply::default()),
        };
    };
    for handle in a.handles {
        space.release(handle)?;
    }
    Ok(Reply::default())
}

fn release_inspection_space(ctx: &mut HandlerCtx<'_>, args: &Json) -> Result<Reply, SessionError> {
    let a: SpaceArgs = decode("releaseInspectionSpace", args)?;
    Ok(Reply::value(Json::Bool(ctx.state.spaces.drop_space(&a.space_id))))
}

// ── Table ─────────────────────────────────────────────────────────────────

pub fn operations() -> Vec<Arc<OperationDefinition>> {
    vec![
        Arc::new(OperationDefinition {
            name: "getKeyAt",
            aliases: &[],
            collects: false,
            handler: get_key_at,
        }),
        Arc::new(OperationDefinition {
            name: "getValueAt",
            aliases: &[],
            collects: false,
            handler: get_value_at,
        }),
        Arc::new(OperationDefinition {
            name: "sendAllEntries",
            aliases: &[],
            collects: false,
            handler: send_all_entries,
        }),
        Arc::new(OperationDefinition {
            name: "sendModules",
            aliases: &[],
            collects: false,
            handler: send_modules,
        }),
        Arc::new(OperationDefinition {
            name: "replace",
            aliases: &[],
            collects: true,
            handler: replace,
        }),
        Arc::new(OperationDefinition {
            name: "renameKey",
            aliases: &[],
            collects: true,
            handler: rename_key,
        }),
        Arc::new(OperationDefinition {
            name: "addArrayEntry",
            aliases: &[],
            collects: true,
            handler: add_array_entry,
        }),
        Arc::new(OperationDefinition {
            name: "addObjectEntry",
            aliases: &[],
            collects: true,
            handler: add_object_entry,
        }),
        Arc::new(OperationDefinition {
            name: "move",
            aliases: &[],
            collects: true,
            handler: move_entry,
        }),
        Arc::new(OperationDefinition {
            name: "deleteEntry",
            aliases: &[],
            collects: true,
            handler: delete_entry,
        }),
        Arc::new(OperationDefinition {
            name: "loadModules",
            aliases: &[],
            collects: true,
            handler: load_modules_op,
        }),
        Arc::new(OperationDefinition {
            name: "replEval",
            aliases: &["inspect"],
            collects: true,
            handler: repl_eval,
        }),
        Arc::new(OperationDefinition {
            name: "inspectObjectById",
            aliases: &[],
            collects: false,
            handler: inspect_object_by_id,
        }),
        Arc::new(OperationDefinition {
            name: "inspectGetterValue",
            aliases: &[],
            collects: true,
            handler: inspect_getter_value,
        }),
        Arc::new(OperationDefinition {
            name: "releaseHandles",
            aliases: &[],
            collects: true,
            handler: release_handles,
        }),
        Arc::new(OperationDefinition {
            name: "releaseInspectionSpace",
            aliases: &["deleteInspectionSpace"],
            collects: true,
            handler: release_inspection_space,
        }),
    ]
}

pub fn operations_map() -> OperationMap {
    operations_to_map(operations())
}
