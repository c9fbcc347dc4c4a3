//! Value expressions.
//!
//! Requests that write into the tree carry an expression instead of a value.
//! The core never runs client code itself; it asks an [`Evaluator`] for the
//! value and only then mutates. [`ExprEvaluator`] is the stock evaluator, a
//! small JSON expression language:
//!
//! - Non-array JSON is a literal. Objects become mappings in key order.
//! - `[x]` wraps `x` as a literal, so `[[1, 2]]` is a two-element sequence.
//! - `[operator, ...operands]` dispatches through the operator table.
//!
//! ```text
//! ["seq", 1, ["undefined"], ["map", {"k": ["re", "a+", "i"]}]]
//! ["$", "/0/2"]      value at a path of the module root, shared by identity
//! ["fn", "x => x"]   callable with the given source text
//! ```

pub mod operators;

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value as Json;

use crate::error::{Error, Result};
use crate::heap::Heap;
use crate::value::{ObjId, Value};

/// Produces live values from client-supplied code.
pub trait Evaluator {
    /// Evaluate `code`. `root` is the module root the code may refer to.
    fn evaluate(&self, heap: &mut Heap, root: Option<ObjId>, code: &Json) -> Result<Value>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum Arity {
    Any,
    Fixed(usize),
    /// Between `min` and `max` operands; `None` means unbounded.
    Range(usize, Option<usize>),
}

/// `expr` is the whole expression array, operator name included.
pub type EvalFn = for<'a> fn(&[Json], &mut EvalCtx<'a>) -> Result<Value>;

pub struct OperatorDefinition {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub arity: Arity,
    pub eval_fn: EvalFn,
}

pub type OperatorMap = HashMap<String, Arc<OperatorDefinition>>;

pub fn assert_arity(operator: &str, arity: &Arity, expr_len: usize) -> Result<()> {
    let operands = expr_len.saturating_sub(1);
    match arity {
        Arity::Any => Ok(()),
        Arity::Fixed(n) if operands != *n => Err(Error::EvalFailed(format!(
            "\"{operator}\" operator expects {n} operands."
        ))),
        Arity::Range(min, _) if operands < *min => Err(Error::EvalFailed(format!(
            "\"{operator}\" operator expects at least {min} operands."
        ))),
        Arity::Range(_, Some(max)) if operands > *max => Err(Error::EvalFailed(format!(
            "\"{operator}\" operator expects at most {max} operands."
        ))),
        _ => Ok(()),
    }
}

pub fn operators_to_map(operators: Vec<Arc<OperatorDefinition>>) -> OperatorMap {
    let mut map = HashMap::new();
    for op in operators {
        map.insert(op.name.to_string(), Arc::clone(&op));
        for alias in op.aliases {
            map.insert(alias.to_string(), Arc::clone(&op));
        }
    }
    map
}

pub struct EvalCtx<'a> {
    pub heap: &'a mut Heap,
    pub root: Option<ObjId>,
    pub operators: Arc<OperatorMap>,
}

fn unknown(expr: &Json) -> Error {
    Error::EvalFailed(format!(
        "Unknown expression: {}",
        serde_json::to_string(expr).unwrap_or_default()
    ))
}

pub fn evaluate(expr: &Json, ctx: &mut EvalCtx<'_>) -> Result<Value> {
    let arr = match expr {
        Json::Array(arr) => arr,
        literal => return Ok(ctx.heap.alloc_json(literal)),
    };

    let def = match arr.first() {
        None => return Ok(Value::Object(ctx.heap.new_sequence(Vec::new()))),
        Some(Json::String(name)) => ctx.operators.get(name.as_str()).cloned(),
        Some(_) => None,
    };
    let def = match def {
        Some(def) if arr.len() > 1 || def.arity == Arity::Fixed(0) => def,
        _ if arr.len() == 1 => return Ok(ctx.heap.alloc_json(&arr[0])),
        _ => return Err(unknown(expr)),
    };

    assert_arity(def.name, &def.arity, arr.len())?;
    (def.eval_fn)(arr, ctx)
}

/// The stock evaluator over the full operator table.
#[derive(Clone)]
pub struct ExprEvaluator {
    operators: Arc<OperatorMap>,
}

impl Default for ExprEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl ExprEvaluator {
    pub fn new() -> Self {
        Self {
            operators: Arc::new(operators::operators_map()),
        }
    }
}

impl Evaluator for ExprEvaluator {
    fn evaluate(&self, heap: &mut Heap, root: Option<ObjId>, code: &Json) -> Result<Value> {
        let mut ctx = EvalCtx {
            heap,
            root,
            operators: Arc::clone(&self.operators),
        };
        evaluate(code, &mut ctx)
    }
}
