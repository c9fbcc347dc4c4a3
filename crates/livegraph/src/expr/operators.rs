//! Operator table for [`ExprEvaluator`](super::ExprEvaluator).

use std::sync::Arc;

use serde_json::Value as Json;

use super::{evaluate, operators_to_map, Arity, EvalCtx, OperatorDefinition, OperatorMap};
use crate::address::value_at;
use crate::error::{Error, Result};
use crate::literal::regex_literal;
use crate::value::{Callable, Value};

fn operand_str<'a>(expr: &'a [Json], i: usize, what: &str) -> Result<&'a str> {
    expr.get(i)
        .and_then(Json::as_str)
        .ok_or_else(|| Error::EvalFailed(format!("\"{}\" expects {what} as a string", op_name(expr))))
}

fn op_name(expr: &[Json]) -> &str {
    expr.first().and_then(Json::as_str).unwrap_or("?")
}

fn undefined_eval(_expr: &[Json], _ctx: &mut EvalCtx<'_>) -> Result<Value> {
    Ok(Value::Undefined)
}

/// Path operand: `/0/2` text or an array of positions.
fn decode_path(v: &Json) -> Result<Vec<usize>> {
    match v {
        Json::String(s) => {
            livegraph_path::parse_path(s).map_err(|e| Error::EvalFailed(e.to_string()))
        }
        Json::Array(steps) => steps
            .iter()
            .map(|s| {
                s.as_u64()
                    .map(|n| n as usize)
                    .ok_or_else(|| Error::EvalFailed("path steps must be non-negative integers".into()))
            })
            .collect(),
        _ => Err(Error::EvalFailed("path must be a string or an array".into())),
    }
}

fn get_eval(expr: &[Json], ctx: &mut EvalCtx<'_>) -> Result<Value> {
    let root = ctx
        .root
        .ok_or_else(|| Error::EvalFailed("no module root to read from".into()))?;
    let path = decode_path(&expr[1])?;
    value_at(ctx.heap, root, &path).map_err(|e| Error::EvalFailed(e.to_string()))
}

fn seq_eval(expr: &[Json], ctx: &mut EvalCtx<'_>) -> Result<Value> {
    let mut items = Vec::with_capacity(expr.len() - 1);
    for operand in &expr[1..] {
        items.push(evaluate(operand, ctx)?);
    }
    Ok(Value::Object(ctx.heap.new_sequence(items)))
}

fn map_eval(expr: &[Json], ctx: &mut EvalCtx<'_>) -> Result<Value> {
    let fields = expr[1]
        .as_object()
        .ok_or_else(|| Error::EvalFailed("\"map\" expects an object operand".into()))?;
    let mut entries = Vec::with_capacity(fields.len());
    for (key, operand) in fields {
        entries.push((key.clone(), evaluate(operand, ctx)?));
    }
    Ok(Value::Object(ctx.heap.new_mapping(entries)))
}

fn fn_eval(expr: &[Json], ctx: &mut EvalCtx<'_>) -> Result<Value> {
    let source = operand_str(expr, 1, "source")?;
    Ok(Value::Object(ctx.heap.new_callable(Callable::new(source))))
}

fn re_eval(expr: &[Json], _ctx: &mut EvalCtx<'_>) -> Result<Value> {
    let source = operand_str(expr, 1, "source")?;
    let flags = if expr.len() > 2 {
        operand_str(expr, 2, "flags")?
    } else {
        ""
    };
    Ok(Value::Regex(regex_literal(source, flags)?))
}

fn throw_eval(expr: &[Json], _ctx: &mut EvalCtx<'_>) -> Result<Value> {
    let message = match &expr[1] {
        Json::String(s) => s.clone(),
        other => other.to_string(),
    };
    Err(Error::EvalFailed(message))
}

pub fn operators() -> Vec<Arc<OperatorDefinition>> {
    vec![
        Arc::new(OperatorDefinition {
            name: "undefined",
            aliases: &[],
            arity: Arity::Fixed(0),
            eval_fn: undefined_eval,
        }),
        Arc::new(OperatorDefinition {
            name: "$",
            aliases: &["get"],
            arity: Arity::Fixed(1),
            eval_fn: get_eval,
        }),
        Arc::new(OperatorDefinition {
            name: "seq",
            aliases: &[],
            arity: Arity::Any,
            eval_fn: seq_eval,
        }),
        Arc::new(OperatorDefinition {
            name: "map",
            aliases: &[],
            arity: Arity::Fixed(1),
            eval_fn: map_eval,
        }),
        Arc::new(OperatorDefinition {
            name: "fn",
            aliases: &[],
            arity: Arity::Fixed(1),
            eval_fn: fn_eval,
        }),
        Arc::new(OperatorDefinition {
            name: "re",
            aliases: &[],
            arity: Arity::Range(1, Some(2)),
            eval_fn: re_eval,
        }),
        Arc::new(OperatorDefinition {
            name: "throw",
            aliases: &[],
            arity: Arity::Fixed(1),
            eval_fn: throw_eval,
        }),
    ]
}

pub fn operators_map() -> OperatorMap {
    operators_to_map(operators())
}
