//! Graph evaluation.
//!
//! The engine walks a compiled graph in topological order and evaluates
//! every node whose dependencies are available, memoizing results by
//! node id. Evaluation is always lenient: absent inputs never fail, they
//! simply leave downstream nodes unevaluated. An execution only
//! completes once every declared input is bound; until then the engine
//! reports what is missing and which outputs remain pending, and the
//! caller decides whether to suspend.

use skein_core::image::{BinOp, Builtin, NodeOp, PipelineImage, UnOp};
use skein_core::types::TypeDescriptor;
use skein_core::value::Value;
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("division by zero")]
    DivisionByZero,

    #[error("integer overflow in `{0}`")]
    IntegerOverflow(&'static str),

    #[error("node {node}: operand has unexpected runtime type")]
    BadOperand { node: u32 },

    #[error("node id {0} out of range")]
    UnknownNode(u32),
}

/// Outcome of one evaluation pass.
#[derive(Debug, Clone)]
pub struct EngineResult {
    /// Produced outputs; empty unless the run completed.
    pub outputs: BTreeMap<String, Value>,
    /// Every node value computed so far, including carried-over ones.
    pub resolved_nodes: HashMap<u32, Value>,
    /// Declared inputs not present in `provided`.
    pub missing_inputs: BTreeMap<String, TypeDescriptor>,
    /// Declared outputs not yet produced.
    pub pending_outputs: Vec<String>,
}

impl EngineResult {
    pub fn is_complete(&self) -> bool {
        self.missing_inputs.is_empty() && self.pending_outputs.is_empty()
    }
}

/// Evaluate `image` against the provided inputs, carrying forward any
/// node values resolved by earlier passes of the same execution.
pub fn evaluate(
    image: &PipelineImage,
    provided: &BTreeMap<String, Value>,
    carried: &HashMap<u32, Value>,
) -> Result<EngineResult, EngineError> {
    let mut resolved: HashMap<u32, Value> = carried.clone();

    for node in &image.graph.nodes {
        if resolved.contains_key(&node.id) {
            continue;
        }
        let value = match &node.op {
            NodeOp::Input { name } => provided.get(name).cloned(),
            NodeOp::Literal { value } => Some(value.clone()),
            NodeOp::Unary { op, operand } => match resolved.get(operand) {
                Some(v) => Some(eval_unary(*op, v, node.id)?),
                None => None,
            },
            NodeOp::Binary { op, lhs, rhs } => {
                match (resolved.get(lhs), resolved.get(rhs)) {
                    (Some(l), Some(r)) => Some(eval_binary(*op, l, r, node.id)?),
                    _ => None,
                }
            }
            NodeOp::Call { function, args } => {
                let mut values = Vec::with_capacity(args.len());
                let mut all_present = true;
                for arg in args {
                    match resolved.get(arg) {
                        Some(v) => values.push(v.clone()),
                        None => {
                            all_present = false;
                            break;
                        }
                    }
                }
                if all_present {
                    Some(eval_call(*function, &values, node.id)?)
                } else {
                    None
                }
            }
        };
        if let Some(value) = value {
            resolved.insert(node.id, value);
        }
    }

    let missing_inputs: BTreeMap<String, TypeDescriptor> = image
        .declared_inputs
        .iter()
        .filter(|(name, _)| !provided.contains_key(*name))
        .map(|(name, ty)| (name.clone(), ty.clone()))
        .collect();

    // Outputs are only finalized once the input set is complete; a
    // partially fed run keeps all outputs pending even when some output
    // nodes are already computable.
    if missing_inputs.is_empty() {
        let mut outputs = BTreeMap::new();
        for binding in &image.graph.outputs {
            let value = resolved
                .get(&binding.node)
                .ok_or(EngineError::UnknownNode(binding.node))?;
            outputs.insert(binding.name.clone(), value.clone());
        }
        Ok(EngineResult {
            outputs,
            resolved_nodes: resolved,
            missing_inputs,
            pending_outputs: Vec::new(),
        })
    } else {
        Ok(EngineResult {
            outputs: BTreeMap::new(),
            resolved_nodes: resolved,
            missing_inputs,
            pending_outputs: image.declared_outputs.clone(),
        })
    }
}

fn eval_unary(op: UnOp, v: &Value, node: u32) -> Result<Value, EngineError> {
    match (op, v) {
        (UnOp::Neg, Value::Int(i)) => i
            .checked_neg()
            .map(Value::Int)
            .ok_or(EngineError::IntegerOverflow("-")),
        (UnOp::Neg, Value::Float(f)) => Ok(Value::Float(-f)),
        (UnOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
        _ => Err(EngineError::BadOperand { node }),
    }
}

fn eval_binary(op: BinOp, lhs: &Value, rhs: &Value, node: u32) -> Result<Value, EngineError> {
    use Value::*;
    match op {
        BinOp::Add => match (lhs, rhs) {
            (Int(a), Int(b)) => a
                .checked_add(*b)
                .map(Int)
                .ok_or(EngineError::IntegerOverflow("+")),
            (Str(a), Str(b)) => Ok(Str(format!("{a}{b}"))),
            _ => numeric_float(lhs, rhs, node, |a, b| a + b),
        },
        BinOp::Sub => match (lhs, rhs) {
            (Int(a), Int(b)) => a
                .checked_sub(*b)
                .map(Int)
                .ok_or(EngineError::IntegerOverflow("-")),
            _ => numeric_float(lhs, rhs, node, |a, b| a - b),
        },
        BinOp::Mul => match (lhs, rhs) {
            (Int(a), Int(b)) => a
                .checked_mul(*b)
                .map(Int)
                .ok_or(EngineError::IntegerOverflow("*")),
            _ => numeric_float(lhs, rhs, node, |a, b| a * b),
        },
        BinOp::Div => match (lhs, rhs) {
            (Int(_), Int(0)) => Err(EngineError::DivisionByZero),
            (Int(a), Int(b)) => a
                .checked_div(*b)
                .map(Int)
                .ok_or(EngineError::IntegerOverflow("/")),
            _ => numeric_float(lhs, rhs, node, |a, b| a / b),
        },
        BinOp::Rem => match (lhs, rhs) {
            (Int(_), Int(0)) => Err(EngineError::DivisionByZero),
            (Int(a), Int(b)) => a
                .checked_rem(*b)
                .map(Int)
                .ok_or(EngineError::IntegerOverflow("%")),
            _ => numeric_float(lhs, rhs, node, |a, b| a % b),
        },
        BinOp::Eq => Ok(Bool(value_eq(lhs, rhs))),
        BinOp::Ne => Ok(Bool(!value_eq(lhs, rhs))),
        BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
            let ordering = compare(lhs, rhs).ok_or(EngineError::BadOperand { node })?;
            Ok(Bool(match op {
                BinOp::Lt => ordering.is_lt(),
                BinOp::Le => ordering.is_le(),
                BinOp::Gt => ordering.is_gt(),
                _ => ordering.is_ge(),
            }))
        }
        BinOp::And => match (lhs, rhs) {
            (Bool(a), Bool(b)) => Ok(Bool(*a && *b)),
            _ => Err(EngineError::BadOperand { node }),
        },
        BinOp::Or => match (lhs, rhs) {
            (Bool(a), Bool(b)) => Ok(Bool(*a || *b)),
            _ => Err(EngineError::BadOperand { node }),
        },
    }
}

fn numeric_float(
    lhs: &Value,
    rhs: &Value,
    node: u32,
    f: impl Fn(f64, f64) -> f64,
) -> Result<Value, EngineError> {
    match (as_f64(lhs), as_f64(rhs)) {
        (Some(a), Some(b)) => Ok(Value::Float(f(a, b))),
        _ => Err(EngineError::BadOperand { node }),
    }
}

fn as_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Int(i) => Some(*i as f64),
        Value::Float(f) => Some(*f),
        _ => None,
    }
}

fn value_eq(lhs: &Value, rhs: &Value) -> bool {
    match (as_f64(lhs), as_f64(rhs)) {
        (Some(a), Some(b)) => a == b,
        _ => lhs == rhs,
    }
}

fn compare(lhs: &Value, rhs: &Value) -> Option<std::cmp::Ordering> {
    match (lhs, rhs) {
        (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
        _ => {
            let (a, b) = (as_f64(lhs)?, as_f64(rhs)?);
            a.partial_cmp(&b)
        }
    }
}

fn eval_call(function: Builtin, args: &[Value], node: u32) -> Result<Value, EngineError> {
    use Value::*;
    match (function, args) {
        (Builtin::Len, [Str(s)]) => Ok(Int(s.chars().count() as i64)),
        (Builtin::Len, [List(items)]) => Ok(Int(items.len() as i64)),
        (Builtin::Len, [Map(entries)]) => Ok(Int(entries.len() as i64)),
        (Builtin::Min, [a, b]) => match (a, b) {
            (Int(x), Int(y)) => Ok(Int(*x.min(y))),
            _ => {
                let (x, y) = (as_f64(a), as_f64(b));
                match (x, y) {
                    (Some(x), Some(y)) => Ok(Float(x.min(y))),
                    _ => Err(EngineError::BadOperand { node }),
                }
            }
        },
        (Builtin::Max, [a, b]) => match (a, b) {
            (Int(x), Int(y)) => Ok(Int(*x.max(y))),
            _ => {
                let (x, y) = (as_f64(a), as_f64(b));
                match (x, y) {
                    (Some(x), Some(y)) => Ok(Float(x.max(y))),
                    _ => Err(EngineError::BadOperand { node }),
                }
            }
        },
        (Builtin::Abs, [Int(i)]) => i
            .checked_abs()
            .map(Int)
            .ok_or(EngineError::IntegerOverflow("abs")),
        (Builtin::Abs, [Float(f)]) => Ok(Float(f.abs())),
        (Builtin::Upper, [Str(s)]) => Ok(Str(s.to_uppercase())),
        (Builtin::Lower, [Str(s)]) => Ok(Str(s.to_lowercase())),
        (Builtin::Concat, parts) if parts.iter().all(|p| matches!(p, Str(_))) => {
            let mut out = String::new();
            for part in parts {
                if let Str(s) = part {
                    out.push_str(s);
                }
            }
            Ok(Str(out))
        }
        _ => Err(EngineError::BadOperand { node }),
    }
}
