use crate::types::TypeDescriptor;
use crate::value::Value;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Length in hex characters of a structural (and syntactic) hash.
pub const STRUCTURAL_HASH_LEN: usize = 64;

/// An immutable compiled pipeline.
///
/// Identity is `structural_hash`; two sources that compile to the same
/// typed graph (modulo binding names and whitespace) share one image.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineImage {
    pub structural_hash: String,
    pub syntactic_hash: String,
    pub compiled_at: DateTime<Utc>,
    pub declared_inputs: BTreeMap<String, TypeDescriptor>,
    pub declared_outputs: Vec<String>,
    pub module_count: usize,
    pub graph: Graph,
}

/// Listing row for `GET /pipelines`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageSummary {
    pub structural_hash: String,
    pub syntactic_hash: String,
    pub aliases: Vec<String>,
    pub compiled_at: DateTime<Utc>,
    pub module_count: usize,
    pub declared_outputs: Vec<String>,
}

/// The executable dataflow graph. Nodes are stored in topological order;
/// node ids are indices into `nodes`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Graph {
    pub nodes: Vec<Node>,
    pub outputs: Vec<OutputBinding>,
}

impl Graph {
    pub fn node(&self, id: u32) -> Option<&Node> {
        self.nodes.get(id as usize)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: u32,
    pub ty: TypeDescriptor,
    pub op: NodeOp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeOp {
    /// A declared pipeline input, bound at execution time.
    Input { name: String },
    /// A compile-time constant.
    Literal { value: Value },
    Unary { op: UnOp, operand: u32 },
    Binary { op: BinOp, lhs: u32, rhs: u32 },
    Call { function: Builtin, args: Vec<u32> },
}

impl NodeOp {
    /// Node ids this operation reads.
    pub fn operands(&self) -> Vec<u32> {
        match self {
            NodeOp::Input { .. } | NodeOp::Literal { .. } => Vec::new(),
            NodeOp::Unary { operand, .. } => vec![*operand],
            NodeOp::Binary { lhs, rhs, .. } => vec![*lhs, *rhs],
            NodeOp::Call { args, .. } => args.clone(),
        }
    }
}

/// A declared output: `name` is the externally visible output name,
/// `node` the graph node producing its value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputBinding {
    pub name: String,
    pub node: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinOp {
    /// Canonical token, used in hashing and diagnostics.
    pub fn symbol(&self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Rem => "%",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::And => "&&",
            BinOp::Or => "||",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnOp {
    Neg,
    Not,
}

impl UnOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            UnOp::Neg => "-",
            UnOp::Not => "!",
        }
    }
}

/// Built-in functions callable from pipeline expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Builtin {
    Len,
    Min,
    Max,
    Abs,
    Upper,
    Lower,
    Concat,
}

impl Builtin {
    pub fn name(&self) -> &'static str {
        match self {
            Builtin::Len => "len",
            Builtin::Min => "min",
            Builtin::Max => "max",
            Builtin::Abs => "abs",
            Builtin::Upper => "upper",
            Builtin::Lower => "lower",
            Builtin::Concat => "concat",
        }
    }

    pub fn by_name(name: &str) -> Option<Builtin> {
        match name {
            "len" => Some(Builtin::Len),
            "min" => Some(Builtin::Min),
            "max" => Some(Builtin::Max),
            "abs" => Some(Builtin::Abs),
            "upper" => Some(Builtin::Upper),
            "lower" => Some(Builtin::Lower),
            "concat" => Some(Builtin::Concat),
            _ => None,
        }
    }
}
