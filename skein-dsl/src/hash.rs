//! Structural and syntactic hashing.
//!
//! The syntactic hash fingerprints the normalized source text and powers
//! recompilation short-circuiting. The structural hash fingerprints the
//! typed graph: binding names are erased (nodes are addressed by their
//! canonical topological index), while input names, input types, and
//! output names are hashed — they are the pipeline's external interface.

use sha2::{Digest, Sha256};
use skein_core::image::{Graph, NodeOp};

/// Hash of the normalized source: line endings unified, trailing
/// whitespace stripped, blank and comment-only lines dropped.
pub fn syntactic_hash(source: &str) -> String {
    let mut normalized = String::with_capacity(source.len());
    for line in source.replace("\r\n", "\n").lines() {
        let trimmed = line.trim_end();
        if trimmed.is_empty() || trimmed.trim_start().starts_with('#') {
            continue;
        }
        normalized.push_str(trimmed);
        normalized.push('\n');
    }
    hex_sha256(normalized.as_bytes())
}

/// Hash of the canonical graph encoding.
pub fn structural_hash(graph: &Graph) -> String {
    let mut canon = String::new();
    for node in &graph.nodes {
        canon.push_str(&format!("n{}:{}:", node.id, node.ty));
        match &node.op {
            NodeOp::Input { name } => canon.push_str(&format!("in({name})")),
            NodeOp::Literal { value } => {
                let encoded =
                    serde_json::to_string(value).expect("literal values always serialize");
                canon.push_str(&format!("lit({encoded})"));
            }
            NodeOp::Unary { op, operand } => {
                canon.push_str(&format!("un({},{operand})", op.symbol()));
            }
            NodeOp::Binary { op, lhs, rhs } => {
                canon.push_str(&format!("bin({},{lhs},{rhs})", op.symbol()));
            }
            NodeOp::Call { function, args } => {
                canon.push_str(&format!("call({}", function.name()));
                for arg in args {
                    canon.push_str(&format!(",{arg}"));
                }
                canon.push(')');
            }
        }
        canon.push(';');
    }
    for output in &graph.outputs {
        canon.push_str(&format!("out({})={};", output.name, output.node));
    }
    hex_sha256(canon.as_bytes())
}

fn hex_sha256(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(64);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}
