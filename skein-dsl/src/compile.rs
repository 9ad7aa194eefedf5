//! Type checking and graph construction.
//!
//! Statements are checked in order against an environment of prior
//! bindings; every expression lowers to one graph node. All diagnostics
//! are collected in a single pass.

use crate::hash;
use crate::parser::{parse, BinaryKind, Expr, Spanned, Stmt, UnaryKind};
use chrono::Utc;
use skein_core::error::Diagnostic;
use skein_core::image::{BinOp, Builtin, Graph, Node, NodeOp, OutputBinding, PipelineImage, UnOp};
use skein_core::types::TypeDescriptor;
use skein_core::value::Value;
use std::collections::BTreeMap;
use std::collections::HashMap;

/// Compile DSL source into an immutable pipeline image.
pub fn compile(source: &str) -> Result<PipelineImage, Vec<Diagnostic>> {
    let (statements, mut diagnostics) = parse(source);

    let mut builder = GraphBuilder::default();
    for stmt in &statements {
        builder.lower(stmt, &mut diagnostics);
    }

    if !diagnostics.is_empty() {
        return Err(diagnostics);
    }

    let graph = Graph {
        nodes: builder.nodes,
        outputs: builder.outputs,
    };

    Ok(PipelineImage {
        structural_hash: hash::structural_hash(&graph),
        syntactic_hash: hash::syntactic_hash(source),
        compiled_at: Utc::now(),
        declared_inputs: builder.declared_inputs,
        declared_outputs: builder.declared_outputs,
        module_count: statements.len(),
        graph,
    })
}

#[derive(Default)]
struct GraphBuilder {
    nodes: Vec<Node>,
    outputs: Vec<OutputBinding>,
    declared_inputs: BTreeMap<String, TypeDescriptor>,
    declared_outputs: Vec<String>,
    /// Bindings visible to later statements: name → node id.
    env: HashMap<String, u32>,
}

impl GraphBuilder {
    fn push(&mut self, ty: TypeDescriptor, op: NodeOp) -> u32 {
        let id = self.nodes.len() as u32;
        self.nodes.push(Node { id, ty, op });
        id
    }

    fn node_type(&self, id: u32) -> &TypeDescriptor {
        &self.nodes[id as usize].ty
    }

    fn lower(&mut self, stmt: &Spanned<Stmt>, diagnostics: &mut Vec<Diagnostic>) {
        match &stmt.node {
            Stmt::Input { name, ty } => {
                if self.env.contains_key(name) {
                    diagnostics.push(Diagnostic::new(
                        stmt.line,
                        stmt.column,
                        "E004",
                        format!("duplicate declaration of `{name}`"),
                    ));
                    return;
                }
                let id = self.push(ty.clone(), NodeOp::Input { name: name.clone() });
                self.env.insert(name.clone(), id);
                self.declared_inputs.insert(name.clone(), ty.clone());
            }
            Stmt::Let { name, expr } => {
                if self.env.contains_key(name) {
                    diagnostics.push(Diagnostic::new(
                        stmt.line,
                        stmt.column,
                        "E004",
                        format!("duplicate declaration of `{name}`"),
                    ));
                    return;
                }
                if let Some(id) = self.expr(expr, diagnostics) {
                    self.env.insert(name.clone(), id);
                }
            }
            Stmt::Out { name, expr } => {
                if self.declared_outputs.contains(name) {
                    diagnostics.push(Diagnostic::new(
                        stmt.line,
                        stmt.column,
                        "E004",
                        format!("duplicate output `{name}`"),
                    ));
                    return;
                }
                let id = match expr {
                    Some(e) => self.expr(e, diagnostics),
                    None => match self.env.get(name) {
                        Some(id) => Some(*id),
                        None => {
                            diagnostics.push(Diagnostic::new(
                                stmt.line,
                                stmt.column,
                                "E003",
                                format!("unknown identifier `{name}`"),
                            ));
                            None
                        }
                    },
                };
                if let Some(id) = id {
                    self.declared_outputs.push(name.clone());
                    self.outputs.push(OutputBinding {
                        name: name.clone(),
                        node: id,
                    });
                }
            }
        }
    }

    fn expr(&mut self, expr: &Spanned<Expr>, diagnostics: &mut Vec<Diagnostic>) -> Option<u32> {
        match &expr.node {
            Expr::Int(v) => Some(self.push(
                TypeDescriptor::Int,
                NodeOp::Literal {
                    value: Value::Int(*v),
                },
            )),
            Expr::Float(v) => Some(self.push(
                TypeDescriptor::Float,
                NodeOp::Literal {
                    value: Value::Float(*v),
                },
            )),
            Expr::Bool(v) => Some(self.push(
                TypeDescriptor::Bool,
                NodeOp::Literal {
                    value: Value::Bool(*v),
                },
            )),
            Expr::Str(v) => Some(self.push(
                TypeDescriptor::Str,
                NodeOp::Literal {
                    value: Value::Str(v.clone()),
                },
            )),
            Expr::Ident(name) => match self.env.get(name) {
                Some(id) => Some(*id),
                None => {
                    diagnostics.push(Diagnostic::new(
                        expr.line,
                        expr.column,
                        "E003",
                        format!("unknown identifier `{name}`"),
                    ));
                    None
                }
            },
            Expr::Unary { op, operand } => {
                let operand_id = self.expr(operand, diagnostics)?;
                let operand_ty = self.node_type(operand_id).clone();
                let (un_op, ty) = match op {
                    UnaryKind::Neg if operand_ty.is_numeric() => (UnOp::Neg, operand_ty),
                    UnaryKind::Not if operand_ty == TypeDescriptor::Bool => {
                        (UnOp::Not, TypeDescriptor::Bool)
                    }
                    UnaryKind::Neg => {
                        diagnostics.push(Diagnostic::new(
                            expr.line,
                            expr.column,
                            "E005",
                            format!("cannot negate {operand_ty}"),
                        ));
                        return None;
                    }
                    UnaryKind::Not => {
                        diagnostics.push(Diagnostic::new(
                            expr.line,
                            expr.column,
                            "E005",
                            format!("`!` expects Bool, got {operand_ty}"),
                        ));
                        return None;
                    }
                };
                Some(self.push(
                    ty,
                    NodeOp::Unary {
                        op: un_op,
                        operand: operand_id,
                    },
                ))
            }
            Expr::Binary { op, lhs, rhs } => {
                let lhs_id = self.expr(lhs, diagnostics)?;
                let rhs_id = self.expr(rhs, diagnostics)?;
                let lhs_ty = self.node_type(lhs_id).clone();
                let rhs_ty = self.node_type(rhs_id).clone();
                let (bin_op, ty) =
                    self.binary_type(*op, &lhs_ty, &rhs_ty, expr, diagnostics)?;
                Some(self.push(
                    ty,
                    NodeOp::Binary {
                        op: bin_op,
                        lhs: lhs_id,
                        rhs: rhs_id,
                    },
                ))
            }
            Expr::Call { name, args } => self.call(name, args, expr, diagnostics),
        }
    }

    fn binary_type(
        &self,
        op: BinaryKind,
        lhs: &TypeDescriptor,
        rhs: &TypeDescriptor,
        at: &Spanned<Expr>,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Option<(BinOp, TypeDescriptor)> {
        use TypeDescriptor as T;
        let numeric = |a: &T, b: &T| {
            if *a == T::Float || *b == T::Float {
                T::Float
            } else {
                T::Int
            }
        };
        let result = match op {
            BinaryKind::Add => {
                if lhs.is_numeric() && rhs.is_numeric() {
                    Some((BinOp::Add, numeric(lhs, rhs)))
                } else if *lhs == T::Str && *rhs == T::Str {
                    Some((BinOp::Add, T::Str))
                } else {
                    None
                }
            }
            BinaryKind::Sub | BinaryKind::Mul | BinaryKind::Div | BinaryKind::Rem => {
                if lhs.is_numeric() && rhs.is_numeric() {
                    let mapped = match op {
                        BinaryKind::Sub => BinOp::Sub,
                        BinaryKind::Mul => BinOp::Mul,
                        BinaryKind::Div => BinOp::Div,
                        _ => BinOp::Rem,
                    };
                    Some((mapped, numeric(lhs, rhs)))
                } else {
                    None
                }
            }
            BinaryKind::Eq | BinaryKind::Ne => {
                let comparable =
                    lhs == rhs || (lhs.is_numeric() && rhs.is_numeric());
                if comparable {
                    let mapped = if op == BinaryKind::Eq { BinOp::Eq } else { BinOp::Ne };
                    Some((mapped, T::Bool))
                } else {
                    None
                }
            }
            BinaryKind::Lt | BinaryKind::Le | BinaryKind::Gt | BinaryKind::Ge => {
                let ordered = (lhs.is_numeric() && rhs.is_numeric())
                    || (*lhs == T::Str && *rhs == T::Str);
                if ordered {
                    let mapped = match op {
                        BinaryKind::Lt => BinOp::Lt,
                        BinaryKind::Le => BinOp::Le,
                        BinaryKind::Gt => BinOp::Gt,
                        _ => BinOp::Ge,
                    };
                    Some((mapped, T::Bool))
                } else {
                    None
                }
            }
            BinaryKind::And | BinaryKind::Or => {
                if *lhs == T::Bool && *rhs == T::Bool {
                    let mapped = if op == BinaryKind::And { BinOp::And } else { BinOp::Or };
                    Some((mapped, T::Bool))
                } else {
                    None
                }
            }
        };
        if result.is_none() {
            diagnostics.push(Diagnostic::new(
                at.line,
                at.column,
                "E005",
                format!("operator not defined for {lhs} and {rhs}"),
            ));
        }
        result
    }

    fn call(
        &mut self,
        name: &str,
        args: &[Spanned<Expr>],
        at: &Spanned<Expr>,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Option<u32> {
        let Some(builtin) = Builtin::by_name(name) else {
            diagnostics.push(Diagnostic::new(
                at.line,
                at.column,
                "E006",
                format!("unknown function `{name}`"),
            ));
            return None;
        };

        let mut arg_ids = Vec::with_capacity(args.len());
        for arg in args {
            arg_ids.push(self.expr(arg, diagnostics)?);
        }
        let arg_tys: Vec<TypeDescriptor> =
            arg_ids.iter().map(|id| self.node_type(*id).clone()).collect();

        use TypeDescriptor as T;
        let bad = |diagnostics: &mut Vec<Diagnostic>, msg: String| {
            diagnostics.push(Diagnostic::new(at.line, at.column, "E006", msg));
        };

        let result_ty = match builtin {
            Builtin::Len => match arg_tys.as_slice() {
                [T::Str] | [T::List(_)] | [T::Map(_)] => T::Int,
                _ => {
                    bad(
                        diagnostics,
                        "len expects one String, List, or Map argument".into(),
                    );
                    return None;
                }
            },
            Builtin::Min | Builtin::Max => match arg_tys.as_slice() {
                [a, b] if a.is_numeric() && b.is_numeric() => {
                    if *a == T::Float || *b == T::Float {
                        T::Float
                    } else {
                        T::Int
                    }
                }
                _ => {
                    bad(diagnostics, format!("{name} expects two numeric arguments"));
                    return None;
                }
            },
            Builtin::Abs => match arg_tys.as_slice() {
                [a] if a.is_numeric() => a.clone(),
                _ => {
                    bad(diagnostics, "abs expects one numeric argument".into());
                    return None;
                }
            },
            Builtin::Upper | Builtin::Lower => match arg_tys.as_slice() {
                [T::Str] => T::Str,
                _ => {
                    bad(diagnostics, format!("{name} expects one String argument"));
                    return None;
                }
            },
            Builtin::Concat => {
                if !arg_tys.is_empty() && arg_tys.iter().all(|t| *t == T::Str) {
                    T::Str
                } else {
                    bad(
                        diagnostics,
                        "concat expects one or more String arguments".into(),
                    );
                    return None;
                }
            }
        };

        Some(self.push(
            result_ty,
            NodeOp::Call {
                function: builtin,
                args: arg_ids,
            },
        ))
    }
}
