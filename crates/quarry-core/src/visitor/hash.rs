//! Structural hashing of parameterized expressions.
//!
//! The hash covers node kinds, operator, method and member identity,
//! literal values and each synthetic parameter's slot and static type. It
//! never reads the runtime value bound to a parameter. Lambda parameters
//! hash by binding position, so alpha-equivalent trees hash equally.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use quarry_expr::{Constant, Expr, Lambda, Parameter, QueryRoot};

/// Accumulates the structural hash of one or more trees.
#[derive(Debug, Default)]
pub struct StructuralHasher {
    state: DefaultHasher,
    scopes: Vec<Vec<String>>,
}

/// Resolve a lambda parameter to `(binder depth, position)`.
fn binding(scopes: &[Vec<String>], name: &str) -> Option<(usize, usize)> {
    scopes.iter().rev().enumerate().find_map(|(depth, scope)| {
        scope
            .iter()
            .position(|n| n == name)
            .map(|position| (depth, position))
    })
}

impl StructuralHasher {
    /// Create an empty hasher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mix an extra value into the key.
    pub fn write(&mut self, value: impl Hash) {
        value.hash(&mut self.state);
    }

    /// Mix a tree into the key.
    pub fn visit(&mut self, expr: &Expr) {
        std::mem::discriminant(expr).hash(&mut self.state);
        match expr {
            Expr::Constant(constant) => self.constant(constant),
            Expr::Parameter(p) => self.parameter(p),
            Expr::Member { target, name, ty } => {
                name.hash(&mut self.state);
                ty.hash(&mut self.state);
                self.visit(target);
            }
            Expr::Call {
                method,
                target,
                args,
                ty,
            } => {
                method.hash(&mut self.state);
                ty.hash(&mut self.state);
                target.is_some().hash(&mut self.state);
                if let Some(target) = target {
                    self.visit(target);
                }
                args.len().hash(&mut self.state);
                for arg in args {
                    self.visit(arg);
                }
            }
            Expr::Conditional {
                test,
                if_true,
                if_false,
            } => {
                self.visit(test);
                self.visit(if_true);
                self.visit(if_false);
            }
            Expr::Lambda(lambda) => self.lambda(lambda),
            Expr::Binary { op, left, right } => {
                op.hash(&mut self.state);
                self.visit(left);
                self.visit(right);
            }
            Expr::Unary { op, operand } => {
                op.hash(&mut self.state);
                self.visit(operand);
            }
            Expr::New { members } => {
                members.len().hash(&mut self.state);
                for (name, value) in members {
                    name.hash(&mut self.state);
                    self.visit(value);
                }
            }
            Expr::In { item, set } => {
                self.visit(item);
                self.visit(set);
            }
            Expr::Include {
                entity,
                member,
                value,
            } => {
                member.hash(&mut self.state);
                self.visit(entity);
                self.visit(value);
            }
        }
    }

    fn constant(&mut self, constant: &Constant) {
        std::mem::discriminant(constant).hash(&mut self.state);
        match constant {
            Constant::Literal(value) => value.hash(&mut self.state),
            // Parameterization removes these; hash the type so a stray one
            // still partitions by signature.
            Constant::Captured { ty, .. } => ty.hash(&mut self.state),
            Constant::Query(root) => {
                std::mem::discriminant(root).hash(&mut self.state);
                match root {
                    QueryRoot::EntitySet { entity, filtered } => {
                        entity.hash(&mut self.state);
                        filtered.hash(&mut self.state);
                    }
                    QueryRoot::Expression(inner) => self.visit(inner),
                    QueryRoot::Opaque {
                        name,
                        element,
                        values,
                    } => {
                        name.hash(&mut self.state);
                        element.hash(&mut self.state);
                        values.hash(&mut self.state);
                    }
                }
            }
        }
    }

    fn parameter(&mut self, p: &Parameter) {
        p.ty.hash(&mut self.state);
        match p.slot {
            Some(slot) => {
                0u8.hash(&mut self.state);
                slot.hash(&mut self.state);
            }
            None => match binding(&self.scopes, &p.name) {
                Some(position) => {
                    1u8.hash(&mut self.state);
                    position.hash(&mut self.state);
                }
                None => {
                    2u8.hash(&mut self.state);
                    p.name.hash(&mut self.state);
                }
            },
        }
    }

    fn lambda(&mut self, lambda: &Lambda) {
        lambda.params.len().hash(&mut self.state);
        for p in &lambda.params {
            p.ty.hash(&mut self.state);
        }
        self.scopes
            .push(lambda.params.iter().map(|p| p.name.clone()).collect());
        self.visit(&lambda.body);
        self.scopes.pop();
    }

    /// The accumulated hash.
    pub fn finish(&self) -> u64 {
        self.state.finish()
    }
}

/// Structural hash of a single tree.
pub fn structural_hash(expr: &Expr) -> u64 {
    let mut hasher = StructuralHasher::new();
    hasher.visit(expr);
    hasher.finish()
}

/// Check two trees for equality up to renaming of lambda parameters.
///
/// Mirrors [`StructuralHasher`]: trees this reports equal always hash
/// equally.
pub fn structurally_equal(a: &Expr, b: &Expr) -> bool {
    Comparer::default().expr(a, b)
}

#[derive(Default)]
struct Comparer {
    left: Vec<Vec<String>>,
    right: Vec<Vec<String>>,
}

impl Comparer {
    fn exprs(&mut self, a: &[Expr], b: &[Expr]) -> bool {
        a.len() == b.len() && a.iter().zip(b).all(|(x, y)| self.expr(x, y))
    }

    fn expr(&mut self, a: &Expr, b: &Expr) -> bool {
        match (a, b) {
            (Expr::Constant(x), Expr::Constant(y)) => self.constant(x, y),
            (Expr::Parameter(x), Expr::Parameter(y)) => {
                x.ty == y.ty
                    && match (x.slot, y.slot) {
                        (Some(i), Some(j)) => i == j,
                        (None, None) => match (
                            binding(&self.left, &x.name),
                            binding(&self.right, &y.name),
                        ) {
                            (Some(i), Some(j)) => i == j,
                            (None, None) => x.name == y.name,
                            _ => false,
                        },
                        _ => false,
                    }
            }
            (
                Expr::Member {
                    target: t1,
                    name: n1,
                    ty: ty1,
                },
                Expr::Member {
                    target: t2,
                    name: n2,
                    ty: ty2,
                },
            ) => n1 == n2 && ty1 == ty2 && self.expr(t1, t2),
            (
                Expr::Call {
                    method: m1,
                    target: t1,
                    args: a1,
                    ty: ty1,
                },
                Expr::Call {
                    method: m2,
                    target: t2,
                    args: a2,
                    ty: ty2,
                },
            ) => {
                m1 == m2
                    && ty1 == ty2
                    && match (t1, t2) {
                        (Some(x), Some(y)) => self.expr(x, y),
                        (None, None) => true,
                        _ => false,
                    }
                    && self.exprs(a1, a2)
            }
            (
                Expr::Conditional {
                    test: c1,
                    if_true: t1,
                    if_false: f1,
                },
                Expr::Conditional {
                    test: c2,
                    if_true: t2,
                    if_false: f2,
                },
            ) => self.expr(c1, c2) && self.expr(t1, t2) && self.expr(f1, f2),
            (Expr::Lambda(x), Expr::Lambda(y)) => {
                if x.params.len() != y.params.len()
                    || x.params.iter().zip(&y.params).any(|(p, q)| p.ty != q.ty)
                {
                    return false;
                }
                self.left
                    .push(x.params.iter().map(|p| p.name.clone()).collect());
                self.right
                    .push(y.params.iter().map(|p| p.name.clone()).collect());
                let equal = self.expr(&x.body, &y.body);
                self.left.pop();
                self.right.pop();
                equal
            }
            (
                Expr::Binary {
                    op: o1,
                    left: l1,
                    right: r1,
                },
                Expr::Binary {
                    op: o2,
                    left: l2,
                    right: r2,
                },
            ) => o1 == o2 && self.expr(l1, l2) && self.expr(r1, r2),
            (
                Expr::Unary {
                    op: o1,
                    operand: x,
                },
                Expr::Unary {
                    op: o2,
                    operand: y,
                },
            ) => o1 == o2 && self.expr(x, y),
            (Expr::New { members: m1 }, Expr::New { members: m2 }) => {
                m1.len() == m2.len()
                    && m1
                        .iter()
                        .zip(m2)
                        .all(|((n1, v1), (n2, v2))| n1 == n2 && self.expr(v1, v2))
            }
            (Expr::In { item: i1, set: s1 }, Expr::In { item: i2, set: s2 }) => {
                self.expr(i1, i2) && self.expr(s1, s2)
            }
            (
                Expr::Include {
                    entity: e1,
                    member: m1,
                    value: v1,
                },
                Expr::Include {
                    entity: e2,
                    member: m2,
                    value: v2,
                },
            ) => m1 == m2 && self.expr(e1, e2) && self.expr(v1, v2),
            _ => false,
        }
    }

    fn constant(&mut self, a: &Constant, b: &Constant) -> bool {
        match (a, b) {
            (Constant::Query(QueryRoot::Expression(x)), Constant::Query(QueryRoot::Expression(y))) => {
                self.expr(x, y)
            }
            (Constant::Captured { ty: t1, .. }, Constant::Captured { ty: t2, .. }) => t1 == t2,
            _ => a == b,
        }
    }
}
