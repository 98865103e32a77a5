//! Generic child walking and parameter substitution.
//!
//! Every rewriting pass in the pipeline is written against these helpers:
//! a pass matches the nodes it cares about and hands everything else to
//! [`Expr::map_children`], so only the interesting cases are spelled out.

use std::convert::Infallible;

use crate::expr::{Expr, Lambda};

fn boxed<E, F>(expr: Box<Expr>, f: &mut F) -> Result<Box<Expr>, E>
where
    F: FnMut(Expr) -> Result<Expr, E>,
{
    Ok(Box::new(f(*expr)?))
}

impl Expr {
    /// Rebuild this node with every direct child replaced by `f(child)`.
    ///
    /// Query roots are leaves: the expression behind a composed queryable
    /// is only reached by inlining.
    pub fn try_map_children<E, F>(self, f: &mut F) -> Result<Expr, E>
    where
        F: FnMut(Expr) -> Result<Expr, E>,
    {
        let rebuilt = match self {
            Expr::Constant(_) | Expr::Parameter(_) => self,
            Expr::Member { target, name, ty } => Expr::Member {
                target: boxed(target, f)?,
                name,
                ty,
            },
            Expr::Call {
                method,
                target,
                args,
                ty,
            } => {
                let target = match target {
                    Some(target) => Some(boxed(target, f)?),
                    None => None,
                };
                let args = args.into_iter().map(&mut *f).collect::<Result<_, E>>()?;
                Expr::Call {
                    method,
                    target,
                    args,
                    ty,
                }
            }
            Expr::Conditional {
                test,
                if_true,
                if_false,
            } => Expr::Conditional {
                test: boxed(test, f)?,
                if_true: boxed(if_true, f)?,
                if_false: boxed(if_false, f)?,
            },
            Expr::Lambda(Lambda { params, body }) => Expr::Lambda(Lambda {
                params,
                body: boxed(body, f)?,
            }),
            Expr::Binary { op, left, right } => Expr::Binary {
                op,
                left: boxed(left, f)?,
                right: boxed(right, f)?,
            },
            Expr::Unary { op, operand } => Expr::Unary {
                op,
                operand: boxed(operand, f)?,
            },
            Expr::New { members } => Expr::New {
                members: members
                    .into_iter()
                    .map(|(name, value)| Ok((name, f(value)?)))
                    .collect::<Result<_, E>>()?,
            },
            Expr::In { item, set } => Expr::In {
                item: boxed(item, f)?,
                set: boxed(set, f)?,
            },
            Expr::Include {
                entity,
                member,
                value,
            } => Expr::Include {
                entity: boxed(entity, f)?,
                member,
                value: boxed(value, f)?,
            },
        };
        Ok(rebuilt)
    }

    /// Infallible form of [`Expr::try_map_children`].
    pub fn map_children(self, mut f: impl FnMut(Expr) -> Expr) -> Expr {
        let result: Result<Expr, Infallible> = self.try_map_children(&mut |child| Ok(f(child)));
        match result {
            Ok(expr) => expr,
            Err(never) => match never {},
        }
    }

    /// Rewrite bottom-up: children first, then `f` on the rebuilt node.
    pub fn transform_up(self, f: &mut impl FnMut(Expr) -> Expr) -> Expr {
        let node = self.map_children(|child| child.transform_up(f));
        f(node)
    }

    /// Fallible form of [`Expr::transform_up`].
    pub fn try_transform_up<E>(
        self,
        f: &mut impl FnMut(Expr) -> Result<Expr, E>,
    ) -> Result<Expr, E> {
        let node = self.try_map_children(&mut |child| child.try_transform_up(f))?;
        f(node)
    }

    /// Direct children, in evaluation order.
    pub fn children(&self) -> Vec<&Expr> {
        match self {
            Expr::Constant(_) | Expr::Parameter(_) => Vec::new(),
            Expr::Member { target, .. } => vec![target],
            Expr::Call { target, args, .. } => {
                target.iter().map(|t| t.as_ref()).chain(args.iter()).collect()
            }
            Expr::Conditional {
                test,
                if_true,
                if_false,
            } => vec![test, if_true, if_false],
            Expr::Lambda(lambda) => vec![&lambda.body],
            Expr::Binary { left, right, .. } => vec![left, right],
            Expr::Unary { operand, .. } => vec![operand],
            Expr::New { members } => members.iter().map(|(_, value)| value).collect(),
            Expr::In { item, set } => vec![item, set],
            Expr::Include { entity, value, .. } => vec![entity, value],
        }
    }

    /// Check if any node in the tree (including this one) satisfies `pred`.
    pub fn any(&self, pred: &impl Fn(&Expr) -> bool) -> bool {
        pred(self) || self.children().into_iter().any(|child| child.any(pred))
    }

    /// Number of nodes in the tree.
    pub fn node_count(&self) -> usize {
        1 + self
            .children()
            .into_iter()
            .map(Expr::node_count)
            .sum::<usize>()
    }

    /// Check if the tree references the lambda parameter `name` freely.
    pub fn references_parameter(&self, name: &str) -> bool {
        match self {
            Expr::Parameter(p) => p.slot.is_none() && p.name == name,
            Expr::Lambda(lambda) if lambda.params.iter().any(|p| p.name == name) => false,
            _ => self
                .children()
                .into_iter()
                .any(|child| child.references_parameter(name)),
        }
    }

    /// Replace free references to the lambda parameter `name` with
    /// `replacement`. Lambdas rebinding `name` shadow it.
    pub fn substitute(self, name: &str, replacement: &Expr) -> Expr {
        match self {
            Expr::Parameter(ref p) if p.slot.is_none() && p.name == name => replacement.clone(),
            Expr::Lambda(ref lambda) if lambda.params.iter().any(|p| p.name == name) => self,
            other => other.map_children(|child| child.substitute(name, replacement)),
        }
    }
}

impl Lambda {
    /// Beta-reduce: the body with each parameter replaced by its argument.
    ///
    /// Extra parameters without an argument are left unbound.
    pub fn apply(&self, args: &[Expr]) -> Expr {
        self.params
            .iter()
            .zip(args)
            .fold((*self.body).clone(), |body, (param, arg)| {
                body.substitute(&param.name, arg)
            })
    }

    /// `self ∘ inner`: a lambda taking `inner`'s parameters whose body is
    /// `self` applied to `inner`'s body.
    pub fn compose(&self, inner: &Lambda) -> Lambda {
        Lambda {
            params: inner.params.clone(),
            body: Box::new(self.apply(std::slice::from_ref(&*inner.body))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Parameter;
    use crate::types::Type;

    fn user_param(name: &str) -> Parameter {
        Parameter::new(name, Type::entity("User"))
    }

    #[test]
    fn test_map_children_rebuilds_node() {
        let expr = Expr::literal(1i32).add(Expr::literal(2i32));
        let doubled = expr.map_children(|child| match child.as_literal() {
            Some(v) => Expr::literal(v.as_i32().unwrap_or_default() * 10),
            None => child,
        });
        assert_eq!(doubled, Expr::literal(10i32).add(Expr::literal(20i32)));
    }

    #[test]
    fn test_substitute_respects_shadowing() {
        let x = user_param("x");
        let inner = Expr::lambda(vec![x.clone()], x.to_expr().member("id"));
        let outer_body = x.to_expr().member("name").eq(Expr::literal("a")).and(
            Expr::query_call(
                crate::method::QueryMethod::Any,
                vec![Expr::entity_set("User"), inner.clone()],
            ),
        );

        let replaced = outer_body.substitute("x", &Expr::param("y", Type::entity("User")));
        assert!(replaced.references_parameter("y"));
        assert!(!replaced.references_parameter("x"));
        // The inner lambda keeps its own binding.
        assert!(replaced.any(&|e| *e == inner));
    }

    #[test]
    fn test_lambda_compose() {
        let a = user_param("a");
        let f = Lambda::new(vec![a.clone()], a.to_expr().member("address"));
        let b = Parameter::new("b", Type::Unknown);
        let g = Lambda::new(vec![b.clone()], b.to_expr().member("city"));

        let composed = g.compose(&f);
        assert_eq!(composed.params, vec![a.clone()]);
        assert_eq!(
            *composed.body,
            a.to_expr().member("address").member("city")
        );
    }

    #[test]
    fn test_node_count() {
        let expr = Expr::literal(1i32).add(Expr::literal(2i32)).not();
        assert_eq!(expr.node_count(), 4);
    }
}
