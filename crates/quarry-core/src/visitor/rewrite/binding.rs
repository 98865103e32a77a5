//! Member and parameter type binding.
//!
//! Trees built by hand or decoded from JSON leave member types as
//! [`Type::Unknown`]. Binding resolves them from the descriptor set once,
//! so later passes can dispatch on types instead of probing entities at
//! runtime.

use quarry_expr::{DatePart, Expr, Lambda, Method, QueryMethod, ScalarType, Type};

use crate::context::QueryProcessingContext;
use crate::descriptor::DescriptorSet;
use crate::error::{Error, Result};
use crate::visitor::ExpressionVisitor;

/// Resolves member, lambda parameter and call types.
#[derive(Debug, Clone, Copy, Default)]
pub struct MemberBindingVisitor;

impl ExpressionVisitor for MemberBindingVisitor {
    fn name(&self) -> &'static str {
        "member_binding"
    }

    fn visit(&self, expr: Expr, context: &mut QueryProcessingContext) -> Result<Expr> {
        bind_expr(expr, context.descriptors())
    }
}

/// Bind every type in `expr` against `descriptors`.
pub(crate) fn bind_expr(expr: Expr, descriptors: &DescriptorSet) -> Result<Expr> {
    Binder {
        descriptors,
        scope: Vec::new(),
    }
    .bind(expr)
}

/// Bind the lambdas stored in a freshly built descriptor set.
pub(crate) fn bind_descriptor_set(set: DescriptorSet) -> Result<DescriptorSet> {
    let lookup = set.clone();
    set.try_map_expressions(&mut |expr| bind_expr(expr, &lookup))
}

struct Binder<'a> {
    descriptors: &'a DescriptorSet,
    scope: Vec<(String, Type)>,
}

impl Binder<'_> {
    fn lookup(&self, name: &str) -> Option<&Type> {
        self.scope
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, ty)| ty)
    }

    fn bind(&mut self, expr: Expr) -> Result<Expr> {
        match expr {
            Expr::Parameter(mut p) if p.slot.is_none() => {
                if let Some(ty) = self.lookup(&p.name) {
                    if *ty != Type::Unknown {
                        p.ty = ty.clone();
                    }
                }
                Ok(Expr::Parameter(p))
            }
            Expr::Member { target, name, ty } => {
                let target = self.bind(*target)?;
                let ty = self.member_type(&target.ty(), &name, ty)?;
                Ok(Expr::Member {
                    target: Box::new(target),
                    name,
                    ty,
                })
            }
            Expr::Call {
                method: Method::Query(method),
                target: None,
                args,
                ..
            } => self.query_call(method, args),
            Expr::Call {
                method,
                target,
                args,
                ty,
            } => {
                let target = match target {
                    Some(target) => Some(Box::new(self.bind(*target)?)),
                    None => None,
                };
                let args = args
                    .into_iter()
                    .map(|arg| self.bind(arg))
                    .collect::<Result<Vec<_>>>()?;
                let ty = match ty {
                    Type::Unknown => method_type(&method, target.as_deref(), &args),
                    ty => ty,
                };
                Ok(Expr::Call {
                    method,
                    target,
                    args,
                    ty,
                })
            }
            Expr::Lambda(lambda) => {
                let types: Vec<Type> = lambda.params.iter().map(|p| p.ty.clone()).collect();
                Ok(Expr::Lambda(self.lambda(lambda, &types)?))
            }
            other => other.try_map_children(&mut |child| self.bind(child)),
        }
    }

    fn lambda(&mut self, mut lambda: Lambda, types: &[Type]) -> Result<Lambda> {
        for (param, ty) in lambda.params.iter_mut().zip(types) {
            if *ty != Type::Unknown {
                param.ty = ty.clone();
            }
        }
        let depth = self.scope.len();
        self.scope.extend(
            lambda
                .params
                .iter()
                .map(|p| (p.name.clone(), p.ty.clone())),
        );
        let body = self.bind(*lambda.body);
        self.scope.truncate(depth);
        Ok(Lambda::new(lambda.params, body?))
    }

    fn argument(&mut self, arg: Expr, types: &[Type]) -> Result<Expr> {
        match arg {
            Expr::Lambda(lambda) => Ok(Expr::Lambda(self.lambda(lambda, types)?)),
            other => self.bind(other),
        }
    }

    fn query_call(&mut self, method: QueryMethod, args: Vec<Expr>) -> Result<Expr> {
        let mut args = args.into_iter();
        let Some(source) = args.next() else {
            return Ok(Expr::query_call(method, Vec::new()));
        };
        let source = self.bind(source)?;
        let element = source.ty().element().cloned().unwrap_or(Type::Unknown);
        let mut bound = vec![source];

        match method {
            QueryMethod::Join | QueryMethod::LeftJoin => {
                let inner = match args.next() {
                    Some(inner) => self.bind(inner)?,
                    None => return Ok(Expr::query_call(method, bound)),
                };
                let inner_element = inner.ty().element().cloned().unwrap_or(Type::Unknown);
                bound.push(inner);
                for (index, arg) in args.enumerate() {
                    let types = match index {
                        0 => vec![element.clone()],
                        1 => vec![inner_element.clone()],
                        _ => vec![element.clone(), inner_element.clone()],
                    };
                    bound.push(self.argument(arg, &types)?);
                }
            }
            _ => {
                for arg in args {
                    bound.push(self.argument(arg, std::slice::from_ref(&element))?);
                }
            }
        }
        Ok(Expr::query_call(method, bound))
    }

    fn member_type(&self, target: &Type, name: &str, declared: Type) -> Result<Type> {
        match target {
            Type::Entity(entity) => self.descriptors.member_type(entity, name),
            Type::Record(fields) => fields
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, ty)| ty.clone())
                .ok_or_else(|| Error::UnknownMember {
                    entity: "record".to_string(),
                    member: name.to_string(),
                }),
            Type::Scalar(scalar) | Type::Nullable(scalar) => {
                scalar_member_type(target, *scalar, name, declared)
            }
            Type::Sequence(_) | Type::Unknown => Ok(declared),
        }
    }
}

fn scalar_member_type(target: &Type, scalar: ScalarType, name: &str, declared: Type) -> Result<Type> {
    let int32 = if target.is_nullable() {
        Type::Nullable(ScalarType::Int32)
    } else {
        Type::int32()
    };
    match name {
        "HasValue" => Ok(Type::bool()),
        "Value" => Ok(Type::Scalar(scalar)),
        "Length" if scalar == ScalarType::String => Ok(int32),
        part if scalar == ScalarType::Timestamp && DatePart::from_member(part).is_some() => {
            Ok(int32)
        }
        _ if declared != Type::Unknown => Ok(declared),
        _ => Err(Error::UnknownMember {
            entity: scalar.name().to_string(),
            member: name.to_string(),
        }),
    }
}

fn method_type(method: &Method, target: Option<&Expr>, args: &[Expr]) -> Type {
    let receiver = target.or(args.first()).map(Expr::ty).unwrap_or(Type::Unknown);
    match method {
        Method::Contains | Method::StringContains | Method::StartsWith | Method::EndsWith => {
            Type::bool()
        }
        Method::ToUpper | Method::ToLower | Method::Trim => receiver,
        Method::StringLength | Method::DatePart(_) => {
            if receiver.is_nullable() {
                Type::Nullable(ScalarType::Int32)
            } else {
                Type::int32()
            }
        }
        Method::GetValueOrDefault => receiver.unwrap_nullable(),
        Method::Query(_) | Method::Custom(_) => Type::Unknown,
    }
}
