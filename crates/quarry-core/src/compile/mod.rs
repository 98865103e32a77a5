//! Plan compilation.
//!
//! The compiler takes the tree the visitor pipeline produced and turns it
//! into a [`CompiledQuery`]: the statement, its rendered command template,
//! the result shape and the materializer that reads the rows back.

mod materializer;
mod projection;
mod shape;
mod translate;

use tracing::{debug, instrument};

use quarry_expr::Expr;

use crate::config::Flavor;
use crate::context::QueryProcessingContext;
use crate::error::Result;
use crate::sql::{CommandTemplate, SelectStatement, Serializer};

pub use materializer::{
    EntityMaterializer, GroupingMaterializer, MaterializeContext, Materializer,
};
pub use shape::{ResultShape, SingleKind};

use materializer::MaterializerBuilder;
use translate::{Translation, Translator};

/// How a plan's rows become its result.
#[derive(Debug, Clone)]
pub enum ResultMaterializer {
    /// Each row on its own.
    Rows(Materializer),
    /// Adjacent rows grouped per parent entity.
    Grouped(GroupingMaterializer),
}

/// A cached, reusable plan.
///
/// Holds nothing tied to a particular execution: parameter values and the
/// identity resolver are supplied per call.
#[derive(Debug, Clone)]
pub struct CompiledQuery {
    pub statement: SelectStatement,
    pub command: CommandTemplate,
    pub shape: ResultShape,
    pub materializer: ResultMaterializer,
}

/// Compiles optimized expression trees into plans.
#[derive(Debug, Clone)]
pub struct Compiler {
    serializer: Serializer,
}

impl Compiler {
    pub fn new(flavor: Flavor) -> Self {
        Self {
            serializer: Serializer::new(flavor),
        }
    }

    pub fn flavor(&self) -> Flavor {
        self.serializer.flavor()
    }

    /// Compile a composed and optimized query.
    #[instrument(level = "debug", skip_all, fields(flavor = ?self.flavor()))]
    pub fn compile(&self, expr: &Expr, context: &QueryProcessingContext) -> Result<CompiledQuery> {
        let descriptors = context.descriptors();
        let translation = Translator::new(descriptors).translate(expr)?;
        let mut builder = MaterializerBuilder::new(descriptors);

        let (mut statement, shape, materializer) = match translation {
            Translation::Rows {
                statement,
                element,
                kind,
            } => {
                let materializer = builder.build(element)?;
                let shape = match kind {
                    Some(kind) => ResultShape::Single(kind),
                    None => ResultShape::Sequence,
                };
                (statement, shape, ResultMaterializer::Rows(materializer))
            }
            Translation::Scalar { statement, ty } => {
                // the value is already the statement's only column
                let materializer = Materializer::Column {
                    index: 0,
                    ty: ty.clone(),
                };
                return Ok(self.finish(statement, ResultShape::Scalar(ty), ResultMaterializer::Rows(materializer)));
            }
            Translation::Grouped {
                statement,
                parent,
                collections,
                kind,
            } => {
                let grouping = builder.grouping(parent, collections)?;
                (
                    statement,
                    ResultShape::Complex(kind),
                    ResultMaterializer::Grouped(grouping),
                )
            }
        };
        statement.projection = builder.finish();
        Ok(self.finish(statement, shape, materializer))
    }

    fn finish(
        &self,
        statement: SelectStatement,
        shape: ResultShape,
        materializer: ResultMaterializer,
    ) -> CompiledQuery {
        let command = self.serializer.serialize(&statement);
        debug!(%shape, slots = command.slots().len(), "compiled plan");
        CompiledQuery {
            statement,
            command,
            shape,
            materializer,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QueryOptions;
    use crate::error::Error;
    use crate::testing::blog_context;
    use crate::visitor::VisitorPipeline;
    use quarry_expr::{Method, Query, ScalarType, Type, Value};

    fn compile(query: Expr, options: QueryOptions) -> Result<CompiledQuery> {
        let mut context = blog_context(options);
        let pipeline = VisitorPipeline::new();
        let expr = pipeline.rewrite(query, &mut context)?;
        let expr = pipeline.compose(expr, &mut context)?;
        Compiler::new(Flavor::Sqlite).compile(&expr, &context)
    }

    fn sql(query: Expr) -> String {
        compile(query, QueryOptions::default().with_ignore_filters(true))
            .unwrap()
            .command
            .display_text()
    }

    #[test]
    fn test_filter_and_projection() {
        let query = Query::from("Post")
            .filter(|p| p.member("views").gt(Expr::literal(10i32)))
            .select(|p| p.member("title"))
            .into_expr();
        assert_eq!(
            sql(query),
            r#"SELECT "t0"."title" FROM "posts" AS "t0" WHERE ("t0"."views" > 10)"#
        );
    }

    #[test]
    fn test_bare_entity_set_reads_every_row() {
        let plan = compile(Query::from("Post").into_expr(), QueryOptions::default()).unwrap();
        assert_eq!(plan.shape, ResultShape::Sequence);
        let text = plan.command.display_text();
        assert!(text.starts_with(r#"SELECT "t0"."id""#), "{text}");
        assert!(text.ends_with(r#"FROM "posts" AS "t0""#), "{text}");

        let plan = compile(
            Query::from("User").into_expr(),
            QueryOptions::default().with_ignore_filters(true),
        )
        .unwrap();
        assert!(plan.command.display_text().ends_with(r#"FROM "users" AS "t0""#));
    }

    #[test]
    fn test_filter_after_take_uses_derived_table() {
        let query = Query::from("Post")
            .order_by(|p| p.member("views"))
            .take(Expr::literal(5i32))
            .filter(|p| p.member("views").gt(Expr::literal(1i32)))
            .select(|p| p.member("id"))
            .into_expr();
        let text = sql(query);
        assert!(text.contains("LIMIT 5) AS \"d0\""), "{text}");
        assert!(text.ends_with("ORDER BY \"d0\".\"c3\""), "{text}");
    }

    #[test]
    fn test_count_is_scalar() {
        let plan = compile(
            Query::from("User").count(),
            QueryOptions::default(),
        )
        .unwrap();
        assert_eq!(plan.shape, ResultShape::Scalar(Type::int32()));
        assert_eq!(
            plan.command.display_text(),
            r#"SELECT COUNT(*) FROM "users" AS "t0" WHERE NOT ("t0"."deleted")"#
        );
    }

    #[test]
    fn test_first_limits_rows() {
        let plan = compile(
            Query::from("Post").first(),
            QueryOptions::default(),
        )
        .unwrap();
        assert_eq!(plan.shape, ResultShape::Single(SingleKind::First));
        assert!(plan.command.display_text().ends_with("LIMIT 1"));

        let plan = compile(Query::from("Post").single(), QueryOptions::default()).unwrap();
        assert!(plan.command.display_text().ends_with("LIMIT 2"));
    }

    #[test]
    fn test_collection_include_is_grouped() {
        let plan = compile(
            Query::from("Post").include("comments").into_expr(),
            QueryOptions::default(),
        )
        .unwrap();
        assert_eq!(plan.shape, ResultShape::Complex(None));
        let text = plan.command.display_text();
        assert!(text.contains(r#"LEFT JOIN "comments" AS "t1""#), "{text}");
        assert!(text.ends_with(r#"ORDER BY "t0"."id", "t1"."id""#), "{text}");
    }

    #[test]
    fn test_opaque_method_is_untranslatable() {
        let query = Query::from("Post")
            .select(|p| {
                p.member("title")
                    .call(Method::Custom("Slugify".into()), vec![], Type::string())
            })
            .into_expr();
        let err = compile(query, QueryOptions::default()).unwrap_err();
        assert!(matches!(err, Error::Untranslatable(_)));
    }

    #[test]
    fn test_untranslatable_projection_part_runs_on_client() {
        let allowed = Expr::opaque(
            "allowed",
            ScalarType::String,
            vec![Value::String("a".into())],
        );
        let query = Query::from("Post")
            .select(|p| {
                allowed.call(Method::Contains, vec![p.member("title")], Type::bool())
            })
            .into_expr();
        let plan = compile(query, QueryOptions::default()).unwrap();
        let ResultMaterializer::Rows(Materializer::Client { inputs, .. }) = &plan.materializer else {
            panic!("expected a client projection, got {:?}", plan.materializer);
        };
        assert_eq!(inputs.len(), 1);
        assert_eq!(
            plan.command.display_text(),
            r#"SELECT "t0"."title" FROM "posts" AS "t0""#
        );
    }
}
