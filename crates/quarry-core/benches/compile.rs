//! Plan compilation and cache lookup benchmarks.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use quarry_core::catalog::{EntityDef, FieldDef, Model, RelationDef};
use quarry_core::expr::{Expr, Query, ScalarType};
use quarry_core::{CompilerConfig, ModelProvider, QueryExecutor, QueryOptions};

fn model() -> Model {
    Model::new("bench")
        .with_entity(
            EntityDef::new("User", "id")
                .with_table("users")
                .with_field(FieldDef::new("id", ScalarType::Int64))
                .with_field(FieldDef::new("name", ScalarType::String))
                .with_soft_delete(),
        )
        .with_entity(
            EntityDef::new("Post", "id")
                .with_table("posts")
                .with_field(FieldDef::new("id", ScalarType::Int64))
                .with_field(FieldDef::optional("author_id", ScalarType::Int64))
                .with_field(FieldDef::new("title", ScalarType::String))
                .with_field(FieldDef::new("views", ScalarType::Int32)),
        )
        .with_relation(
            RelationDef::one_to_many("post_author", "Post", "author_id", "User", "id")
                .with_navigation("author")
                .with_inverse("posts"),
        )
}

fn executor(plan_cache: bool) -> QueryExecutor {
    QueryExecutor::with_config(
        Arc::new(ModelProvider::new(model()).unwrap()),
        CompilerConfig::new().with_plan_cache(plan_cache),
    )
}

fn simple(id: i64) -> Expr {
    Query::from("Post")
        .filter(|p| p.member("id").eq(Expr::captured(id)))
        .into_expr()
}

fn navigation(name: &str) -> Expr {
    Query::from("Post")
        .filter(|p| p.member("author").member("name").eq(Expr::captured(name)))
        .order_by(|p| p.member("views"))
        .take(Expr::literal(10i32))
        .select(|p| p.member("title"))
        .into_expr()
}

fn bench_prepare(c: &mut Criterion) {
    let mut group = c.benchmark_group("prepare");

    for cached in [false, true] {
        let label = if cached { "cached" } else { "uncached" };

        group.bench_with_input(BenchmarkId::new("simple", label), &cached, |b, &cached| {
            let executor = executor(cached);
            let mut id = 0i64;
            b.iter(|| {
                id += 1;
                black_box(executor.prepare(simple(id), QueryOptions::default()).unwrap());
            });
        });

        group.bench_with_input(BenchmarkId::new("navigation", label), &cached, |b, &cached| {
            let executor = executor(cached);
            b.iter(|| {
                black_box(
                    executor
                        .prepare(navigation("ann"), QueryOptions::default())
                        .unwrap(),
                );
            });
        });
    }

    group.finish();
}

fn bench_hash(c: &mut Criterion) {
    let expr = navigation("ann");
    c.bench_function("structural_hash/navigation", |b| {
        b.iter(|| black_box(quarry_core::visitor::structural_hash(&expr)));
    });
}

criterion_group!(benches, bench_prepare, bench_hash);
criterion_main!(benches);
