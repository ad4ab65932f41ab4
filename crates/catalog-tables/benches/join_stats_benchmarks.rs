//! Benchmarks for join statistics
//!
//! Run with: cargo bench -p tessera-catalog-tables

use chrono::{Duration, NaiveDate};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tessera_catalog_core::daily_count::{self, aggregate_and_filter, sum_in_window};
use tessera_catalog_core::{
    CatalogEntity, Column, ColumnDataType, ColumnJoin, DailyCount, DatabaseSchema,
    DatabaseService, JoinedWith, Table, TableJoins,
};
use tessera_catalog_storage::{CatalogBackend, LocalSqliteBackend};
use tessera_catalog_tables::{joins, RepositoryConfig, TableRepository};
use tempfile::TempDir;

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 30).unwrap()
}

/// A full window of daily counts ending today.
fn full_series() -> Vec<DailyCount> {
    (0..=daily_count::WINDOW_DAYS)
        .rev()
        .map(|days| DailyCount::new(daily_count::format_date(today() - Duration::days(days)), days))
        .collect()
}

fn bench_aggregate_and_filter(c: &mut Criterion) {
    let current = full_series();
    let received = DailyCount::new(daily_count::format_date(today()), 42);

    c.bench_function("aggregate_and_filter_full_window", |b| {
        b.iter(|| aggregate_and_filter(black_box(&current), black_box(&received), today()))
    });

    c.bench_function("sum_in_window_full_window", |b| {
        b.iter(|| sum_in_window(black_box(&current), today()))
    });
}

/// Catalog with one fact table joined to `dimensions` dimension tables.
fn create_bench_catalog(dimensions: usize) -> (TempDir, TableRepository, Table) {
    let temp_dir = TempDir::new().unwrap();
    let backend = LocalSqliteBackend::new(temp_dir.path().join("bench_catalog.db"));
    backend.initialize().unwrap();

    let config = RepositoryConfig::builder().today(today()).build().unwrap();
    let mut repo = TableRepository::open(&backend, config).unwrap();
    let service = repo
        .register_service(DatabaseService::new("svc", "Postgres"), None)
        .unwrap();
    let database = repo.register_database("db", service.id, None).unwrap();
    let schema = repo.register_schema("public", database.id, None).unwrap();

    let fact_columns = (0..dimensions).map(|i| format!("dim_{}_id", i)).collect::<Vec<_>>();
    let fact = repo
        .create_table(bench_table(&schema, "fact", &fact_columns), None)
        .unwrap();
    for i in 0..dimensions {
        repo.create_table(bench_table(&schema, &format!("dim_{}", i), &["id".to_string()]), None)
            .unwrap();
    }

    for days in 0..7 {
        let joins = TableJoins {
            start_date: daily_count::format_date(today() - Duration::days(days)),
            day_count: 1,
            column_joins: (0..dimensions)
                .map(|i| ColumnJoin {
                    column_name: format!("dim_{}_id", i),
                    joined_with: vec![JoinedWith::new(format!("svc.db.public.dim_{}.id", i), 3)],
                })
                .collect(),
            direct_table_joins: (0..dimensions)
                .map(|i| JoinedWith::new(format!("svc.db.public.dim_{}", i), 3))
                .collect(),
        };
        repo.add_joins(fact.id, &joins).unwrap();
    }

    (temp_dir, repo, fact)
}

fn bench_table(schema: &DatabaseSchema, name: &str, columns: &[String]) -> Table {
    let columns = columns
        .iter()
        .map(|c| Column::new(c.as_str(), ColumnDataType::Bigint))
        .collect();
    Table::new(name, schema.entity_reference()).with_columns(columns)
}

fn bench_get_joins(c: &mut Criterion) {
    let mut group = c.benchmark_group("get_joins");
    for dimensions in [4, 16, 64] {
        let (_temp_dir, repo, fact) = create_bench_catalog(dimensions);
        group.bench_with_input(
            BenchmarkId::from_parameter(dimensions),
            &dimensions,
            |b, _| {
                b.iter(|| {
                    joins::get_joins(repo.connection(), black_box(fact.fqn()), today()).unwrap()
                })
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_aggregate_and_filter, bench_get_joins);
criterion_main!(benches);
