//! Broadcast vs shuffled hash join benchmarks

use arrow::array::{Float64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use broadcast_join::execution::{broadcast, ExecutionContext, SessionConfig};
use broadcast_join::planner::{col, JoinType};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;

const COUNTRIES: usize = 250;

fn code(i: usize) -> String {
    format!(
        "{}{}",
        (b'A' + (i / 26 % 26) as u8) as char,
        (b'A' + (i % 26) as u8) as char
    )
}

fn create_context(sales: usize, broadcast_threshold: u64) -> ExecutionContext {
    let ctx = ExecutionContext::with_config(
        SessionConfig::new()
            .with_target_partitions(8)
            .with_broadcast_threshold(broadcast_threshold),
    );

    let schema = Arc::new(Schema::new(vec![
        Field::new("sale_id", DataType::Utf8, false),
        Field::new("country_code", DataType::Utf8, true),
        Field::new("amount", DataType::Float64, false),
    ]));
    let batch = RecordBatch::try_new(
        schema,
        vec![
            Arc::new(StringArray::from_iter_values((0..sales).map(|i| i.to_string()))),
            Arc::new(StringArray::from_iter_values(
                (0..sales).map(|i| code(i % (COUNTRIES + 20))),
            )),
            Arc::new(Float64Array::from_iter_values(
                (0..sales).map(|i| (i % 1000) as f64 * 0.37),
            )),
        ],
    )
    .unwrap();
    ctx.register_batch("sales", batch);

    let schema = Arc::new(Schema::new(vec![
        Field::new("country_code", DataType::Utf8, false),
        Field::new("country_name", DataType::Utf8, false),
        Field::new("region", DataType::Utf8, true),
    ]));
    let batch = RecordBatch::try_new(
        schema,
        vec![
            Arc::new(StringArray::from_iter_values((0..COUNTRIES).map(code))),
            Arc::new(StringArray::from_iter_values(
                (0..COUNTRIES).map(|i| format!("Country {}", i)),
            )),
            Arc::new(StringArray::from_iter_values(
                (0..COUNTRIES).map(|i| format!("Region {}", i % 5)),
            )),
        ],
    )
    .unwrap();
    ctx.register_batch("countries", batch);
    ctx
}

fn benchmark_join_strategies(c: &mut Criterion) {
    let mut group = c.benchmark_group("enrichment_join");
    group.sample_size(10);

    for sales in [10_000, 100_000] {
        for (strategy, hint, threshold) in [("broadcast", true, 0), ("shuffle", false, 0)] {
            let ctx = create_context(sales, threshold);
            let countries = ctx.table("countries").unwrap();
            let countries = if hint { broadcast(&countries) } else { countries };
            let df = ctx
                .table("sales")
                .unwrap()
                .join(&countries, &["country_code"], JoinType::Left)
                .unwrap()
                .select(vec![
                    col("sale_id"),
                    col("amount"),
                    col("country_name"),
                    col("region"),
                ])
                .unwrap();

            group.bench_with_input(BenchmarkId::new(strategy, sales), &df, |b, df| {
                let rt = tokio::runtime::Runtime::new().unwrap();
                b.iter(|| {
                    rt.block_on(async {
                        let rows = df.count().await.unwrap();
                        black_box(rows)
                    })
                });
            });
        }
    }

    group.finish();
}

criterion_group!(benches, benchmark_join_strategies);
criterion_main!(benches);
