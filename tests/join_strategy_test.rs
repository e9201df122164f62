//! Join strategy selection and result equivalence through the DataFrame API

use arrow::array::{Array, Float64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use broadcast_join::execution::{broadcast, DataFrame, ExecutionContext, SessionConfig};
use broadcast_join::planner::{col, round, JoinType};
use std::sync::Arc;

fn sales_batch(rows: &[(&str, Option<&str>, f64)]) -> RecordBatch {
    let schema = Arc::new(Schema::new(vec![
        Field::new("sale_id", DataType::Utf8, false),
        Field::new("country_code", DataType::Utf8, true),
        Field::new("amount", DataType::Float64, false),
    ]));
    RecordBatch::try_new(
        schema,
        vec![
            Arc::new(StringArray::from(rows.iter().map(|r| r.0).collect::<Vec<_>>())),
            Arc::new(StringArray::from(rows.iter().map(|r| r.1).collect::<Vec<_>>())),
            Arc::new(Float64Array::from(rows.iter().map(|r| r.2).collect::<Vec<_>>())),
        ],
    )
    .unwrap()
}

fn countries_batch(rows: &[(&str, &str, Option<&str>)]) -> RecordBatch {
    let schema = Arc::new(Schema::new(vec![
        Field::new("country_code", DataType::Utf8, false),
        Field::new("country_name", DataType::Utf8, false),
        Field::new("region", DataType::Utf8, true),
    ]));
    RecordBatch::try_new(
        schema,
        vec![
            Arc::new(StringArray::from(rows.iter().map(|r| r.0).collect::<Vec<_>>())),
            Arc::new(StringArray::from(rows.iter().map(|r| r.1).collect::<Vec<_>>())),
            Arc::new(StringArray::from(rows.iter().map(|r| r.2).collect::<Vec<_>>())),
        ],
    )
    .unwrap()
}

/// 2,000 sales over 60 codes (50 known), every 7th with a null code
fn synthetic(ctx: &ExecutionContext) {
    let codes: Vec<String> = (0..60)
        .map(|i| format!("{}{}", (b'A' + i / 26) as char, (b'A' + i % 26) as char))
        .collect();
    let ids: Vec<String> = (0..2000).map(|i| i.to_string()).collect();
    let sales: Vec<(&str, Option<&str>, f64)> = ids
        .iter()
        .enumerate()
        .map(|(i, id)| {
            let code = (i % 7 != 0).then(|| codes[i % codes.len()].as_str());
            (id.as_str(), code, i as f64 * 1.005)
        })
        .collect();
    ctx.register_batch("sales", sales_batch(&sales));

    let names: Vec<String> = codes[..50].iter().map(|c| format!("Country {}", c)).collect();
    let countries: Vec<(&str, &str, Option<&str>)> = codes[..50]
        .iter()
        .zip(&names)
        .enumerate()
        .map(|(i, (c, n))| (c.as_str(), n.as_str(), (i % 5 != 0).then_some("Region")))
        .collect();
    ctx.register_batch("countries", countries_batch(&countries));
}

fn enrich(ctx: &ExecutionContext, hint: bool) -> DataFrame {
    let sales = ctx.table("sales").unwrap();
    let countries = ctx.table("countries").unwrap();
    let countries = if hint { broadcast(&countries) } else { countries };
    sales
        .join(&countries, &["country_code"], JoinType::Left)
        .unwrap()
        .select(vec![
            col("sale_id"),
            round(col("amount"), 2).alias("amount"),
            col("country_name"),
            col("region"),
        ])
        .unwrap()
}

type Row = (String, f64, Option<String>, Option<String>);

async fn sorted_rows(df: &DataFrame) -> Vec<Row> {
    let mut rows = Vec::new();
    for batch in df.collect().await.unwrap() {
        let ids = batch.column(0).as_any().downcast_ref::<StringArray>().unwrap();
        let amounts = batch.column(1).as_any().downcast_ref::<Float64Array>().unwrap();
        let names = batch.column(2).as_any().downcast_ref::<StringArray>().unwrap();
        let regions = batch.column(3).as_any().downcast_ref::<StringArray>().unwrap();
        for i in 0..batch.num_rows() {
            let opt = |a: &StringArray| (!a.is_null(i)).then(|| a.value(i).to_string());
            rows.push((ids.value(i).to_string(), amounts.value(i), opt(names), opt(regions)));
        }
    }
    rows.sort_by(|a, b| a.0.cmp(&b.0));
    rows
}

#[tokio::test]
async fn test_broadcast_and_shuffle_agree() {
    let broadcast_ctx = ExecutionContext::with_config(
        SessionConfig::new()
            .with_target_partitions(4)
            .with_batch_size(128),
    );
    synthetic(&broadcast_ctx);
    let broadcast_df = enrich(&broadcast_ctx, true);
    assert!(broadcast_df.explain().unwrap().contains("BroadcastHashJoin"));

    let shuffle_ctx = ExecutionContext::with_config(
        SessionConfig::new()
            .with_target_partitions(4)
            .with_batch_size(128)
            .with_broadcast_threshold(0),
    );
    synthetic(&shuffle_ctx);
    let shuffle_df = enrich(&shuffle_ctx, false);
    let plan = shuffle_df.explain().unwrap();
    assert!(plan.contains("ShuffledHashJoin"), "{}", plan);
    assert_eq!(plan.matches("Exchange hashpartitioning(country_code, 4)").count(), 2);

    let expected = sorted_rows(&broadcast_df).await;
    assert_eq!(expected.len(), 2000);
    assert_eq!(sorted_rows(&shuffle_df).await, expected);

    let unmatched = expected.iter().filter(|r| r.2.is_none()).count();
    // null codes plus the 10 unknown codes
    let null_codes = (0..2000).filter(|i| i % 7 == 0).count();
    let unknown = (0..2000).filter(|i| i % 7 != 0 && i % 60 >= 50).count();
    assert_eq!(unmatched, null_codes + unknown);
}

#[tokio::test]
async fn test_small_dimension_broadcast_without_hint() {
    let ctx = ExecutionContext::new();
    synthetic(&ctx);
    let plan = enrich(&ctx, false).explain().unwrap();
    assert!(plan.contains("BroadcastHashJoin"), "{}", plan);
}

#[tokio::test]
async fn test_us_scenario() {
    let ctx = ExecutionContext::new();
    ctx.register_batch("sales", sales_batch(&[("1", Some("US"), 12.345)]));
    ctx.register_batch(
        "countries",
        countries_batch(&[("US", "United States", Some("Americas"))]),
    );

    let rows = sorted_rows(&enrich(&ctx, true)).await;
    assert_eq!(
        rows,
        vec![(
            "1".to_string(),
            12.35,
            Some("United States".to_string()),
            Some("Americas".to_string())
        )]
    );
}

#[tokio::test]
async fn test_missing_country_keeps_row() {
    let ctx = ExecutionContext::new();
    ctx.register_batch("sales", sales_batch(&[("1", Some("ZZ"), 3.0)]));
    ctx.register_batch(
        "countries",
        countries_batch(&[("US", "United States", Some("Americas"))]),
    );

    let rows = sorted_rows(&enrich(&ctx, true)).await;
    assert_eq!(rows, vec![("1".to_string(), 3.0, None, None)]);
}

#[tokio::test]
async fn test_inner_join_drops_unmatched() {
    let ctx = ExecutionContext::with_config(SessionConfig::new().with_target_partitions(2));
    synthetic(&ctx);
    let sales = ctx.table("sales").unwrap();
    let countries = broadcast(&ctx.table("countries").unwrap());

    let inner = sales
        .join(&countries, &["country_code"], JoinType::Inner)
        .unwrap();
    let matched = (0..2000).filter(|i| i % 7 != 0 && i % 60 < 50).count();
    assert_eq!(inner.count().await.unwrap(), matched);

    let schema = inner.schema();
    assert_eq!(
        schema.column_names(),
        vec!["sale_id", "country_code", "amount", "country_name", "region"]
    );
}
