//! Expression evaluation against record batches

use crate::error::{BroadcastJoinError, Result};
use crate::planner::{Expr, ScalarValue};
use arrow::array::{
    new_null_array, Array, ArrayRef, BooleanArray, Float64Array, Int64Array, StringArray,
};
use arrow::datatypes::{DataType, Float64Type, Int64Type};
use arrow::record_batch::RecordBatch;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use std::str::FromStr;
use std::sync::Arc;

/// Evaluate an expression, producing one value per row of `batch`
pub fn evaluate_expr(batch: &RecordBatch, expr: &Expr) -> Result<ArrayRef> {
    match expr {
        Expr::Column(name) => {
            let idx = batch
                .schema()
                .index_of(name)
                .map_err(|_| BroadcastJoinError::ColumnNotFound(name.clone()))?;
            Ok(batch.column(idx).clone())
        }
        Expr::Literal(value) => Ok(scalar_to_array(value, batch.num_rows())),
        Expr::Alias { expr, .. } => evaluate_expr(batch, expr),
        Expr::Round { expr, decimals } => {
            let input = evaluate_expr(batch, expr)?;
            round_array(&input, *decimals)
        }
    }
}

fn scalar_to_array(value: &ScalarValue, len: usize) -> ArrayRef {
    match value {
        ScalarValue::Null => new_null_array(&DataType::Null, len),
        ScalarValue::Boolean(v) => Arc::new(BooleanArray::from(vec![*v; len])),
        ScalarValue::Int64(v) => Arc::new(Int64Array::from(vec![*v; len])),
        ScalarValue::Float64(v) => Arc::new(Float64Array::from(vec![v.0; len])),
        ScalarValue::Utf8(v) => Arc::new(StringArray::from(vec![v.as_str(); len])),
    }
}

fn round_array(input: &ArrayRef, decimals: i32) -> Result<ArrayRef> {
    match input.data_type() {
        DataType::Float64 => {
            let arr = input
                .as_any()
                .downcast_ref::<Float64Array>()
                .ok_or_else(|| BroadcastJoinError::Internal("expected Float64Array".into()))?;
            let rounded = arr.unary::<_, Float64Type>(|v| round_half_up(v, decimals));
            Ok(Arc::new(rounded))
        }
        DataType::Int64 => {
            let arr = input
                .as_any()
                .downcast_ref::<Int64Array>()
                .ok_or_else(|| BroadcastJoinError::Internal("expected Int64Array".into()))?;
            if decimals >= 0 {
                return Ok(input.clone());
            }
            let factor = 10_i64.checked_pow(decimals.unsigned_abs()).ok_or_else(|| {
                BroadcastJoinError::InvalidArgument(format!(
                    "round() scale {} out of range for Int64",
                    decimals
                ))
            })?;
            let rounded = arr.unary::<_, Int64Type>(|v| {
                let rem = v % factor;
                let base = v - rem;
                if rem.abs() * 2 >= factor {
                    base + factor * rem.signum()
                } else {
                    base
                }
            });
            Ok(Arc::new(rounded))
        }
        DataType::Null => Ok(input.clone()),
        other => Err(BroadcastJoinError::Execution(format!(
            "round() is not supported for {}",
            other
        ))),
    }
}

/// Round half away from zero on the shortest decimal representation of `value`,
/// so that 12.345 becomes 12.35 even though its binary value is slightly below.
pub fn round_half_up(value: f64, decimals: i32) -> f64 {
    if !value.is_finite() {
        return value;
    }
    if decimals < 0 {
        let factor = 10f64.powi(-decimals);
        return (value / factor).round() * factor;
    }

    Decimal::from_str(&value.to_string())
        .ok()
        .and_then(|d| {
            d.round_dp_with_strategy(decimals as u32, RoundingStrategy::MidpointAwayFromZero)
                .to_f64()
        })
        .unwrap_or_else(|| {
            let factor = 10f64.powi(decimals);
            (value * factor).round() / factor
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::{col, lit, round};
    use arrow::datatypes::{Field, Schema};

    fn create_test_batch() -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("sale_id", DataType::Utf8, false),
            Field::new("amount", DataType::Float64, true),
        ]));
        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(vec!["1", "2", "3", "4"])),
                Arc::new(Float64Array::from(vec![
                    Some(12.345),
                    Some(-2.675),
                    None,
                    Some(100.0),
                ])),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_round_half_up_on_decimal_repr() {
        assert_eq!(round_half_up(12.345, 2), 12.35);
        assert_eq!(round_half_up(2.675, 2), 2.68);
        assert_eq!(round_half_up(-2.675, 2), -2.68);
        assert_eq!(round_half_up(1.004, 2), 1.0);
        assert_eq!(round_half_up(1549.0, -2), 1500.0);
        assert!(round_half_up(f64::NAN, 2).is_nan());
    }

    #[test]
    fn test_evaluate_round_preserves_nulls() {
        let batch = create_test_batch();
        let result = evaluate_expr(&batch, &round(col("amount"), 2)).unwrap();
        let values = result.as_any().downcast_ref::<Float64Array>().unwrap();

        assert_eq!(values.value(0), 12.35);
        assert_eq!(values.value(1), -2.68);
        assert!(values.is_null(2));
        assert_eq!(values.value(3), 100.0);
    }

    #[test]
    fn test_evaluate_int_round_negative_scale() {
        let schema = Arc::new(Schema::new(vec![Field::new("n", DataType::Int64, false)]));
        let batch = RecordBatch::try_new(
            schema,
            vec![Arc::new(Int64Array::from(vec![149, 150, -150, 7]))],
        )
        .unwrap();

        let result = evaluate_expr(&batch, &round(col("n"), -2)).unwrap();
        let values = result.as_any().downcast_ref::<Int64Array>().unwrap();
        assert_eq!(values.values().to_vec(), vec![100, 200, -200, 0]);
    }

    #[test]
    fn test_evaluate_literal_and_missing_column() {
        let batch = create_test_batch();
        let result = evaluate_expr(&batch, &lit("XX")).unwrap();
        assert_eq!(result.len(), 4);

        assert!(matches!(
            evaluate_expr(&batch, &col("region")),
            Err(BroadcastJoinError::ColumnNotFound(_))
        ));
    }
}
