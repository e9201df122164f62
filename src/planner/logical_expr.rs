//! Logical expression types

use crate::error::{BroadcastJoinError, Result};
use crate::planner::schema::{PlanSchema, SchemaField};
use arrow::datatypes::DataType;
use ordered_float::OrderedFloat;
use std::collections::HashSet;
use std::fmt;

/// Scalar value for literals
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ScalarValue {
    Null,
    Boolean(bool),
    Int64(i64),
    Float64(OrderedFloat<f64>),
    Utf8(String),
}

impl ScalarValue {
    pub fn data_type(&self) -> DataType {
        match self {
            ScalarValue::Null => DataType::Null,
            ScalarValue::Boolean(_) => DataType::Boolean,
            ScalarValue::Int64(_) => DataType::Int64,
            ScalarValue::Float64(_) => DataType::Float64,
            ScalarValue::Utf8(_) => DataType::Utf8,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, ScalarValue::Null)
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::Null => write!(f, "NULL"),
            ScalarValue::Boolean(v) => write!(f, "{}", v),
            ScalarValue::Int64(v) => write!(f, "{}", v),
            ScalarValue::Float64(v) => write!(f, "{}", v),
            ScalarValue::Utf8(v) => write!(f, "'{}'", v),
        }
    }
}

impl From<bool> for ScalarValue {
    fn from(v: bool) -> Self {
        ScalarValue::Boolean(v)
    }
}

impl From<i64> for ScalarValue {
    fn from(v: i64) -> Self {
        ScalarValue::Int64(v)
    }
}

impl From<f64> for ScalarValue {
    fn from(v: f64) -> Self {
        ScalarValue::Float64(OrderedFloat(v))
    }
}

impl From<&str> for ScalarValue {
    fn from(v: &str) -> Self {
        ScalarValue::Utf8(v.to_string())
    }
}

impl From<String> for ScalarValue {
    fn from(v: String) -> Self {
        ScalarValue::Utf8(v)
    }
}

/// Logical expression
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Column reference by name
    Column(String),
    /// Constant value
    Literal(ScalarValue),
    /// Round half away from zero to `decimals` places
    Round { expr: Box<Expr>, decimals: i32 },
    /// Renamed expression
    Alias { expr: Box<Expr>, name: String },
}

impl Expr {
    pub fn column(name: impl Into<String>) -> Self {
        Expr::Column(name.into())
    }

    pub fn literal(value: impl Into<ScalarValue>) -> Self {
        Expr::Literal(value.into())
    }

    pub fn round(self, decimals: i32) -> Self {
        Expr::Round {
            expr: Box::new(self),
            decimals,
        }
    }

    pub fn alias(self, name: impl Into<String>) -> Self {
        Expr::Alias {
            expr: Box::new(self),
            name: name.into(),
        }
    }

    /// Name of the column this expression produces
    pub fn output_name(&self) -> String {
        match self {
            Expr::Column(name) => name.clone(),
            Expr::Alias { name, .. } => name.clone(),
            Expr::Literal(v) => v.to_string(),
            Expr::Round { expr, decimals } => format!("round({}, {})", expr.output_name(), decimals),
        }
    }

    /// Resolve the expression's output type against an input schema
    pub fn data_type(&self, schema: &PlanSchema) -> Result<DataType> {
        match self {
            Expr::Column(name) => Ok(schema.field_by_name(name)?.data_type.clone()),
            Expr::Literal(v) => Ok(v.data_type()),
            Expr::Alias { expr, .. } => expr.data_type(schema),
            Expr::Round { expr, .. } => match expr.data_type(schema)? {
                dt @ (DataType::Float64 | DataType::Int64) => Ok(dt),
                other => Err(BroadcastJoinError::Plan(format!(
                    "round() expects a numeric argument, got {}",
                    other
                ))),
            },
        }
    }

    pub fn nullable(&self, schema: &PlanSchema) -> Result<bool> {
        match self {
            Expr::Column(name) => Ok(schema.field_by_name(name)?.nullable),
            Expr::Literal(v) => Ok(v.is_null()),
            Expr::Alias { expr, .. } | Expr::Round { expr, .. } => expr.nullable(schema),
        }
    }

    /// Add every column this expression reads to `out`
    pub fn collect_columns(&self, out: &mut HashSet<String>) {
        match self {
            Expr::Column(name) => {
                out.insert(name.clone());
            }
            Expr::Literal(_) => {}
            Expr::Alias { expr, .. } | Expr::Round { expr, .. } => expr.collect_columns(out),
        }
    }

    pub fn to_field(&self, schema: &PlanSchema) -> Result<SchemaField> {
        Ok(
            SchemaField::new(self.output_name(), self.data_type(schema)?)
                .with_nullable(self.nullable(schema)?),
        )
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Column(name) => write!(f, "{}", name),
            Expr::Literal(v) => write!(f, "{}", v),
            Expr::Round { expr, decimals } => write!(f, "round({}, {})", expr, decimals),
            Expr::Alias { expr, name } => write!(f, "{} AS {}", expr, name),
        }
    }
}

/// Column reference
pub fn col(name: impl Into<String>) -> Expr {
    Expr::column(name)
}

/// Literal value
pub fn lit(value: impl Into<ScalarValue>) -> Expr {
    Expr::literal(value)
}

/// Round a numeric expression to `decimals` places
pub fn round(expr: Expr, decimals: i32) -> Expr {
    expr.round(decimals)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> PlanSchema {
        PlanSchema::try_new(vec![
            SchemaField::new("sale_id", DataType::Utf8).with_nullable(false),
            SchemaField::new("amount", DataType::Float64).with_nullable(false),
        ])
        .unwrap()
    }

    #[test]
    fn test_round_keeps_type() {
        let expr = round(col("amount"), 2).alias("amount");
        let field = expr.to_field(&schema()).unwrap();
        assert_eq!(field.name, "amount");
        assert_eq!(field.data_type, DataType::Float64);
        assert!(!field.nullable);
    }

    #[test]
    fn test_round_rejects_strings() {
        let expr = round(col("sale_id"), 2);
        assert!(matches!(
            expr.data_type(&schema()),
            Err(BroadcastJoinError::Plan(_))
        ));
    }

    #[test]
    fn test_display() {
        let expr = round(col("amount"), 2).alias("amount");
        assert_eq!(expr.to_string(), "round(amount, 2) AS amount");
        assert_eq!(lit("US").to_string(), "'US'");
    }

    #[test]
    fn test_collect_columns() {
        let mut columns = HashSet::new();
        round(col("amount"), 2).alias("total").collect_columns(&mut columns);
        lit(1i64).collect_columns(&mut columns);
        assert_eq!(columns, HashSet::from(["amount".to_string()]));
    }
}
