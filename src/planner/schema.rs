//! Schema types for logical plans

use crate::error::{BroadcastJoinError, Result};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Schema field with plan-level metadata
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaField {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
}

impl SchemaField {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: true,
        }
    }

    pub fn with_nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    pub fn to_arrow_field(&self) -> Field {
        Field::new(&self.name, self.data_type.clone(), self.nullable)
    }
}

impl fmt::Display for SchemaField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.data_type)?;
        if !self.nullable {
            write!(f, " NOT NULL")?;
        }
        Ok(())
    }
}

/// Schema representing the output of a plan node
#[derive(Debug, Clone)]
pub struct PlanSchema {
    fields: Vec<SchemaField>,
    /// Map from column name to field index
    name_index: HashMap<String, usize>,
}

impl PartialEq for PlanSchema {
    fn eq(&self, other: &Self) -> bool {
        self.fields == other.fields
    }
}

impl PlanSchema {
    /// Build a schema, rejecting duplicate column names
    pub fn try_new(fields: Vec<SchemaField>) -> Result<Self> {
        let mut name_index = HashMap::with_capacity(fields.len());
        for (i, field) in fields.iter().enumerate() {
            if name_index.insert(field.name.clone(), i).is_some() {
                return Err(BroadcastJoinError::Plan(format!(
                    "Duplicate column name '{}'",
                    field.name
                )));
            }
        }
        Ok(Self { fields, name_index })
    }

    pub fn empty() -> Self {
        Self {
            fields: vec![],
            name_index: HashMap::new(),
        }
    }

    pub fn fields(&self) -> &[SchemaField] {
        &self.fields
    }

    pub fn field(&self, index: usize) -> Option<&SchemaField> {
        self.fields.get(index)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Resolve a column name to its index
    pub fn index_of(&self, name: &str) -> Result<usize> {
        self.name_index
            .get(name)
            .copied()
            .ok_or_else(|| BroadcastJoinError::ColumnNotFound(name.to_string()))
    }

    /// Resolve a column name to its field
    pub fn field_by_name(&self, name: &str) -> Result<&SchemaField> {
        self.index_of(name).map(|i| &self.fields[i])
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    pub fn to_arrow(&self) -> SchemaRef {
        Arc::new(Schema::new(
            self.fields
                .iter()
                .map(SchemaField::to_arrow_field)
                .collect::<Vec<_>>(),
        ))
    }
}

impl TryFrom<&Schema> for PlanSchema {
    type Error = BroadcastJoinError;

    fn try_from(schema: &Schema) -> Result<Self> {
        let fields = schema
            .fields()
            .iter()
            .map(|f| {
                SchemaField::new(f.name().clone(), f.data_type().clone())
                    .with_nullable(f.is_nullable())
            })
            .collect();
        PlanSchema::try_new(fields)
    }
}
