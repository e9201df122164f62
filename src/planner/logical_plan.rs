//! Logical plan types

use crate::error::{BroadcastJoinError, Result};
use crate::planner::{Expr, PlanSchema, SchemaField};
use std::fmt;
use std::sync::Arc;

/// Join type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoinType {
    Inner,
    /// Left outer join: every left row is preserved
    Left,
}

impl JoinType {
    /// Name used in physical plan output
    pub fn physical_name(&self) -> &'static str {
        match self {
            JoinType::Inner => "Inner",
            JoinType::Left => "LeftOuter",
        }
    }
}

impl fmt::Display for JoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinType::Inner => write!(f, "INNER"),
            JoinType::Left => write!(f, "LEFT"),
        }
    }
}

/// Planner hints attached to a subtree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlanHint {
    /// Replicate this side to every partition instead of shuffling
    Broadcast,
}

impl fmt::Display for PlanHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanHint::Broadcast => write!(f, "broadcast"),
        }
    }
}

/// Logical plan node
#[derive(Debug, Clone, PartialEq)]
pub enum LogicalPlan {
    /// Table scan
    Scan(ScanNode),
    /// Projection
    Project(ProjectNode),
    /// Equi-join on shared column names
    Join(JoinNode),
    /// Hint wrapper, transparent to the schema
    Hint(HintNode),
}

impl LogicalPlan {
    /// Get the output schema of this plan node
    pub fn schema(&self) -> &PlanSchema {
        match self {
            LogicalPlan::Scan(node) => &node.schema,
            LogicalPlan::Project(node) => &node.schema,
            LogicalPlan::Join(node) => &node.schema,
            LogicalPlan::Hint(node) => node.input.schema(),
        }
    }

    /// Get child plans
    pub fn children(&self) -> Vec<&LogicalPlan> {
        match self {
            LogicalPlan::Scan(_) => vec![],
            LogicalPlan::Project(node) => vec![&node.input],
            LogicalPlan::Join(node) => vec![&node.left, &node.right],
            LogicalPlan::Hint(node) => vec![&node.input],
        }
    }

    /// True when this subtree is directly wrapped in the given hint
    pub fn has_hint(&self, hint: PlanHint) -> bool {
        match self {
            LogicalPlan::Hint(node) => node.hint == hint || node.input.has_hint(hint),
            _ => false,
        }
    }

    /// Builder: add a projection
    pub fn project(self, exprs: Vec<Expr>) -> Result<Self> {
        let input = Arc::new(self);
        let fields: Result<Vec<SchemaField>> =
            exprs.iter().map(|e| e.to_field(input.schema())).collect();

        Ok(LogicalPlan::Project(ProjectNode {
            input,
            exprs,
            schema: PlanSchema::try_new(fields?)?,
        }))
    }

    /// Builder: join with `right` on columns present on both sides
    pub fn join_using(
        self,
        right: LogicalPlan,
        using: Vec<String>,
        join_type: JoinType,
    ) -> Result<Self> {
        if using.is_empty() {
            return Err(BroadcastJoinError::Plan(
                "Join requires at least one key column".to_string(),
            ));
        }

        let left_schema = self.schema();
        let right_schema = right.schema();

        for key in &using {
            let l = left_schema.field_by_name(key)?;
            let r = right_schema.field_by_name(key)?;
            if l.data_type != r.data_type {
                return Err(BroadcastJoinError::Plan(format!(
                    "Join key '{}' has type {} on the left and {} on the right",
                    key, l.data_type, r.data_type
                )));
            }
        }

        // Right side columns become nullable when left rows may be unmatched
        let right_nullable = matches!(join_type, JoinType::Left);

        let mut fields: Vec<SchemaField> = left_schema.fields().to_vec();
        fields.extend(
            right_schema
                .fields()
                .iter()
                .filter(|f| !using.contains(&f.name))
                .map(|f| {
                    let nullable = f.nullable || right_nullable;
                    f.clone().with_nullable(nullable)
                }),
        );

        Ok(LogicalPlan::Join(JoinNode {
            left: Arc::new(self),
            right: Arc::new(right),
            join_type,
            using,
            schema: PlanSchema::try_new(fields)?,
        }))
    }

    /// Builder: wrap in a hint
    pub fn hint(self, hint: PlanHint) -> Self {
        LogicalPlan::Hint(HintNode {
            input: Arc::new(self),
            hint,
        })
    }

    fn fmt_indent(&self, f: &mut fmt::Formatter<'_>, indent: usize) -> fmt::Result {
        let prefix = "  ".repeat(indent);

        match self {
            LogicalPlan::Scan(node) => {
                writeln!(
                    f,
                    "{}Scan: {} [{}]",
                    prefix,
                    node.table_name,
                    node.schema.column_names().join(", ")
                )?;
            }
            LogicalPlan::Project(node) => {
                let exprs: Vec<String> = node.exprs.iter().map(|e| e.to_string()).collect();
                writeln!(f, "{}Project: [{}]", prefix, exprs.join(", "))?;
                node.input.fmt_indent(f, indent + 1)?;
            }
            LogicalPlan::Join(node) => {
                writeln!(
                    f,
                    "{}{} Join using [{}]",
                    prefix,
                    node.join_type,
                    node.using.join(", ")
                )?;
                node.left.fmt_indent(f, indent + 1)?;
                node.right.fmt_indent(f, indent + 1)?;
            }
            LogicalPlan::Hint(node) => {
                writeln!(f, "{}Hint: {}", prefix, node.hint)?;
                node.input.fmt_indent(f, indent + 1)?;
            }
        }
        Ok(())
    }
}

impl fmt::Display for LogicalPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_indent(f, 0)
    }
}

/// Table scan node
#[derive(Debug, Clone, PartialEq)]
pub struct ScanNode {
    pub table_name: String,
    pub schema: PlanSchema,
}

/// Projection node
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectNode {
    pub input: Arc<LogicalPlan>,
    pub exprs: Vec<Expr>,
    pub schema: PlanSchema,
}

/// Join node
#[derive(Debug, Clone, PartialEq)]
pub struct JoinNode {
    pub left: Arc<LogicalPlan>,
    pub right: Arc<LogicalPlan>,
    pub join_type: JoinType,
    /// Key columns, present under the same name on both sides
    pub using: Vec<String>,
    pub schema: PlanSchema,
}

/// Hint node
#[derive(Debug, Clone, PartialEq)]
pub struct HintNode {
    pub input: Arc<LogicalPlan>,
    pub hint: PlanHint,
}

/// Builder for creating logical plans
pub struct LogicalPlanBuilder {
    plan: LogicalPlan,
}

impl LogicalPlanBuilder {
    pub fn scan(table_name: impl Into<String>, schema: PlanSchema) -> Self {
        Self {
            plan: LogicalPlan::Scan(ScanNode {
                table_name: table_name.into(),
                schema,
            }),
        }
    }

    pub fn from_plan(plan: LogicalPlan) -> Self {
        Self { plan }
    }

    pub fn project(mut self, exprs: Vec<Expr>) -> Result<Self> {
        self.plan = self.plan.project(exprs)?;
        Ok(self)
    }

    pub fn join_using(
        mut self,
        right: LogicalPlan,
        using: Vec<String>,
        join_type: JoinType,
    ) -> Result<Self> {
        self.plan = self.plan.join_using(right, using, join_type)?;
        Ok(self)
    }

    pub fn hint(mut self, hint: PlanHint) -> Self {
        self.plan = self.plan.hint(hint);
        self
    }

    pub fn build(self) -> LogicalPlan {
        self.plan
    }
}
