//! Logical planning module
//!
//! DataFrame operations build a `LogicalPlan`; the physical planner turns it
//! into executable operators.

mod logical_expr;
mod logical_plan;
mod schema;

pub use logical_expr::*;
pub use logical_plan::*;
pub use schema::*;
