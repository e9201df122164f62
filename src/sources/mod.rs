//! Remote JSON data sources
//!
//! Country reference data from REST Countries and users/carts from DummyJSON,
//! fetched through the `JsonSource` trait so tests can serve them from memory.

mod client;
mod countries;
mod dummyjson;

pub use client::*;
pub use countries::*;
pub use dummyjson::*;
