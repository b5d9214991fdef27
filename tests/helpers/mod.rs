// Shared test infrastructure
//
// The tax authority is replaced by a scripted SOAP transport that records
// every call; MySQL by in-memory repositories that keep the same
// conditional-update rules as the SQL statements.
//
// Usage (from a test target):
//   #[path = "../helpers/mod.rs"]
//   mod helpers;
//   use helpers::*;

#![allow(dead_code)]

pub mod fixtures;
pub mod memory;
pub mod soap;

pub use app::*;
pub use fixtures::*;
pub use memory::*;
pub use soap::*;
