//! Deterministic test doubles for the ORM core: a scripted in-memory
//! driver plus canonical schema fixtures.

mod fake_driver;
mod fixtures;

pub use fake_driver::{FakeCall, FakeDriver, FakeOutcome};
pub use fixtures::{client_order_schema, client_order_schema_with_cascade, row};
