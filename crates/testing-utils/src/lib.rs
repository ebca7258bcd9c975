//! # Dispatch Testing Utils
//!
//! Shared testing utilities for the drone dispatch workspace.
//!
//! - **Mock Repositories**: in-memory drone and order repositories with failure injection
//! - **Mock Ports**: liveness cache, message bus and a recording status observer
//! - **Test Data Builders**: drones and orders with sensible defaults
//! - **Database Test Containers**: PostgreSQL container with the workspace migrations applied
//!
//! ```toml
//! [dev-dependencies]
//! dispatch-testing-utils = { path = "../testing-utils" }
//! ```

pub mod builders;
pub mod containers;
pub mod mocks;

pub use builders::*;
pub use containers::*;
pub use mocks::*;
