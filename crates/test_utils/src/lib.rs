//! Shared test infrastructure for the billing ledger test suite.
//!
//! - `builders`: request builders with sensible defaults, so tests only
//!   spell out the fields under test
//! - `fixtures`: deterministic port implementations (fixed clock, sequenced
//!   id generator, recording and failing dispatchers)

pub mod builders;
pub mod fixtures;

pub use builders::*;
pub use fixtures::*;
