//! Common utilities for E2E tests.

pub mod harness;
pub mod utils;

#[allow(unused_imports)]
pub use harness::*;
#[allow(unused_imports)]
pub use utils::*;
