//! Scenario tests against an in-memory controller.

mod common;
