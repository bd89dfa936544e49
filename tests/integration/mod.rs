//! Library-level integration tests: selector + planner + scheduler scenarios
//! and property tests over generated documents.

mod properties;
mod scenarios;
