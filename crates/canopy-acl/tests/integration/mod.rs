//! Integration test modules.

mod policy;
mod properties;
mod scenarios;
