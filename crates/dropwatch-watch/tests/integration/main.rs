//! Integration tests for dropwatch-watch
//!
//! Runs the full service against the platform notification backend on
//! temporary directory trees. Filesystem notifications are asynchronous, so
//! every assertion polls with a generous deadline.

mod common;

mod test_dispatch;
mod test_scenarios;
