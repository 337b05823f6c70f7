//! Integration tests for dropwatch-handlers
//!
//! Uses wiremock to stand in for the object store and verifies the upload
//! handler's request shape, retry behaviour and source-file cleanup.

mod common;

mod test_registry;
mod test_upload;
