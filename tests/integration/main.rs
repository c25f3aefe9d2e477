//! Integration tests for pdf-audit
//!
//! These tests use wiremock to serve mock sites and small `sh` scripts in
//! place of the external validator.

mod audit_tests;
mod common;
mod crawl_tests;
mod download_tests;
mod recovery_tests;
