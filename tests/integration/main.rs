//! Integration tests for harvesting, retry rounds and reconciliation

mod common;

mod harvest_tests;
mod http_portal_tests;
