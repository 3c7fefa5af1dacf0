//! Crate-level test suites.

mod testcase_api;
