//! Integration tests

mod e2e_test;
mod pipeline_test;
mod server_test;
mod support;
