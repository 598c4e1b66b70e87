//! Integration tests across client components

pub mod api_test;
pub mod bootstrap_test;
pub mod detach_test;
pub mod persistence_test;
