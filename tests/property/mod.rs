//! Property-based tests

pub mod convergence_proptest;
