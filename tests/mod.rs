//! Test suite for mindmap-collab
//!
//! This module organizes all tests

#[macro_use]
pub mod common;
pub mod e2e;
pub mod integration;
pub mod property;
