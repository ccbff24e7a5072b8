//! Reusable test fixtures for the SSU integration suite.

pub mod two_node;
