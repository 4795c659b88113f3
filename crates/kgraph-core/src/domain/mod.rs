//! Domain layer
//!
//! Contains the core graph model and algorithms.

pub mod knowledge;
