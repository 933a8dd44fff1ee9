//! Core domain types
//!
//! This module contains the core domain structures used across Mediaflow
//! services. These types represent the fundamental business entities and are
//! shared between the engine (for execution) and its stores (for persistence).

pub mod job;
pub mod pipeline;
pub mod progress;
pub mod schedule;
