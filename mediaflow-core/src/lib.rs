//! Mediaflow Core
//!
//! Core types and abstractions for the Mediaflow content-processing backend.
//!
//! This crate contains:
//! - Domain types: Core business entities (Job, ScheduleDefinition, PipelineSpec)
//! - DTOs: Wire types for talking to remote processing services

pub mod domain;
pub mod dto;
