//! Data Transfer Objects for remote service communication
//!
//! This module contains the wire types exchanged with remote processing
//! services. Every capability service speaks the same small task protocol,
//! so one set of DTOs covers them all.

pub mod remote;
