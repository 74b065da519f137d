//! Core module containing the controller model
//!
//! This module provides:
//! - Network capability seam and an in-memory simulated controller
//! - Points and their classification
//! - Point discovery into a name-indexed catalog
//! - Batched multi-point reads
//! - Background polling state machine
//! - Device facade tying them together

pub mod batch;
pub mod catalog;
pub mod controller;
pub mod device;
pub mod error;
pub mod network;
pub mod point;
pub mod poll;
