//! Error Types
//!
//! This module defines the error types used throughout the crate.
//!
//! # Overview
//!
//! Most faults encountered while compiling a graph are *recovered locally*
//! and never surface as [`PatchbayError`]:
//! - dangling or type-mismatched binding/queue edges are dropped with a
//!   `log::warn!`, and the rest of the graph compiles;
//! - shader compilation problems are reported through the per-shader
//!   diagnostics map, and only the affected module becomes unusable;
//! - passes that cannot be linked are omitted from the executable with a
//!   `log::error!`.
//!
//! [`PatchbayError`] covers the failures that abort an entire compile.
//! On such a failure the previously installed generation stays live.
//!
//! # Usage
//!
//! Fallible public APIs return [`Result<T>`], an alias for
//! `std::result::Result<T, PatchbayError>`.

use thiserror::Error;

use crate::blueprint::NodeId;

/// The main error type for patchbay.
///
/// Only compile-aborting conditions live here; per-edge and per-resource
/// faults are recovered where they occur (see the module docs).
#[derive(Error, Debug)]
pub enum PatchbayError {
    // ========================================================================
    // Graph Analysis Errors
    // ========================================================================
    /// The queue edges between passes form a cycle, so the listed passes
    /// can never be scheduled.
    #[error("queue edges form a cycle; unschedulable passes: {stalled:?}")]
    QueueCycle {
        /// Passes with a non-zero dependency count after scheduling,
        /// sorted by ID.
        stalled: Vec<NodeId>,
    },

    /// The graph contains no pass that can be scheduled and executed.
    #[error("no usable passes in the graph")]
    NoUsablePasses,
}

/// Alias for `Result<T, PatchbayError>`.
pub type Result<T> = std::result::Result<T, PatchbayError>;
