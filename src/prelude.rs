//! # xorscope Prelude
//!
//! The most commonly used types of the crate, for glob imports.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all xorscope operations
pub use crate::Error;

/// The result type used throughout xorscope
pub use crate::Result;

// ================================================================================================
// Layout Database
// ================================================================================================

/// Geometry primitives
pub use crate::db::{Coord, Point, Rect, Region, Trans};

/// Hierarchical layout storage
pub use crate::db::{CellIndex, Instance, LayerIndex, LayerInfo, Layout};

// ================================================================================================
// Comparison
// ================================================================================================

/// Configuration
pub use crate::xor::{XorConfig, XorFlags, XorMode};

/// Running a comparison
pub use crate::xor::{compare, XorOutcome, XorRun};

/// Results and reporting
pub use crate::xor::{LayerIdentity, ResultDescriptor, ResultKey, ResultMap, XorReport};
