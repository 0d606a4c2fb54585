//! # Error Module.
//!
//! This module features the `TrustError` enum for error handling throughout the project,
//! and the `NonConvergenceWarning` carried by runs that hit the iteration cap.

use thiserror::Error;

/// The crate-wide error variants.
#[derive(Debug, Error)]
pub enum TrustError {
	/// Configuration error
	#[error("ConfigurationError: {0}")]
	ConfigurationError(String),

	/// File read/write error
	#[error("FileIOError: {0}")]
	FileIOError(String),

	/// Input/output error
	#[error("IOError: {0}")]
	IOError(std::io::Error),

	/// Invalid edge weight error
	#[error("InvalidWeightError: {0}")]
	InvalidWeightError(String),

	/// Parsing error
	#[error("ParsingError: {0}")]
	ParsingError(String),

	/// Validation error
	#[error("ValidationError: {0}")]
	ValidationError(String),

	/// Worker pool could not be started
	#[error("WorkerPoolError: {0}")]
	WorkerPoolError(String),
}

/// Emitted when the iteration cap is reached while some vertices are still active.
///
/// This is not an error: the scores computed so far are still returned.
#[derive(Clone, Debug, Error, PartialEq)]
#[error(
	"NonConvergenceWarning: {active_vertices} vertices still active after {supersteps} supersteps (max delta {max_delta:e})"
)]
pub struct NonConvergenceWarning {
	/// Number of supersteps executed.
	pub supersteps: usize,
	/// Vertices whose last delta was still above the tolerance.
	pub active_vertices: usize,
	/// Largest delta observed in the last superstep.
	pub max_delta: f64,
}
