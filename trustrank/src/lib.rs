//! # Trust Rank
//!
//! A library for computing seeded trust scores over a directed, weighted graph
//! of peer ratings.
//!
//! ## Main characteristics:
//!
//! **Seeded** - all trust is anchored in a single a-priori trusted vertex. Each
//! superstep a fixed share of the mass teleports back to it, so trust flows
//! outwards from the seed along the ratings.
//!
//! **Leak-free** - vertices that rate nobody route their mass to a synthetic sink
//! instead of losing it.
//!
//! **Deterministic** - the computation runs in bulk-synchronous supersteps on a
//! pool of workers, and messages are combined in a fixed order, so identical
//! inputs give bit-identical scores.
//!
//! ## Implementation
//!
//! The propagation follows the EigenTrust scheme with pre-trust concentrated on
//! one peer: `t(k+1) = a * p + (1 - a) * C^T t(k)`, where `C` holds the
//! normalized ratings and `p` is the seed indicator. A vertex stops updating
//! once its score moves by no more than the tolerance.

// Rustc
#![warn(trivial_casts)]
#![deny(
	absolute_paths_not_starting_with_crate, deprecated, future_incompatible, missing_docs,
	nonstandard_style, unreachable_code, unreachable_patterns
)]
#![forbid(unsafe_code)]
// Clippy
#![allow(clippy::tabs_in_doc_comments, clippy::new_without_default)]
#![deny(
	// Complexity
 	clippy::unnecessary_cast,
	clippy::needless_question_mark,
	clippy::clone_on_copy,
	// Pedantic
 	clippy::cast_lossless,
 	clippy::cast_possible_wrap,
	// Perf
	clippy::redundant_clone,
	// Restriction
 	clippy::panic,
	// Style
 	clippy::let_and_return,
 	clippy::needless_borrow
)]

pub mod convergence;
pub mod engine;
pub mod error;
pub mod graph;
pub mod partition;
pub mod storage;

use engine::{
	EngineParams, Propagation, PropagationEngine, DEFAULT_MAX_ITERATIONS, DEFAULT_NUM_WORKERS,
	DEFAULT_RESET_PROB, DEFAULT_TOL,
};
use error::TrustError;
use graph::{GraphBuilder, Rating};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Vertex (user) identifier.
pub type VertexId = i64;

/// Engine configuration settings.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct EngineConfig {
	/// Id of the trusted seed vertex.
	pub seed_id: VertexId,
	/// Probability of teleporting back to the seed.
	#[serde(default = "default_reset_prob")]
	pub reset_prob: f64,
	/// Per-vertex convergence tolerance.
	#[serde(default = "default_tol")]
	pub tol: f64,
	/// Maximum number of supersteps.
	#[serde(default = "default_max_iterations")]
	pub max_iterations: usize,
	/// Number of worker threads.
	#[serde(default = "default_num_workers")]
	pub num_workers: usize,
}

impl EngineConfig {
	/// Creates a configuration seeded at `seed_id` with default parameters.
	pub fn new(seed_id: VertexId) -> Self {
		Self {
			seed_id,
			reset_prob: DEFAULT_RESET_PROB,
			tol: DEFAULT_TOL,
			max_iterations: DEFAULT_MAX_ITERATIONS,
			num_workers: DEFAULT_NUM_WORKERS,
		}
	}

	/// Engine parameters of this configuration.
	pub fn params(&self) -> EngineParams {
		EngineParams::new(self.reset_prob, self.tol, self.max_iterations)
			.with_workers(self.num_workers)
	}
}

fn default_reset_prob() -> f64 {
	DEFAULT_RESET_PROB
}

fn default_tol() -> f64 {
	DEFAULT_TOL
}

fn default_max_iterations() -> usize {
	DEFAULT_MAX_ITERATIONS
}

fn default_num_workers() -> usize {
	DEFAULT_NUM_WORKERS
}

/// Score struct.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Score {
	/// Vertex id.
	pub vertex_id: VertexId,
	/// Trust score.
	pub score: f64,
}

/// Client struct.
pub struct Client {
	config: EngineConfig,
}

impl Client {
	/// Creates a new Client instance.
	pub fn new(config: EngineConfig) -> Self {
		Self { config }
	}

	/// Builds the graph for `ratings` and propagates trust from the configured seed.
	pub fn propagate(&self, ratings: Vec<Rating>) -> Result<Propagation, TrustError> {
		// Parameters are checked before the graph is touched.
		let engine = PropagationEngine::new(self.config.params())?;

		let mut builder = GraphBuilder::new(self.config.seed_id);
		builder.add_ratings(ratings)?;
		let graph = builder.build()?;

		Ok(engine.run(graph))
	}

	/// Calculates the trust scores, highest first.
	pub fn calculate_scores(&self, ratings: Vec<Rating>) -> Result<Vec<Score>, TrustError> {
		let propagation = self.propagate(ratings)?;

		match propagation.warning() {
			Some(warning) => warn!("Returning best-effort scores: {}", warning),
			None => info!("Scores converged in {} supersteps", propagation.supersteps()),
		}

		let mut scores: Vec<Score> = propagation
			.into_scores()
			.into_iter()
			.map(|(vertex_id, score)| Score { vertex_id, score })
			.collect();
		scores.sort_by(|a, b| {
			b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal).then(a.vertex_id.cmp(&b.vertex_id))
		});

		Ok(scores)
	}

	/// Gets config.
	pub fn get_config(&self) -> &EngineConfig {
		&self.config
	}
}

#[cfg(test)]
mod lib_tests {
	use crate::{error::TrustError, graph::Rating, Client, EngineConfig};

	#[test]
	fn test_calculate_scores_sorted() {
		let ratings = vec![
			Rating::new(0, 1, 1.0),
			Rating::new(1, 2, 1.0),
			Rating::new(2, 0, 1.0),
		];
		let config = EngineConfig { reset_prob: 0.1, ..EngineConfig::new(0) };
		let scores = Client::new(config).calculate_scores(ratings).unwrap();

		let order: Vec<i64> = scores.iter().map(|score| score.vertex_id).collect();
		assert_eq!(order, vec![0, 1, 2]);
		assert!(scores.windows(2).all(|pair| pair[0].score >= pair[1].score));
	}

	#[test]
	fn test_invalid_config_checked_before_ratings() {
		let config = EngineConfig { tol: -1.0, ..EngineConfig::new(0) };
		// The negative weight is never looked at.
		let result = Client::new(config).calculate_scores(vec![Rating::new(0, 1, -1.0)]);
		assert!(matches!(result, Err(TrustError::ConfigurationError(_))));
	}

	#[test]
	fn test_config_defaults_from_json() {
		let config: EngineConfig = serde_json::from_str(r#"{ "seed_id": 7 }"#).unwrap();
		assert_eq!(config, EngineConfig::new(7));
		assert_eq!(config.params().num_workers, 4);
	}

	#[test]
	fn test_sink_not_reported() {
		let ratings = vec![Rating::new(0, 1, 1.0)];
		let scores = Client::new(EngineConfig::new(0)).calculate_scores(ratings).unwrap();
		assert_eq!(scores.len(), 2);
	}
}
