//! # Engine Module.
//!
//! Bulk-synchronous propagation of trust over a [`PropagationGraph`].
//!
//! Every superstep runs the vertex program over all partitions in parallel on a
//! fixed worker pool. Workers read the previous scores and the read-only topology
//! and write only their own slice of the next buffers. Completion of the parallel
//! pass is the barrier, after which the buffers are swapped.
//!
//! Incoming messages are combined by summation in ascending sender index, so a
//! run is bit-for-bit reproducible whatever the number of workers.

use crate::{
	convergence::ConvergenceTracker,
	error::{NonConvergenceWarning, TrustError},
	graph::{PropagationGraph, Topology, VertexKey, VertexTable},
	partition::Partitioning,
	VertexId,
};
use log::{debug, info, warn};
use rayon::{prelude::*, ThreadPool, ThreadPoolBuilder};
use std::collections::BTreeMap;

/// Default probability of teleporting back to the seed.
pub const DEFAULT_RESET_PROB: f64 = 0.15;
/// Default per-vertex convergence tolerance.
pub const DEFAULT_TOL: f64 = 1e-6;
/// Default cap on the number of supersteps.
pub const DEFAULT_MAX_ITERATIONS: usize = 1000;
/// Default size of the worker pool.
pub const DEFAULT_NUM_WORKERS: usize = 4;

/// Propagation parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EngineParams {
	/// Probability of teleporting back to the seed, in `[0, 1]`.
	pub reset_prob: f64,
	/// A vertex whose score moves by at most `tol` goes quiet.
	pub tol: f64,
	/// Maximum number of supersteps.
	pub max_iterations: usize,
	/// Number of worker threads.
	pub num_workers: usize,
}

impl EngineParams {
	/// Creates parameters with the default worker count.
	pub fn new(reset_prob: f64, tol: f64, max_iterations: usize) -> Self {
		Self { reset_prob, tol, max_iterations, num_workers: DEFAULT_NUM_WORKERS }
	}

	/// Sets the number of worker threads.
	pub fn with_workers(mut self, num_workers: usize) -> Self {
		self.num_workers = num_workers;
		self
	}

	/// Checks every parameter, before any graph work is done.
	pub fn validate(&self) -> Result<(), TrustError> {
		if !(0.0..=1.0).contains(&self.reset_prob) {
			return Err(TrustError::ConfigurationError(format!(
				"reset probability must be in [0, 1], got {}",
				self.reset_prob
			)));
		}
		if self.tol.is_nan() || self.tol < 0.0 {
			return Err(TrustError::ConfigurationError(format!(
				"tolerance must be >= 0, got {}",
				self.tol
			)));
		}
		if self.max_iterations == 0 {
			return Err(TrustError::ConfigurationError(
				"max iterations must be at least 1".to_string(),
			));
		}
		if self.num_workers == 0 {
			return Err(TrustError::ConfigurationError(
				"at least one worker is required".to_string(),
			));
		}

		Ok(())
	}
}

impl Default for EngineParams {
	fn default() -> Self {
		Self::new(DEFAULT_RESET_PROB, DEFAULT_TOL, DEFAULT_MAX_ITERATIONS)
	}
}

/// Summary of one superstep, taken after its barrier.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SuperstepStats {
	/// Zero-based superstep number.
	pub superstep: usize,
	/// Vertices still active for the next superstep.
	pub active_vertices: usize,
	/// Sum of all scores, sink included.
	pub total_mass: f64,
	/// Largest delta in the vertex table.
	pub max_delta: f64,
}

/// How a run ended.
#[derive(Clone, Debug, PartialEq)]
pub enum ConvergenceStatus {
	/// Every vertex went quiet.
	Converged,
	/// The iteration cap was hit first; the scores are a best-effort estimate.
	NotConverged(NonConvergenceWarning),
}

/// Result of a propagation run.
#[derive(Clone, Debug)]
pub struct Propagation {
	scores: BTreeMap<VertexId, f64>,
	sink_score: Option<f64>,
	supersteps: usize,
	status: ConvergenceStatus,
	history: Vec<SuperstepStats>,
}

impl Propagation {
	/// Final score of every rated vertex.
	pub fn scores(&self) -> &BTreeMap<VertexId, f64> {
		&self.scores
	}

	/// Consumes the result, keeping the scores.
	pub fn into_scores(self) -> BTreeMap<VertexId, f64> {
		self.scores
	}

	/// Final score of `id`.
	pub fn score(&self, id: VertexId) -> Option<f64> {
		self.scores.get(&id).copied()
	}

	/// Mass held by the sink, if the graph had one.
	pub fn sink_score(&self) -> Option<f64> {
		self.sink_score
	}

	/// Number of supersteps executed.
	pub fn supersteps(&self) -> usize {
		self.supersteps
	}

	/// How the run ended.
	pub fn status(&self) -> &ConvergenceStatus {
		&self.status
	}

	/// Whether every vertex went quiet before the cap.
	pub fn is_converged(&self) -> bool {
		self.status == ConvergenceStatus::Converged
	}

	/// The non-convergence warning, if any.
	pub fn warning(&self) -> Option<&NonConvergenceWarning> {
		match &self.status {
			ConvergenceStatus::Converged => None,
			ConvergenceStatus::NotConverged(warning) => Some(warning),
		}
	}

	/// Per-superstep statistics, in order.
	pub fn history(&self) -> &[SuperstepStats] {
		&self.history
	}
}

/// Runs supersteps over a fixed pool of workers.
pub struct PropagationEngine {
	params: EngineParams,
	pool: ThreadPool,
}

impl PropagationEngine {
	/// Validates `params` and starts the worker pool.
	pub fn new(params: EngineParams) -> Result<Self, TrustError> {
		params.validate()?;

		let pool = ThreadPoolBuilder::new()
			.num_threads(params.num_workers)
			.thread_name(|i| format!("trustrank-worker-{}", i))
			.build()
			.map_err(|e| TrustError::WorkerPoolError(e.to_string()))?;

		Ok(Self { params, pool })
	}

	/// Gets params.
	pub fn params(&self) -> &EngineParams {
		&self.params
	}

	/// Propagates trust from the seed until every vertex is quiet or the cap is hit.
	pub fn run(&self, graph: PropagationGraph) -> Propagation {
		let EngineParams { reset_prob, tol, max_iterations, num_workers } = self.params;
		let (topology, mut current) = graph.into_parts();
		let vertex_count = topology.vertex_count();
		let partitioning = Partitioning::new(vertex_count, num_workers);
		let chunk_len = partitioning.chunk_len();

		let mut next: VertexTable = current.clone();
		let mut next_active = vec![false; vertex_count];
		let mut tracker = ConvergenceTracker::new(vertex_count, tol);
		let mut history = Vec::new();

		info!(
			"Propagating over {} vertices in {} partitions (reset {}, tol {:e}, cap {})",
			vertex_count,
			partitioning.num_partitions(),
			reset_prob,
			tol,
			max_iterations
		);

		for superstep in 0..max_iterations {
			let program = VertexProgram {
				topology: &topology,
				old: &current,
				tracker: &tracker,
				reset_prob,
				// Superstep 0 has no edge messages yet, everyone gets 1/N.
				broadcast: (superstep == 0).then(|| 1.0 / vertex_count as f64),
			};

			self.pool.install(|| {
				next.scores
					.par_chunks_mut(chunk_len)
					.zip(next.deltas.par_chunks_mut(chunk_len))
					.zip(next_active.par_chunks_mut(chunk_len))
					.enumerate()
					.for_each(|(partition, ((scores, deltas), active))| {
						let start = partitioning.range(partition).start;
						program.compute(start, scores, deltas, active);
					});
			});

			std::mem::swap(&mut current, &mut next);
			tracker.commit(&next_active);

			let stats = SuperstepStats {
				superstep,
				active_vertices: tracker.active_count(),
				total_mass: current.scores.iter().sum(),
				max_delta: current.deltas.iter().copied().fold(0.0, f64::max),
			};
			debug!(
				"Superstep {}: {} active, mass {}, max delta {:e}",
				stats.superstep, stats.active_vertices, stats.total_mass, stats.max_delta
			);
			history.push(stats);

			if tracker.is_converged() {
				break;
			}
		}

		let supersteps = history.len();
		let status = if tracker.is_converged() {
			info!("Converged after {} supersteps", supersteps);
			ConvergenceStatus::Converged
		} else {
			let warning = NonConvergenceWarning {
				supersteps,
				active_vertices: tracker.active_count(),
				max_delta: history.last().map_or(f64::INFINITY, |stats| stats.max_delta),
			};
			warn!("{}", warning);
			ConvergenceStatus::NotConverged(warning)
		};

		let mut scores = BTreeMap::new();
		let mut sink_score = None;
		for (key, &score) in topology.keys().iter().zip(&current.scores) {
			match key {
				VertexKey::Peer(id) => {
					scores.insert(*id, score);
				},
				VertexKey::Sink => sink_score = Some(score),
			}
		}

		Propagation { scores, sink_score, supersteps, status, history }
	}
}

/// Propagates trust over `graph` with the default worker count.
pub fn run(
	graph: PropagationGraph, reset_prob: f64, tol: f64, max_iterations: usize,
) -> Result<Propagation, TrustError> {
	let engine = PropagationEngine::new(EngineParams::new(reset_prob, tol, max_iterations))?;
	Ok(engine.run(graph))
}

/// Read-only view shared by the workers during one superstep.
struct VertexProgram<'a> {
	topology: &'a Topology,
	old: &'a VertexTable,
	tracker: &'a ConvergenceTracker,
	reset_prob: f64,
	broadcast: Option<f64>,
}

impl VertexProgram<'_> {
	/// Updates one partition, starting at vertex index `start`.
	fn compute(&self, start: usize, scores: &mut [f64], deltas: &mut [f64], active: &mut [bool]) {
		let seed = self.topology.seed_index();
		let slots = scores.iter_mut().zip(deltas.iter_mut()).zip(active.iter_mut());

		for (offset, ((score, delta), active)) in slots.enumerate() {
			let index = start + offset;
			let old_score = self.old.scores[index];

			// Quiet vertices keep their state and their last message stands.
			if !self.tracker.is_active(index) {
				*score = old_score;
				*delta = self.old.deltas[index];
				*active = false;
				continue;
			}

			let msg_sum = match self.broadcast {
				Some(message) => message,
				None => self
					.topology
					.incoming(index)
					.map(|(src, weight)| self.old.scores[src] * weight)
					.sum(),
			};
			let seed_indicator = if index == seed { 1.0 } else { 0.0 };
			let new_score = self.reset_prob * seed_indicator + (1.0 - self.reset_prob) * msg_sum;
			let new_delta = (new_score - old_score).abs();

			*score = new_score;
			*delta = new_delta;
			*active = self.tracker.stays_active(new_delta);
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::graph::{build, Rating};

	fn cycle() -> Vec<Rating> {
		vec![Rating::new(0, 1, 1.0), Rating::new(1, 2, 1.0), Rating::new(2, 0, 1.0)]
	}

	fn mesh() -> Vec<Rating> {
		let mut ratings = Vec::new();
		for i in 0..40i64 {
			ratings.push(Rating::new(i, (i * 7 + 3) % 40, ((i * 13) % 5) as f64 + 0.5));
			ratings.push(Rating::new(i, (i * 11 + 1) % 43, 1.0 + (i % 3) as f64));
		}
		ratings
	}

	#[test]
	fn test_full_reset_returns_seed_indicator() {
		let graph = build(&mesh(), 4).unwrap();
		let result = run(graph, 1.0, 1e-9, 100).unwrap();

		assert!(result.is_converged());
		assert_eq!(result.supersteps(), 1);
		for (&id, &score) in result.scores() {
			let expected = if id == 4 { 1.0 } else { 0.0 };
			assert_eq!(score, expected);
		}
		assert_eq!(result.sink_score(), Some(0.0));
	}

	#[test]
	fn test_single_seed_self_loop() {
		for reset_prob in [0.0, 0.15, 0.5, 0.85] {
			let graph = build(&[Rating::new(9, 9, 1.0)], 9).unwrap();
			let result = run(graph, reset_prob, 0.0, 10).unwrap();

			assert!(result.is_converged());
			assert_eq!(result.supersteps(), 1);
			assert_eq!(result.score(9), Some(1.0));
			assert_eq!(result.sink_score(), None);
		}
	}

	#[test]
	fn test_three_cycle_stationary_distribution() {
		let graph = build(&cycle(), 0).unwrap();
		let result = run(graph, 0.1, 1e-6, 1000).unwrap();
		assert!(result.is_converged());

		let s = [result.score(0).unwrap(), result.score(1).unwrap(), result.score(2).unwrap()];
		for i in 0..3 {
			let seed = if i == 0 { 1.0 } else { 0.0 };
			let expected = 0.1 * seed + 0.9 * s[(i + 2) % 3];
			assert!((s[i] - expected).abs() < 1e-4, "vertex {} off: {} vs {}", i, s[i], expected);
		}

		// Closed form: s0 = 0.1 / (1 - 0.9^3).
		let s0 = 0.1 / (1.0 - 0.729);
		assert!((s[0] - s0).abs() < 1e-4);
		assert!(s[0] > s[1] && s[1] > s[2]);
		assert!((s.iter().sum::<f64>() - 1.0).abs() < 1e-4);
	}

	#[test]
	fn test_mass_conserved_without_reset() {
		let ratings = vec![Rating::new(0, 1, 1.0), Rating::new(0, 2, 1.0), Rating::new(1, 2, 1.0)];
		let graph = build(&ratings, 0).unwrap();
		let result = run(graph, 0.0, 0.0, 50).unwrap();

		assert!(result.is_converged());
		for stats in result.history() {
			assert!((stats.total_mass - 1.0).abs() < 1e-12, "superstep {}", stats.superstep);
		}
		// Everything drains into the sink.
		assert_eq!(result.sink_score(), Some(1.0));
		assert!(result.scores().values().all(|&score| score == 0.0));
	}

	#[test]
	fn test_identical_across_runs_and_workers() {
		let reference = {
			let engine = PropagationEngine::new(EngineParams::new(0.2, 1e-10, 500).with_workers(1))
				.unwrap();
			engine.run(build(&mesh(), 0).unwrap())
		};

		for workers in [1, 2, 3, 8] {
			let engine =
				PropagationEngine::new(EngineParams::new(0.2, 1e-10, 500).with_workers(workers))
					.unwrap();
			let result = engine.run(build(&mesh(), 0).unwrap());

			assert_eq!(result.supersteps(), reference.supersteps());
			assert_eq!(result.scores().len(), reference.scores().len());
			for (id, score) in result.scores() {
				assert_eq!(score.to_bits(), reference.scores()[id].to_bits(), "vertex {}", id);
			}
		}
	}

	#[test]
	fn test_cap_returns_best_effort_scores() {
		let graph = build(&cycle(), 0).unwrap();
		let result = run(graph, 0.1, 1e-12, 3).unwrap();

		assert!(!result.is_converged());
		assert_eq!(result.supersteps(), 3);
		let warning = result.warning().unwrap();
		assert_eq!(warning.supersteps, 3);
		assert_eq!(warning.active_vertices, 3);
		assert_eq!(result.scores().len(), 3);
	}

	#[test]
	fn test_active_count_never_grows() {
		let graph = build(&mesh(), 0).unwrap();
		let result = run(graph, 0.15, 1e-8, 1000).unwrap();

		let counts: Vec<usize> = result.history().iter().map(|s| s.active_vertices).collect();
		assert!(counts.windows(2).all(|pair| pair[1] <= pair[0]));
		assert!(result.is_converged());
	}

	#[test]
	fn test_invalid_params_fail_fast() {
		let invalid = [
			EngineParams::new(-0.1, 1e-6, 10),
			EngineParams::new(1.5, 1e-6, 10),
			EngineParams::new(f64::NAN, 1e-6, 10),
			EngineParams::new(0.15, -1.0, 10),
			EngineParams::new(0.15, f64::NAN, 10),
			EngineParams::new(0.15, 1e-6, 0),
			EngineParams::new(0.15, 1e-6, 10).with_workers(0),
		];
		for params in invalid {
			let result = PropagationEngine::new(params);
			assert!(matches!(result, Err(TrustError::ConfigurationError(_))), "{:?}", params);
		}
	}
}
