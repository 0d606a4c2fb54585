//! # Convergence Module.
//!
//! Tracks which vertices are still active. A vertex stays active while its last
//! update moved its score by more than the tolerance, and once it goes quiet it
//! never comes back.

/// Per-vertex active flags plus their running count.
#[derive(Clone, Debug)]
pub struct ConvergenceTracker {
	tol: f64,
	active: Vec<bool>,
	active_count: usize,
}

impl ConvergenceTracker {
	/// Starts with every one of `vertex_count` vertices active.
	pub fn new(vertex_count: usize, tol: f64) -> Self {
		Self { tol, active: vec![true; vertex_count], active_count: vertex_count }
	}

	/// The policy: an update of `delta` keeps its vertex active.
	///
	/// A NaN delta never counts as settled.
	pub fn stays_active(&self, delta: f64) -> bool {
		delta > self.tol || delta.is_nan()
	}

	/// Whether the vertex at `index` is active.
	pub fn is_active(&self, index: usize) -> bool {
		self.active[index]
	}

	/// Active flags in index order.
	pub fn active(&self) -> &[bool] {
		&self.active
	}

	/// Number of vertices still active.
	pub fn active_count(&self) -> usize {
		self.active_count
	}

	/// Whether every vertex has gone quiet.
	pub fn is_converged(&self) -> bool {
		self.active_count == 0
	}

	/// Applies the flags computed during a superstep.
	///
	/// A vertex that was already inactive stays inactive whatever `next` says.
	pub fn commit(&mut self, next: &[bool]) {
		debug_assert_eq!(next.len(), self.active.len());
		let mut count = 0;
		for (current, &stays) in self.active.iter_mut().zip(next) {
			*current = *current && stays;
			count += usize::from(*current);
		}
		self.active_count = count;
	}
}
