//! # Graph Module.
//!
//! This module turns raw rating triplets into the propagation graph: duplicate
//! ratings are merged, outgoing weights are normalized, dangling vertices are
//! routed to the sink and the vertex state is seeded.
//!
//! Vertices are addressed by a dense index into flat arrays. Indices follow the
//! ascending order of vertex ids, and the sink, when present, takes the last one.

use crate::{error::TrustError, VertexId};
use log::{debug, info};
use std::{
	collections::{BTreeMap, BTreeSet},
	fmt::{Display, Formatter, Result as FmtResult},
};

/// Weight of the synthetic edges leading into the sink.
pub const SINK_EDGE_WEIGHT: f64 = 1.0;
/// Score given to the seed vertex before the first superstep.
pub const SEED_INITIAL_SCORE: f64 = 1.0;

/// A single rating: `src` rates `dst` with a non-negative `weight`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Rating {
	/// Id of the rating vertex.
	pub src: VertexId,
	/// Id of the rated vertex.
	pub dst: VertexId,
	/// Rating weight.
	pub weight: f64,
}

impl Rating {
	/// Creates a new rating.
	pub fn new(src: VertexId, dst: VertexId, weight: f64) -> Self {
		Self { src, dst, weight }
	}
}

/// Identifies a vertex of the propagation graph.
///
/// The sink is not part of the `VertexId` space, so it can never alias a rated vertex.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum VertexKey {
	/// A vertex that appears in the ratings (or the seed).
	Peer(VertexId),
	/// The synthetic vertex collecting the mass of dangling vertices.
	Sink,
}

impl VertexKey {
	/// Returns the peer id, or `None` for the sink.
	pub fn peer_id(&self) -> Option<VertexId> {
		match self {
			VertexKey::Peer(id) => Some(*id),
			VertexKey::Sink => None,
		}
	}
}

impl Display for VertexKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		match self {
			VertexKey::Peer(id) => write!(f, "Peer({})", id),
			VertexKey::Sink => write!(f, "Sink"),
		}
	}
}

/// Snapshot of a single vertex's state.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Vertex {
	/// Vertex key.
	pub key: VertexKey,
	/// Current trust score.
	pub score: f64,
	/// Last score change, `+inf` before the first superstep.
	pub delta: f64,
	/// Whether this is the seed vertex.
	pub is_seed: bool,
}

/// Immutable adjacency of the propagation graph, stored as compressed rows.
#[derive(Clone, Debug)]
pub struct Topology {
	keys: Vec<VertexKey>,
	out_offsets: Vec<usize>,
	out_targets: Vec<usize>,
	out_weights: Vec<f64>,
	// Transposed rows, ordered by source index.
	in_offsets: Vec<usize>,
	in_sources: Vec<usize>,
	in_weights: Vec<f64>,
	dangling: Vec<usize>,
	seed: usize,
	sink: Option<usize>,
}

impl Topology {
	/// Number of vertices, sink included.
	pub fn vertex_count(&self) -> usize {
		self.keys.len()
	}

	/// Number of normalized edges, synthetic edges included.
	pub fn edge_count(&self) -> usize {
		self.out_targets.len()
	}

	/// Key of the vertex at `index`.
	pub fn key(&self, index: usize) -> VertexKey {
		self.keys[index]
	}

	/// All vertex keys in index order.
	pub fn keys(&self) -> &[VertexKey] {
		&self.keys
	}

	/// Dense index of `key`, if the vertex exists.
	pub fn index_of(&self, key: VertexKey) -> Option<usize> {
		self.keys.binary_search(&key).ok()
	}

	/// The seed vertex.
	pub fn seed(&self) -> VertexKey {
		self.keys[self.seed]
	}

	/// Dense index of the seed vertex.
	pub fn seed_index(&self) -> usize {
		self.seed
	}

	/// The sink, present only when at least one vertex is dangling.
	pub fn sink(&self) -> Option<VertexKey> {
		self.sink.map(|index| self.keys[index])
	}

	/// Dense index of the sink.
	pub fn sink_index(&self) -> Option<usize> {
		self.sink
	}

	/// Vertices that had no outgoing weight in the ratings.
	pub fn dangling(&self) -> Vec<VertexKey> {
		self.dangling.iter().map(|&index| self.keys[index]).collect()
	}

	/// Whether `key` was dangling in the ratings.
	pub fn is_dangling(&self, key: VertexKey) -> bool {
		self.index_of(key).map_or(false, |index| self.dangling.binary_search(&index).is_ok())
	}

	/// Normalized outgoing edges of `key`, ordered by destination.
	pub fn out_edges(&self, key: VertexKey) -> Option<Vec<(VertexKey, f64)>> {
		let index = self.index_of(key)?;
		Some(self.outgoing(index).map(|(dst, weight)| (self.keys[dst], weight)).collect())
	}

	/// Sum of the normalized outgoing weights of `key`.
	pub fn out_weight_sum(&self, key: VertexKey) -> Option<f64> {
		let index = self.index_of(key)?;
		Some(self.outgoing(index).map(|(_, weight)| weight).sum())
	}

	/// Outgoing `(destination index, weight)` pairs of the vertex at `index`.
	pub(crate) fn outgoing(&self, index: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
		let range = self.out_offsets[index]..self.out_offsets[index + 1];
		self.out_targets[range.clone()].iter().copied().zip(self.out_weights[range].iter().copied())
	}

	/// Incoming `(source index, weight)` pairs of the vertex at `index`, by ascending source.
	pub(crate) fn incoming(&self, index: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
		let range = self.in_offsets[index]..self.in_offsets[index + 1];
		self.in_sources[range.clone()].iter().copied().zip(self.in_weights[range].iter().copied())
	}
}

/// Mutable per-vertex state, indexed like the topology.
#[derive(Clone, Debug, PartialEq)]
pub struct VertexTable {
	pub(crate) scores: Vec<f64>,
	pub(crate) deltas: Vec<f64>,
}

impl VertexTable {
	/// Seeds the table: the seed starts at `SEED_INITIAL_SCORE`, the rest at zero,
	/// and every delta at `+inf`.
	pub fn seeded(vertex_count: usize, seed: usize) -> Self {
		let mut scores = vec![0.0; vertex_count];
		scores[seed] = SEED_INITIAL_SCORE;
		Self { scores, deltas: vec![f64::INFINITY; vertex_count] }
	}

	/// Scores in index order.
	pub fn scores(&self) -> &[f64] {
		&self.scores
	}

	/// Deltas in index order.
	pub fn deltas(&self) -> &[f64] {
		&self.deltas
	}

	/// Number of vertices in the table.
	pub fn len(&self) -> usize {
		self.scores.len()
	}

	/// Whether the table is empty.
	pub fn is_empty(&self) -> bool {
		self.scores.is_empty()
	}
}

/// The normalized, seeded graph handed to the propagation engine.
#[derive(Clone, Debug)]
pub struct PropagationGraph {
	topology: Topology,
	state: VertexTable,
}

impl PropagationGraph {
	/// Read-only adjacency.
	pub fn topology(&self) -> &Topology {
		&self.topology
	}

	/// Initial vertex state.
	pub fn state(&self) -> &VertexTable {
		&self.state
	}

	/// State snapshot of the vertex `key`.
	pub fn vertex(&self, key: VertexKey) -> Option<Vertex> {
		let index = self.topology.index_of(key)?;
		Some(Vertex {
			key,
			score: self.state.scores[index],
			delta: self.state.deltas[index],
			is_seed: index == self.topology.seed,
		})
	}

	/// Splits the graph into its immutable topology and its mutable state.
	pub fn into_parts(self) -> (Topology, VertexTable) {
		(self.topology, self.state)
	}
}

/// Collects ratings and builds the propagation graph.
pub struct GraphBuilder {
	seed: VertexId,
	merged: BTreeMap<(VertexId, VertexId), f64>,
	out_degree: BTreeMap<VertexId, usize>,
	vertices: BTreeSet<VertexId>,
	num_ratings: usize,
}

/// Outgoing weight total of one source, taken relative to `scale`.
#[derive(Clone, Copy, Debug)]
struct RowTotal {
	scale: f64,
	sum: f64,
}

impl GraphBuilder {
	/// Creates a builder for a graph seeded at `seed`.
	pub fn new(seed: VertexId) -> Self {
		Self {
			seed,
			merged: BTreeMap::new(),
			out_degree: BTreeMap::new(),
			vertices: BTreeSet::new(),
			num_ratings: 0,
		}
	}

	/// Adds a rating, summing it into any earlier rating of the same ordered pair.
	pub fn add_rating(&mut self, rating: Rating) -> Result<(), TrustError> {
		let Rating { src, dst, weight } = rating;
		if !weight.is_finite() || weight < 0.0 {
			return Err(TrustError::InvalidWeightError(format!(
				"rating {} -> {} has weight {}",
				src, dst, weight
			)));
		}

		let merged = self.merged.get(&(src, dst)).copied().unwrap_or(0.0) + weight;
		if !merged.is_finite() {
			return Err(TrustError::InvalidWeightError(format!(
				"merged weight of {} -> {} overflows",
				src, dst
			)));
		}
		self.merged.insert((src, dst), merged);
		*self.out_degree.entry(src).or_insert(0) += 1;
		self.vertices.insert(src);
		self.vertices.insert(dst);
		self.num_ratings += 1;

		Ok(())
	}

	/// Adds every rating of `ratings`, stopping at the first invalid one.
	pub fn add_ratings<I>(&mut self, ratings: I) -> Result<(), TrustError>
	where
		I: IntoIterator<Item = Rating>,
	{
		ratings.into_iter().try_for_each(|rating| self.add_rating(rating))
	}

	/// Normalizes the merged ratings, resolves dangling vertices and seeds the state.
	pub fn build(mut self) -> Result<PropagationGraph, TrustError> {
		if self.num_ratings == 0 {
			return Err(TrustError::ConfigurationError(format!(
				"seed {} is referenced but the rating graph has no vertices",
				self.seed
			)));
		}
		self.vertices.insert(self.seed);

		let row_totals = self.row_totals();
		let peers: Vec<VertexId> = self.vertices.iter().copied().collect();

		let dangling: Vec<usize> = peers
			.iter()
			.enumerate()
			.filter(|&(_, &id)| {
				let degree = self.out_degree.get(&id).copied().unwrap_or(0);
				let sum = row_totals.get(&id).map_or(0.0, |total| total.sum);
				degree == 0 || sum == 0.0
			})
			.map(|(index, _)| index)
			.collect();

		let mut keys: Vec<VertexKey> = peers.iter().map(|&id| VertexKey::Peer(id)).collect();
		let sink = if dangling.is_empty() {
			None
		} else {
			keys.push(VertexKey::Sink);
			Some(keys.len() - 1)
		};
		let seed = keys
			.binary_search(&VertexKey::Peer(self.seed))
			.map_err(|_| TrustError::ConfigurationError("seed vertex was not indexed".to_string()))?;

		let vertex_count = keys.len();
		let mut out_offsets = Vec::with_capacity(vertex_count + 1);
		let mut out_targets = Vec::new();
		let mut out_weights = Vec::new();
		out_offsets.push(0);

		for (index, key) in keys.iter().enumerate() {
			match key {
				// Self-loop keeps whatever reached the sink inside the graph.
				VertexKey::Sink => {
					out_targets.push(index);
					out_weights.push(SINK_EDGE_WEIGHT);
				},
				VertexKey::Peer(_) if dangling.binary_search(&index).is_ok() => {
					if let Some(sink_index) = sink {
						out_targets.push(sink_index);
						out_weights.push(SINK_EDGE_WEIGHT);
					}
				},
				VertexKey::Peer(id) => {
					let total = row_totals.get(id).copied().unwrap_or(RowTotal { scale: 1.0, sum: 1.0 });
					let row = (*id, VertexId::MIN)..=(*id, VertexId::MAX);
					for (&(_, dst), &weight) in self.merged.range(row) {
						let dst_index = peers.binary_search(&dst).map_err(|_| {
							TrustError::ConfigurationError(format!("vertex {} was not indexed", dst))
						})?;
						out_targets.push(dst_index);
						out_weights.push(weight / total.scale / total.sum);
					}
				},
			}
			out_offsets.push(out_targets.len());
		}

		let (in_offsets, in_sources, in_weights) =
			transpose(vertex_count, &out_offsets, &out_targets, &out_weights);

		for &index in &dangling {
			debug!("Vertex {} is dangling, routed to the sink", keys[index]);
		}
		info!(
			"Built propagation graph: {} vertices, {} edges ({} merged ratings), {} dangling",
			vertex_count,
			out_targets.len(),
			self.merged.len(),
			dangling.len()
		);

		let topology = Topology {
			keys,
			out_offsets,
			out_targets,
			out_weights,
			in_offsets,
			in_sources,
			in_weights,
			dangling,
			seed,
			sink,
		};
		let state = VertexTable::seeded(vertex_count, seed);

		Ok(PropagationGraph { topology, state })
	}

	fn row_totals(&mut self) -> BTreeMap<VertexId, RowTotal> {
		let mut totals: BTreeMap<VertexId, RowTotal> = BTreeMap::new();
		for (&(src, _), &weight) in &self.merged {
			let total = totals.entry(src).or_insert(RowTotal { scale: 1.0, sum: 0.0 });
			total.sum += weight;
			total.scale = total.scale.max(weight);
		}
		for (&src, total) in totals.iter_mut() {
			if total.sum.is_finite() {
				total.scale = 1.0;
				continue;
			}
			// The plain sum overflowed, sum the row relative to its largest weight instead.
			let scale = total.scale;
			let row = (src, VertexId::MIN)..=(src, VertexId::MAX);
			total.sum = self.merged.range(row).map(|(_, &weight)| weight / scale).sum();
		}
		// Ratings out of a zero-sum vertex cannot be normalized, the sink edge replaces them.
		self.merged.retain(|(src, _), _| totals.get(src).map_or(false, |total| total.sum > 0.0));
		totals
	}
}

/// Builds the propagation graph for `ratings`, seeded at `seed`.
pub fn build(ratings: &[Rating], seed: VertexId) -> Result<PropagationGraph, TrustError> {
	let mut builder = GraphBuilder::new(seed);
	builder.add_ratings(ratings.iter().copied())?;
	builder.build()
}

fn transpose(
	vertex_count: usize, out_offsets: &[usize], out_targets: &[usize], out_weights: &[f64],
) -> (Vec<usize>, Vec<usize>, Vec<f64>) {
	let mut in_offsets = vec![0; vertex_count + 1];
	for &dst in out_targets {
		in_offsets[dst + 1] += 1;
	}
	for i in 0..vertex_count {
		in_offsets[i + 1] += in_offsets[i];
	}

	let mut cursor = in_offsets.clone();
	let mut in_sources = vec![0; out_targets.len()];
	let mut in_weights = vec![0.0; out_targets.len()];
	// Sources are visited in ascending order, so every row ends up sorted by source.
	for src in 0..vertex_count {
		for edge in out_offsets[src]..out_offsets[src + 1] {
			let dst = out_targets[edge];
			in_sources[cursor[dst]] = src;
			in_weights[cursor[dst]] = out_weights[edge];
			cursor[dst] += 1;
		}
	}

	(in_offsets, in_sources, in_weights)
}
