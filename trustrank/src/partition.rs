//! # Partition Module.
//!
//! Splits the dense vertex index space into contiguous ranges, one per worker.

use std::ops::Range;

/// Contiguous, non-overlapping split of `0..num_vertices`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Partitioning {
	num_vertices: usize,
	chunk_len: usize,
}

impl Partitioning {
	/// Splits `num_vertices` indices over at most `num_workers` partitions.
	pub fn new(num_vertices: usize, num_workers: usize) -> Self {
		let workers = num_workers.max(1);
		let chunk_len = ((num_vertices + workers - 1) / workers).max(1);
		Self { num_vertices, chunk_len }
	}

	/// Number of indices per partition; the last one may be shorter.
	pub fn chunk_len(&self) -> usize {
		self.chunk_len
	}

	/// Number of non-empty partitions.
	pub fn num_partitions(&self) -> usize {
		(self.num_vertices + self.chunk_len - 1) / self.chunk_len
	}

	/// Index range owned by `partition`.
	pub fn range(&self, partition: usize) -> Range<usize> {
		let start = (partition * self.chunk_len).min(self.num_vertices);
		let end = (start + self.chunk_len).min(self.num_vertices);
		start..end
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_every_vertex_covered_once() {
		for (vertices, workers) in [(10, 3), (7, 7), (3, 8), (1, 1), (100, 4)] {
			let partitioning = Partitioning::new(vertices, workers);
			assert!(partitioning.num_partitions() <= workers);

			let mut seen = vec![0; vertices];
			let mut next_start = 0;
			for partition in 0..partitioning.num_partitions() {
				let range = partitioning.range(partition);
				assert_eq!(range.start, next_start);
				assert!(!range.is_empty());
				next_start = range.end;
				for index in range {
					seen[index] += 1;
				}
			}
			assert!(seen.iter().all(|&count| count == 1));
		}
	}

	#[test]
	fn test_ranges() {
		let partitioning = Partitioning::new(10, 3);
		assert_eq!(partitioning.chunk_len(), 4);
		assert_eq!(partitioning.range(0), 0..4);
		assert_eq!(partitioning.range(2), 8..10);
		assert_eq!(partitioning.range(3), 10..10);
	}

	#[test]
	fn test_empty() {
		let partitioning = Partitioning::new(0, 4);
		assert_eq!(partitioning.num_partitions(), 0);
		assert_eq!(partitioning.range(0), 0..0);
	}
}
