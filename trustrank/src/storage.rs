//! # Storage Module.
//!
//! This module contains generic storage traits and implementations, along with
//! the records used to read ratings and persist scores.

use crate::{error::TrustError, graph::Rating, Score, VertexId};
use csv::{ReaderBuilder, WriterBuilder};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{from_reader, to_string_pretty};
use std::{
	fs::File,
	io::{BufReader, Write},
	marker::PhantomData,
	path::PathBuf,
};

/// The main trait to be implemented by different storage types.
pub trait Storage<T> {
	/// The error type.
	type Err;

	/// Loads data from storage.
	fn load(&self) -> Result<T, Self::Err>;
	/// Saves data to storage, replacing what was there.
	fn save(&mut self, data: T) -> Result<(), Self::Err>;
}

/// The `CSVFileStorage` struct provides a mechanism for persisting
/// and retrieving structured data to and from CSV files.
///
/// # Examples
///
/// ```no_run
/// use std::path::PathBuf;
/// use trustrank::storage::{CSVFileStorage, RatingRecord, Storage};
///
/// let filepath = PathBuf::from("/path/to/ratings.csv");
/// let mut storage = CSVFileStorage::<RatingRecord>::new(filepath);
///
/// let data = vec![RatingRecord::new(1, 2, 0.5)];
///
/// // Save the data to the CSV file.
/// storage.save(data.clone()).unwrap();
///
/// // Load the data from the CSV file.
/// let loaded_data = storage.load().unwrap();
/// assert_eq!(data, loaded_data);
/// ```
pub struct CSVFileStorage<T> {
	filepath: PathBuf,
	phantom: PhantomData<T>,
}

impl<T> CSVFileStorage<T> {
	/// Creates a new CSVFileStorage.
	pub fn new(filepath: PathBuf) -> Self {
		Self { filepath, phantom: PhantomData }
	}

	/// Returns the path to the file.
	pub fn filepath(&self) -> &PathBuf {
		&self.filepath
	}
}

impl<T: Serialize + DeserializeOwned> Storage<Vec<T>> for CSVFileStorage<T> {
	type Err = TrustError;

	fn load(&self) -> Result<Vec<T>, TrustError> {
		let file = File::open(&self.filepath).map_err(TrustError::IOError)?;
		let mut reader = ReaderBuilder::new().trim(csv::Trim::All).from_reader(BufReader::new(file));

		reader
			.deserialize()
			.map(|result| result.map_err(|e| TrustError::FileIOError(e.to_string())))
			.collect()
	}

	fn save(&mut self, data: Vec<T>) -> Result<(), TrustError> {
		let mut writer = WriterBuilder::new()
			.from_path(&self.filepath)
			.map_err(|e| TrustError::FileIOError(e.to_string()))?;

		for record in &data {
			writer.serialize(record).map_err(|e| TrustError::FileIOError(e.to_string()))?;
		}

		writer.flush().map_err(TrustError::IOError)
	}
}

/// The `JSONFileStorage` struct provides a mechanism for persisting
/// and retrieving structured data to and from JSON files.
pub struct JSONFileStorage<T> {
	filepath: PathBuf,
	phantom: PhantomData<T>,
}

impl<T> JSONFileStorage<T> {
	/// Creates a new JSONFileStorage.
	pub fn new(filepath: PathBuf) -> Self {
		Self { filepath, phantom: PhantomData }
	}

	/// Returns the path to the file.
	pub fn filepath(&self) -> &PathBuf {
		&self.filepath
	}
}

impl<T: Serialize + DeserializeOwned> Storage<T> for JSONFileStorage<T> {
	type Err = TrustError;

	fn load(&self) -> Result<T, Self::Err> {
		let file = File::open(&self.filepath).map_err(TrustError::IOError)?;
		let reader = BufReader::new(file);
		from_reader(reader).map_err(|e| TrustError::ParsingError(e.to_string()))
	}

	fn save(&mut self, data: T) -> Result<(), Self::Err> {
		let json_str =
			to_string_pretty(&data).map_err(|e| TrustError::ParsingError(e.to_string()))?;

		let mut file = File::create(&self.filepath).map_err(TrustError::IOError)?;
		file.write_all(json_str.as_bytes()).map_err(TrustError::IOError)
	}
}

/// Rating record, one row of the ratings table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RatingRecord {
	/// Id of the rating user.
	src_id: VertexId,
	/// Id of the rated user.
	dst_id: VertexId,
	/// Rating weight.
	weight: f64,
}

impl RatingRecord {
	/// Creates a new rating record.
	pub fn new(src_id: VertexId, dst_id: VertexId, weight: f64) -> Self {
		Self { src_id, dst_id, weight }
	}
}

impl From<RatingRecord> for Rating {
	fn from(record: RatingRecord) -> Self {
		Rating::new(record.src_id, record.dst_id, record.weight)
	}
}

impl From<Rating> for RatingRecord {
	fn from(rating: Rating) -> Self {
		Self::new(rating.src, rating.dst, rating.weight)
	}
}

/// Score record, one row of the results table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScoreRecord {
	/// The user's id.
	user_id: VertexId,
	/// The user's trust score.
	score: f64,
}

impl ScoreRecord {
	/// Creates a new score record.
	pub fn new(user_id: VertexId, score: f64) -> Self {
		Self { user_id, score }
	}

	/// Creates a new score record from a score.
	pub fn from_score(score: Score) -> Self {
		Self::new(score.vertex_id, score.score)
	}

	/// Returns the user's id.
	pub fn user_id(&self) -> VertexId {
		self.user_id
	}

	/// Returns the score.
	pub fn score(&self) -> f64 {
		self.score
	}
}

#[cfg(test)]
mod tests {
	use crate::storage::*;
	use std::{env::temp_dir, fs};

	#[derive(Debug, Deserialize, PartialEq, Clone, Serialize)]
	struct Record {
		user_id: i64,
		score: u32,
	}

	#[test]
	fn test_csv_file_storage() {
		let filepath = temp_dir().join("trustrank-storage-test.csv");
		let mut csv_storage = CSVFileStorage::<RatingRecord>::new(filepath.clone());

		let content = vec![RatingRecord::new(1, 2, 0.5), RatingRecord::new(-3, 1, 2.0)];

		assert!(csv_storage.save(content.clone()).is_ok());

		let records = csv_storage.load().unwrap();
		assert_eq!(records, content);

		let ratings: Vec<Rating> = records.into_iter().map(Rating::from).collect();
		assert_eq!(ratings[1], Rating::new(-3, 1, 2.0));

		fs::remove_file(filepath).unwrap();
	}

	#[test]
	fn test_csv_save_overwrites() {
		let filepath = temp_dir().join("trustrank-storage-overwrite.csv");
		let mut csv_storage = CSVFileStorage::<ScoreRecord>::new(filepath.clone());

		csv_storage.save(vec![ScoreRecord::new(1, 0.5), ScoreRecord::new(2, 0.5)]).unwrap();
		csv_storage.save(vec![ScoreRecord::new(3, 1.0)]).unwrap();

		let records = csv_storage.load().unwrap();
		assert_eq!(records, vec![ScoreRecord::new(3, 1.0)]);

		let raw = fs::read_to_string(&filepath).unwrap();
		assert!(raw.starts_with("user_id,score"));

		fs::remove_file(filepath).unwrap();
	}

	#[test]
	fn test_csv_rejects_malformed_rows() {
		let filepath = temp_dir().join("trustrank-storage-malformed.csv");
		fs::write(&filepath, "src_id,dst_id,weight\n1,2,abc\n").unwrap();

		let result = CSVFileStorage::<RatingRecord>::new(filepath.clone()).load();
		assert!(matches!(result, Err(TrustError::FileIOError(_))));

		fs::remove_file(filepath).unwrap();
	}

	#[test]
	fn test_json_file_storage() {
		let filepath = temp_dir().join("trustrank-storage-test.json");
		let mut json_storage = JSONFileStorage::<Record>::new(filepath.clone());

		let content = Record { user_id: 42, score: 1000 };

		assert!(json_storage.save(content.clone()).is_ok());

		let record = json_storage.load().unwrap();
		assert_eq!(record, content);

		fs::remove_file(filepath).unwrap();
	}

	#[test]
	fn test_missing_file() {
		let filepath = temp_dir().join("trustrank-storage-missing.json");
		let result = JSONFileStorage::<Record>::new(filepath).load();
		assert!(matches!(result, Err(TrustError::IOError(_))));
	}
}
