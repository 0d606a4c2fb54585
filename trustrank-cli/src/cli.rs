//! # CLI Module.
//!
//! This module contains all CLI related data handling and conversions.

use crate::fs::{get_file_path, save_config, FileType, RATINGS_FILENAME, SCORES_FILENAME};
use clap::{Args, Parser, Subcommand};
use log::info;
use std::str::FromStr;
use trustrank::{
	error::TrustError,
	graph::Rating,
	storage::{CSVFileStorage, RatingRecord, ScoreRecord, Storage},
	Client, EngineConfig,
};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
	#[command(subcommand)]
	pub mode: Mode,
}

/// CLI commands.
#[derive(Subcommand)]
pub enum Mode {
	/// Calculate the trust scores from the saved ratings.
	Scores,
	/// Display the current configuration.
	Show,
	/// Update the configuration. Requires 'UpdateData'.
	Update(UpdateData),
}

/// Configuration update subcommand input.
#[derive(Args, Debug, Default)]
pub struct UpdateData {
	/// Id of the trusted seed vertex.
	#[clap(long = "seed")]
	seed_id: Option<String>,
	/// Reset (teleport) probability, in [0, 1].
	#[clap(long = "reset-prob")]
	reset_prob: Option<String>,
	/// Per-vertex convergence tolerance.
	#[clap(long = "tol")]
	tol: Option<String>,
	/// Maximum number of supersteps.
	#[clap(long = "max-iterations")]
	max_iterations: Option<String>,
	/// Number of worker threads.
	#[clap(long = "workers")]
	num_workers: Option<String>,
}

/// Parses a CLI value, naming the offending field on failure.
fn parse_field<T: FromStr>(field: &str, value: &str) -> Result<T, TrustError>
where
	T::Err: std::fmt::Display,
{
	value.parse::<T>().map_err(|e| TrustError::ParsingError(format!("{}: {}", field, e)))
}

/// Handle `scores` command.
pub fn handle_scores(config: EngineConfig) -> Result<(), TrustError> {
	let ratings_fp = get_file_path(RATINGS_FILENAME, FileType::Csv)?;
	let records = CSVFileStorage::<RatingRecord>::new(ratings_fp).load()?;

	// Verify there are ratings
	if records.is_empty() {
		return Err(TrustError::ValidationError("No ratings found.".to_string()));
	}

	let ratings: Vec<Rating> = records.into_iter().map(Rating::from).collect();
	info!("Loaded {} ratings.", ratings.len());

	let client = Client::new(config);
	let score_records: Vec<ScoreRecord> =
		client.calculate_scores(ratings)?.into_iter().map(ScoreRecord::from_score).collect();

	let scores_fp = get_file_path(SCORES_FILENAME, FileType::Csv)?;
	let mut records_storage = CSVFileStorage::<ScoreRecord>::new(scores_fp);
	records_storage.save(score_records)?;

	info!(
		"Scores saved at \"{}\".",
		records_storage.filepath().display()
	);

	Ok(())
}

/// Handle `show` command.
pub fn handle_show(config: &EngineConfig) -> Result<(), TrustError> {
	let json = serde_json::to_string_pretty(config)
		.map_err(|e| TrustError::ParsingError(e.to_string()))?;
	info!("Engine config:\n{}", json);

	Ok(())
}

/// Applies the update to `config` and checks the result, without saving it.
pub fn apply_update(config: &mut EngineConfig, data: UpdateData) -> Result<(), TrustError> {
	let mut updated = config.clone();

	if let Some(seed_id) = data.seed_id {
		updated.seed_id = parse_field("seed", &seed_id)?;
	}

	if let Some(reset_prob) = data.reset_prob {
		updated.reset_prob = parse_field("reset-prob", &reset_prob)?;
	}

	if let Some(tol) = data.tol {
		updated.tol = parse_field("tol", &tol)?;
	}

	if let Some(max_iterations) = data.max_iterations {
		updated.max_iterations = parse_field("max-iterations", &max_iterations)?;
	}

	if let Some(num_workers) = data.num_workers {
		updated.num_workers = parse_field("workers", &num_workers)?;
	}

	updated.params().validate()?;
	*config = updated;

	Ok(())
}

/// Handles the CLI project configuration update.
pub fn handle_update(config: &mut EngineConfig, data: UpdateData) -> Result<(), TrustError> {
	apply_update(config, data)?;
	save_config(config.clone())?;
	info!("Configuration updated.");

	Ok(())
}

#[cfg(test)]
mod tests {
	use crate::cli::{apply_update, Cli, UpdateData};
	use clap::CommandFactory;
	use trustrank::{error::TrustError, EngineConfig};

	#[test]
	fn test_cli() {
		Cli::command().debug_assert()
	}

	#[test]
	fn test_apply_update() {
		let mut config = EngineConfig::new(1);
		let data = UpdateData {
			seed_id: Some("-42".to_string()),
			reset_prob: Some("0.3".to_string()),
			num_workers: Some("2".to_string()),
			..Default::default()
		};

		apply_update(&mut config, data).unwrap();

		assert_eq!(config.seed_id, -42);
		assert_eq!(config.reset_prob, 0.3);
		assert_eq!(config.num_workers, 2);
		assert_eq!(config.tol, EngineConfig::new(1).tol);
	}

	#[test]
	fn test_apply_update_rejects_invalid_values() {
		let mut config = EngineConfig::new(1);

		let data = UpdateData { reset_prob: Some("1.5".to_string()), ..Default::default() };
		let result = apply_update(&mut config, data);
		assert!(matches!(result, Err(TrustError::ConfigurationError(_))));

		let data = UpdateData { tol: Some("tiny".to_string()), ..Default::default() };
		let result = apply_update(&mut config, data);
		assert!(matches!(result, Err(TrustError::ParsingError(_))));

		// A rejected update leaves the configuration untouched.
		assert_eq!(config, EngineConfig::new(1));
	}
}
