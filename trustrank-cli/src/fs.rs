//! # Filesystem Actions Module.
//!
//! This module provides functionalities for filesystem actions.

use dotenv::var;
use log::debug;
use std::{env::current_dir, path::PathBuf};
use trustrank::{
	error::TrustError,
	storage::{JSONFileStorage, Storage},
	EngineConfig,
};

/// Library configuration file name.
pub const CONFIG_FILENAME: &str = "config";
/// Ratings file name.
pub const RATINGS_FILENAME: &str = "ratings";
/// Scores file name.
pub const SCORES_FILENAME: &str = "scores";
/// Environment variable overriding the assets directory.
pub const ASSETS_ENV_VAR: &str = "TRUSTRANK_ASSETS";

/// Enum representing the possible file extensions.
pub enum FileType {
	/// CSV file.
	Csv,
	/// JSON file.
	Json,
}

impl FileType {
	/// Converts the enum variant into its corresponding file extension.
	fn as_str(&self) -> &'static str {
		match self {
			FileType::Csv => "csv",
			FileType::Json => "json",
		}
	}
}

/// Retrieves the path to the `assets` directory.
pub fn get_assets_path() -> Result<PathBuf, TrustError> {
	if let Ok(assets) = var(ASSETS_ENV_VAR) {
		debug!("Using assets directory from {}: {}", ASSETS_ENV_VAR, assets);
		return Ok(PathBuf::from(assets));
	}

	current_dir().map_err(TrustError::IOError).map(|current_dir| {
		// Workaround for the tests running in the `trustrank-cli` directory.
		#[cfg(test)]
		{
			current_dir.join("assets")
		}

		#[cfg(not(test))]
		{
			current_dir.join("trustrank-cli/assets")
		}
	})
}

/// Helper function to get the path of a file in the `assets` directory.
pub fn get_file_path(file_name: &str, file_type: FileType) -> Result<PathBuf, TrustError> {
	let assets_path = get_assets_path()?;
	Ok(assets_path.join(format!("{}.{}", file_name, file_type.as_str())))
}

/// Loads the configuration file.
pub fn load_config() -> Result<EngineConfig, TrustError> {
	let filepath = get_file_path(CONFIG_FILENAME, FileType::Json)?;
	JSONFileStorage::<EngineConfig>::new(filepath).load()
}

/// Saves the configuration file.
pub fn save_config(config: EngineConfig) -> Result<(), TrustError> {
	let filepath = get_file_path(CONFIG_FILENAME, FileType::Json)?;
	JSONFileStorage::<EngineConfig>::new(filepath).save(config)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_file_path_extension() {
		let path = get_file_path(SCORES_FILENAME, FileType::Csv).unwrap();
		assert_eq!(path.file_name().unwrap(), "scores.csv");
		assert_eq!(path.parent().unwrap(), get_assets_path().unwrap());
	}

	#[test]
	fn test_load_bundled_config() {
		let config = load_config().unwrap();
		assert_eq!(config.seed_id, 1);
		assert!(config.params().validate().is_ok());
	}
}
