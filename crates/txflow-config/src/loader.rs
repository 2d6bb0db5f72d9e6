//! Loader for configurations split over several files.
//!
//! A file may name other files with a top-level `include` key, either a
//! single path or an array of paths, resolved against the directory of the
//! entry file. Included files are merged section by section and a
//! top-level section may only be defined once across the whole set.

use crate::{resolve_env_vars, Config, ConfigError};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

/// Loads a configuration file together with its includes.
pub struct ConfigLoader {
	/// Directory relative includes are resolved against.
	base_path: PathBuf,
	/// Canonical paths already read, used to reject include cycles.
	visited: HashSet<PathBuf>,
	/// File each top-level section was first defined in.
	section_origins: HashMap<String, PathBuf>,
}

impl ConfigLoader {
	pub fn new(base_path: impl AsRef<Path>) -> Self {
		Self {
			base_path: base_path.as_ref().to_path_buf(),
			visited: HashSet::new(),
			section_origins: HashMap::new(),
		}
	}

	/// Reads the entry file, merges every include and validates the result.
	pub async fn load_config(
		&mut self,
		config_path: impl AsRef<Path>,
	) -> Result<Config, ConfigError> {
		let entry_path = self.locate(config_path.as_ref())?;
		let entry_source = self.read(&entry_path).await?;
		let mut merged: toml::Table = toml::from_str(&entry_source)?;

		let includes = match merged.remove("include") {
			Some(value) => include_paths(value)?,
			None => return entry_source.parse(),
		};

		for key in merged.keys() {
			self.section_origins.insert(key.clone(), entry_path.clone());
		}

		for include in includes {
			let include_path = self.locate(&include)?;
			let source = self.read(&include_path).await?;
			let table: toml::Table = toml::from_str(&source)?;
			self.merge(&mut merged, table, &include_path)?;
		}

		let combined = toml::to_string(&merged).map_err(|e| {
			ConfigError::Parse(format!("Failed to serialize combined config: {}", e))
		})?;
		combined.parse()
	}

	fn merge(
		&mut self,
		merged: &mut toml::Table,
		table: toml::Table,
		origin: &Path,
	) -> Result<(), ConfigError> {
		for (key, value) in table {
			if let Some(first) = self.section_origins.get(&key) {
				return Err(ConfigError::Validation(format!(
					"Duplicate section '{}' found in {} and {}. \
					Each top-level section must be unique across all configuration files.",
					key,
					first.display(),
					origin.display()
				)));
			}
			self.section_origins.insert(key.clone(), origin.to_path_buf());
			merged.insert(key, value);
		}
		Ok(())
	}

	/// Reads a file once, with environment variables substituted.
	async fn read(&mut self, path: &Path) -> Result<String, ConfigError> {
		let canonical = tokio::fs::canonicalize(path).await.map_err(|e| {
			ConfigError::Io(std::io::Error::new(
				std::io::ErrorKind::NotFound,
				format!("Cannot resolve path {}: {}", path.display(), e),
			))
		})?;

		if !self.visited.insert(canonical.clone()) {
			return Err(ConfigError::Validation(format!(
				"Circular include detected: {} was already loaded",
				canonical.display()
			)));
		}

		let content = tokio::fs::read_to_string(&canonical).await?;
		resolve_env_vars(&content)
	}

	fn locate(&self, path: &Path) -> Result<PathBuf, ConfigError> {
		let resolved = if path.is_absolute() {
			path.to_path_buf()
		} else {
			self.base_path.join(path)
		};

		if !resolved.exists() {
			return Err(ConfigError::Io(std::io::Error::new(
				std::io::ErrorKind::NotFound,
				format!("Configuration file not found: {}", resolved.display()),
			)));
		}
		Ok(resolved)
	}
}

fn include_paths(value: toml::Value) -> Result<Vec<PathBuf>, ConfigError> {
	match value {
		toml::Value::String(path) => Ok(vec![PathBuf::from(path)]),
		toml::Value::Array(items) => items
			.into_iter()
			.map(|item| match item {
				toml::Value::String(path) => Ok(PathBuf::from(path)),
				_ => Err(ConfigError::Validation(
					"Include array must contain only strings".into(),
				)),
			})
			.collect(),
		_ => Err(ConfigError::Validation(
			"Include must be a string or array of strings".into(),
		)),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::fs;
	use tempfile::TempDir;

	const CHAIN_SECTION: &str = r#"
[chain]
primary = "memory"
[chain.implementations.memory]
"#;

	#[tokio::test]
	async fn test_single_file_config() {
		let temp_dir = TempDir::new().unwrap();
		let config_path = temp_dir.path().join("config.toml");
		let content = format!(
			"[orchestrator]\nid = \"single\"\n\n[retry]\nmax_attempts = 4\n{}",
			CHAIN_SECTION
		);
		fs::write(&config_path, content).unwrap();

		let mut loader = ConfigLoader::new(temp_dir.path());
		let config = loader.load_config(&config_path).await.unwrap();

		assert_eq!(config.orchestrator.id, "single");
		assert_eq!(config.retry.max_attempts, 4);
	}

	#[tokio::test]
	async fn test_config_with_includes() {
		let temp_dir = TempDir::new().unwrap();

		let main_config = r#"
include = ["chain.toml", "contracts.toml"]

[orchestrator]
id = "split"
"#;
		let contracts_config = r#"
[[contracts]]
name = "vault"
id = "SP2J6ZY48GV1EZ5V2V5RB9MP66SW86PYKKNRV9EJ7.token-vault"
"#;

		fs::write(temp_dir.path().join("main.toml"), main_config).unwrap();
		fs::write(temp_dir.path().join("chain.toml"), CHAIN_SECTION).unwrap();
		fs::write(temp_dir.path().join("contracts.toml"), contracts_config).unwrap();

		let mut loader = ConfigLoader::new(temp_dir.path());
		let config = loader.load_config("main.toml").await.unwrap();

		assert_eq!(config.orchestrator.id, "split");
		assert_eq!(config.chain.primary, "memory");
		assert_eq!(config.contracts.len(), 1);
		assert_eq!(config.contracts[0].name, "vault");
	}

	#[tokio::test]
	async fn test_single_include_string() {
		let temp_dir = TempDir::new().unwrap();
		let main_config = "include = \"chain.toml\"\n\n[orchestrator]\nid = \"one\"\n";

		fs::write(temp_dir.path().join("main.toml"), main_config).unwrap();
		fs::write(temp_dir.path().join("chain.toml"), CHAIN_SECTION).unwrap();

		let mut loader = ConfigLoader::new(temp_dir.path());
		let config = loader.load_config("main.toml").await.unwrap();
		assert_eq!(config.orchestrator.id, "one");
	}

	#[tokio::test]
	async fn test_duplicate_section_error() {
		let temp_dir = TempDir::new().unwrap();

		let main_config = format!(
			"include = [\"duplicate.toml\"]\n\n[orchestrator]\nid = \"a\"\n{}",
			CHAIN_SECTION
		);
		let duplicate_config = "[orchestrator]\nid = \"b\"\n";

		fs::write(temp_dir.path().join("main.toml"), main_config).unwrap();
		fs::write(temp_dir.path().join("duplicate.toml"), duplicate_config).unwrap();

		let mut loader = ConfigLoader::new(temp_dir.path());
		let error_msg = loader
			.load_config("main.toml")
			.await
			.unwrap_err()
			.to_string();

		assert!(error_msg.contains("Duplicate section 'orchestrator'"));
	}

	#[tokio::test]
	async fn test_self_include_detection() {
		let temp_dir = TempDir::new().unwrap();
		let config = "include = [\"self.toml\"]\n\n[orchestrator]\nid = \"loop\"\n";
		fs::write(temp_dir.path().join("self.toml"), config).unwrap();

		let mut loader = ConfigLoader::new(temp_dir.path());
		let error_msg = loader
			.load_config("self.toml")
			.await
			.unwrap_err()
			.to_string();

		assert!(error_msg.contains("already loaded"));
	}

	#[tokio::test]
	async fn test_missing_include() {
		let temp_dir = TempDir::new().unwrap();
		let config = "include = [\"absent.toml\"]\n\n[orchestrator]\nid = \"x\"\n";
		fs::write(temp_dir.path().join("main.toml"), config).unwrap();

		let mut loader = ConfigLoader::new(temp_dir.path());
		let error_msg = loader
			.load_config("main.toml")
			.await
			.unwrap_err()
			.to_string();
		assert!(error_msg.contains("not found"));
	}
}
