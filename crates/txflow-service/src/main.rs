//! Main entry point for the txflow orchestration service.
//!
//! This binary loads a configuration file, builds the orchestrator with
//! the configured chain client, binds the configured contracts and then
//! drains the transaction queue on a fixed interval until interrupted.

use clap::Parser;
use std::path::PathBuf;
use txflow_config::Config;
use txflow_core::{Orchestrator, OrchestratorBuilder};

/// Command-line arguments for the orchestration service.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
	/// Path to configuration file
	#[arg(short, long, default_value = "config/txflow.toml")]
	config: PathBuf,

	/// Log level (trace, debug, info, warn, error)
	#[arg(short, long, default_value = "info")]
	log_level: String,
}

/// Main entry point for the orchestration service.
///
/// This function:
/// 1. Parses command-line arguments
/// 2. Initializes logging infrastructure
/// 3. Loads configuration from file
/// 4. Builds the orchestrator and binds configured contracts
/// 5. Runs until interrupted
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	use tracing_subscriber::{fmt, EnvFilter};

	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

	fmt()
		.with_env_filter(env_filter)
		.with_thread_ids(true)
		.with_target(true)
		.init();

	tracing::info!("Started txflow");

	let config_path = args
		.config
		.to_str()
		.ok_or("Configuration path is not valid UTF-8")?;
	let config = Config::from_file(config_path).await?;
	tracing::info!("Loaded configuration [{}]", config.orchestrator.id);

	let orchestrator = build_orchestrator(config)?;
	orchestrator.initialize().await?;
	orchestrator.run().await?;

	tracing::info!("Stopped txflow");
	Ok(())
}

/// Macro to create a factory HashMap with the appropriate type aliases
macro_rules! create_factory_map {
    ($interface:path, $error:path, $( $name:expr => $factory:expr ),* $(,)?) => {{
        let mut factories = std::collections::HashMap::new();
        $(
            factories.insert(
                $name.to_string(),
                $factory as fn(&toml::Value) -> Result<Box<dyn $interface>, $error>
            );
        )*
        factories
    }};
}

/// Builds the orchestrator with every chain client implementation
/// available to this binary.
fn build_orchestrator(config: Config) -> Result<Orchestrator, Box<dyn std::error::Error>> {
	use txflow_chain::implementations::memory;
	use txflow_types::ImplementationRegistry;

	let chain_factories = create_factory_map!(
		txflow_chain::ChainClient,
		txflow_chain::ChainError,
		memory::Registry::NAME => memory::create_chain,
	);

	Ok(OrchestratorBuilder::new(config)
		.with_chain_factories(chain_factories)
		.build()?)
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::tempdir;

	#[test]
	fn test_args_default_values() {
		let args = Args::parse_from(["txflow"]);

		assert_eq!(args.config, PathBuf::from("config/txflow.toml"));
		assert_eq!(args.log_level, "info");
	}

	#[test]
	fn test_args_custom_values() {
		let args = Args::parse_from(["txflow", "--config", "custom.toml", "-l", "debug"]);

		assert_eq!(args.config, PathBuf::from("custom.toml"));
		assert_eq!(args.log_level, "debug");
	}

	#[test]
	fn test_create_factory_map_macro() {
		let factories = create_factory_map!(
			txflow_chain::ChainClient,
			txflow_chain::ChainError,
			"memory" => txflow_chain::implementations::memory::create_chain,
		);

		assert_eq!(factories.len(), 1);
		assert!(factories.contains_key("memory"));
	}

	#[tokio::test]
	async fn test_build_orchestrator_from_file() {
		let temp_dir = tempdir().unwrap();
		let config_path = temp_dir.path().join("txflow.toml");

		let config_content = r#"
[orchestrator]
id = "file-orchestrator"

[monitor]
poll_interval_ms = 2000

[chain]
primary = "memory"

[chain.implementations.memory]
confirmation_polls = 2

[[contracts]]
name = "vault"
id = "SP2J6ZY48GV1EZ5V2V5RB9MP66SW86PYKKNRV9EJ7.token-vault"
monitor_health = false
"#;
		std::fs::write(&config_path, config_content).unwrap();

		let config = Config::from_file(config_path.to_str().unwrap())
			.await
			.unwrap();
		assert_eq!(config.monitor.poll_interval_ms, 2000);

		let orchestrator = build_orchestrator(config).unwrap();
		orchestrator.initialize().await.unwrap();
		assert_eq!(orchestrator.config().orchestrator.id, "file-orchestrator");
		assert!(orchestrator.contract("vault").await.unwrap().is_some());
		orchestrator.shutdown().await.unwrap();
	}

	#[test]
	fn test_build_orchestrator_with_unknown_primary_fails() {
		let mut config = txflow_config::ConfigBuilder::new().build();
		config.chain.primary = "rpc".into();
		config.chain.implementations.insert(
			"rpc".into(),
			toml::Value::Table(toml::map::Map::new()),
		);
		config.chain.implementations.remove("memory");

		assert!(build_orchestrator(config).is_err());
	}
}
