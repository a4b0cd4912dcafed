mod cli;
mod commands;

use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use obflow_core::{load_config, validate_config, Config, LogFormat};

use cli::{Cli, Command};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match prepare_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            init_logging(LogFormat::Pretty);
            error!("Fatal error: {:#}", e);
            std::process::exit(1);
        }
    };
    init_logging(config.logging.format);

    if let Err(e) = commands::execute(cli.command, config).await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

fn init_logging(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}

fn prepare_config(cli: &Cli) -> Result<Config> {
    if matches!(cli.command, Command::Init) && !cli.config.exists() {
        write_default_config(&cli.config)?;
    }

    let config = load_config(&cli.config)
        .with_context(|| format!("Failed to load config from {:?}", cli.config))?;
    validate_config(&config).context("Configuration validation failed")?;
    Ok(config)
}

fn write_default_config(path: &Path) -> Result<()> {
    let contents =
        toml::to_string_pretty(&Config::default()).context("Failed to render default config")?;
    std::fs::write(path, contents)
        .with_context(|| format!("Failed to write default config to {:?}", path))?;
    eprintln!("Wrote default configuration to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn cli(config: &Path, command: Command) -> Cli {
        Cli {
            config: config.to_path_buf(),
            command,
        }
    }

    #[test]
    fn test_init_writes_default_config() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("obflow.toml");

        let config = prepare_config(&cli(&path, Command::Init)).unwrap();
        assert!(path.exists());
        assert_eq!(config.processor.workers, Config::default().processor.workers);
        assert_eq!(config.data.root, Config::default().data.root);
    }

    #[test]
    fn test_init_keeps_existing_config() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("obflow.toml");
        let contents = "[processor]\nworkers = 7\n";
        std::fs::write(&path, contents).unwrap();

        let config = prepare_config(&cli(&path, Command::Init)).unwrap();
        assert_eq!(config.processor.workers, 7);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), contents);
    }

    #[test]
    fn test_missing_config_is_fatal_outside_init() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("absent.toml");

        assert!(prepare_config(&cli(&path, Command::Stats)).is_err());
        assert!(!path.exists());
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("obflow.toml");
        std::fs::write(&path, "[processor]\nworkers = 0\n").unwrap();

        let err = prepare_config(&cli(&path, Command::Download)).unwrap_err();
        assert!(format!("{:#}", err).contains("validation"));
    }
}
