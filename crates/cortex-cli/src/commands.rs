use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use cortex_sdk::{dispatch, CortexService};
use cortex_types::Configuration;

use crate::args::{Cli, Commands};

pub fn run(cli: Cli) -> Result<()> {
    init_tracing(cli.log_level);
    let data_dir = expand_tilde(&cli.data_dir);

    match cli.command {
        Commands::Init { path } => init_config(&path),
        Commands::Serve => serve(load_config(cli.config.as_deref(), &data_dir)?),
        Commands::Call { tool, params } => {
            call(load_config(cli.config.as_deref(), &data_dir)?, &tool, &params)
        }
    }
}

fn init_tracing(level: crate::args::LogLevel) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level.to_string()));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Explicit `--config` wins; otherwise the stores live under `data_dir`
/// (created if missing), matching the explicit → derived → default
/// priority chain `Configuration::load` applies to its own `CORTEX_*`
/// environment overrides.
fn load_config(config_path: Option<&Path>, data_dir: &Path) -> Result<Configuration> {
    if let Some(path) = config_path {
        return Configuration::load(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()));
    }

    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("failed to create data dir {}", data_dir.display()))?;
    Ok(Configuration {
        db_path: data_dir.join("cortex.db"),
        diagnostics_db_path: data_dir.join("cortex-diagnostics.db"),
        ..Configuration::default()
    })
}

fn init_config(path: &Path) -> Result<()> {
    let config = Configuration::default();
    let text = toml::to_string_pretty(&config)?;
    std::fs::write(path, text).with_context(|| format!("failed to write {}", path.display()))?;
    println!("wrote default configuration to {}", path.display());
    Ok(())
}

fn serve(config: Configuration) -> Result<()> {
    let service = CortexService::open(config, None, None)?;
    cortex_sdk::run_server(service)?;
    Ok(())
}

fn call(config: Configuration, tool: &str, params: &str) -> Result<()> {
    let service = CortexService::open(config, None, None)?;
    let params: serde_json::Value =
        serde_json::from_str(params).with_context(|| "params must be a JSON object")?;

    match dispatch(&service, tool, params) {
        Ok(result) => {
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        Err(err) => {
            eprintln!("{}", serde_json::to_string_pretty(&err.to_wire())?);
            std::process::exit(1);
        }
    }
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home).join(stripped);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expand_tilde_joins_home_for_leading_tilde_slash() {
        std::env::set_var("HOME", "/home/example");
        assert_eq!(expand_tilde("~/cortex"), PathBuf::from("/home/example/cortex"));
    }

    #[test]
    fn expand_tilde_leaves_absolute_paths_untouched() {
        assert_eq!(expand_tilde("/var/lib/cortex"), PathBuf::from("/var/lib/cortex"));
    }

    #[test]
    fn load_config_without_explicit_path_derives_paths_under_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(None, dir.path()).unwrap();
        assert_eq!(config.db_path, dir.path().join("cortex.db"));
        assert_eq!(config.diagnostics_db_path, dir.path().join("cortex-diagnostics.db"));
    }

    #[test]
    fn init_config_writes_a_loadable_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cortex.toml");
        init_config(&path).unwrap();
        Configuration::load(&path).unwrap();
    }
}
