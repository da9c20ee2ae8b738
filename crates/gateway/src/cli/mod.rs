pub mod config;

use clap::{Parser, Subcommand};

use cb_domain::config::Config;

/// ChatBridge: an HTTP control plane for messaging sessions.
#[derive(Debug, Parser)]
#[command(name = "chatbridge", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the HTTP server (default when no subcommand is given).
    Serve,
    /// Configuration utilities.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Print version information.
    Version,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Parse the config file and report any errors.
    Validate,
    /// Dump the resolved configuration (with defaults) as TOML.
    Show,
}

// ── Config loading helper ─────────────────────────────────────────────

/// Load the configuration from the path specified by `CB_CONFIG` (or
/// `config.toml` by default), then apply the `PORT` override. Returns the
/// parsed [`Config`] and the path that was used.
pub fn load_config() -> anyhow::Result<(Config, String)> {
    let config_path =
        std::env::var("CB_CONFIG").unwrap_or_else(|_| "config.toml".into());

    let raw = if std::path::Path::new(&config_path).exists() {
        Some(
            std::fs::read_to_string(&config_path)
                .map_err(|e| anyhow::anyhow!("reading {config_path}: {e}"))?,
        )
    } else {
        None
    };

    let config = parse_config(raw.as_deref(), std::env::var("PORT").ok().as_deref())
        .map_err(|e| anyhow::anyhow!("{config_path}: {e}"))?;

    Ok((config, config_path))
}

/// Parse `raw` (or start from defaults) and apply a `PORT` override.
pub fn parse_config(raw: Option<&str>, port: Option<&str>) -> anyhow::Result<Config> {
    let mut config: Config = match raw {
        Some(raw) => toml::from_str(raw).map_err(|e| anyhow::anyhow!("parsing: {e}"))?,
        None => Config::default(),
    };

    if let Some(port) = port.map(str::trim).filter(|p| !p.is_empty()) {
        config.server.port = port
            .parse()
            .map_err(|_| anyhow::anyhow!("PORT must be a port number, got {port:?}"))?;
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_uses_defaults() {
        let config = parse_config(None, None).unwrap();
        assert_eq!(config.server.port, 10000);
    }

    #[test]
    fn port_env_overrides_file() {
        let raw = "[server]\nport = 8080\n";
        assert_eq!(parse_config(Some(raw), None).unwrap().server.port, 8080);
        assert_eq!(parse_config(Some(raw), Some("9090")).unwrap().server.port, 9090);
        assert_eq!(parse_config(Some(raw), Some("  ")).unwrap().server.port, 8080);
    }

    #[test]
    fn bad_port_is_an_error() {
        assert!(parse_config(None, Some("http")).is_err());
        assert!(parse_config(None, Some("70000")).is_err());
    }

    #[test]
    fn malformed_toml_is_an_error() {
        assert!(parse_config(Some("[server\nport = 1"), None).is_err());
    }
}
