use std::path::{Path, PathBuf};

use {
    secrecy::Secret,
    tracing::{debug, warn},
};

use crate::{env_subst::substitute_env, schema::CourierConfig};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &[
    "courier.toml",
    "courier.yaml",
    "courier.yml",
    "courier.json",
];

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> anyhow::Result<CourierConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./courier.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/courier/courier.{toml,yaml,yml,json}` (user-global)
///
/// Returns `CourierConfig::default()` if no config file is found.
pub fn discover_and_load() -> CourierConfig {
    if let Some(path) = find_config_file() {
        debug!(path = %path.display(), "loading config");
        match load_config(&path) {
            Ok(cfg) => return cfg,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
            },
        }
    } else {
        debug!("no config file found, using defaults");
    }
    CourierConfig::default()
}

/// Find the first config file in standard locations.
pub(crate) fn find_config_file() -> Option<PathBuf> {
    for name in CONFIG_FILENAMES {
        let p = PathBuf::from(name);
        if p.exists() {
            return Some(p);
        }
    }

    let dir = config_dir()?;
    CONFIG_FILENAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|p| p.exists())
}

/// Returns the user-global config directory (`~/.config/courier/`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "courier").map(|d| d.config_dir().to_path_buf())
}

/// Apply `COURIER_*` environment overrides on top of a loaded config.
pub fn apply_env_overrides(config: CourierConfig) -> CourierConfig {
    apply_env_overrides_with(config, |name| std::env::var(name).ok())
}

fn apply_env_overrides_with(
    mut config: CourierConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> CourierConfig {
    if let Some(bind) = lookup("COURIER_BIND") {
        config.server.bind = bind;
    }
    if let Some(port) = lookup("COURIER_PORT") {
        match port.parse() {
            Ok(port) => config.server.port = port,
            Err(e) => warn!(value = %port, error = %e, "ignoring invalid COURIER_PORT"),
        }
    }
    if let Some(token) = lookup("COURIER_CHANNEL_TOKEN") {
        config.channel.access_token = Secret::new(token);
    }
    if let Some(base_url) = lookup("COURIER_CHANNEL_BASE_URL") {
        config.channel.base_url = base_url;
    }
    if let Some(endpoint) = lookup("COURIER_REPLY_ENDPOINT") {
        config.reply.endpoint = (!endpoint.trim().is_empty()).then_some(endpoint);
    }
    config
}

pub(crate) fn parse_config(raw: &str, path: &Path) -> anyhow::Result<CourierConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => anyhow::bail!("unsupported config format: .{ext}"),
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, secrecy::ExposeSecret};

    #[test]
    fn loads_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("courier.toml");
        std::fs::write(&path, "[delivery]\nchar_limit = 640\nmax_attempts = 5\n").unwrap();

        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.delivery.char_limit, 640);
        assert_eq!(cfg.delivery.max_attempts, 5);
    }

    #[test]
    fn loads_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("courier.yaml");
        std::fs::write(&path, "aggregation:\n  quiet_period_secs: 2\n").unwrap();

        let cfg = load_config(&path).unwrap();
        assert!((cfg.aggregation.quiet_period_secs - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn rejects_unknown_extension() {
        let err = parse_config("", Path::new("courier.ini")).unwrap_err();
        assert!(err.to_string().contains("unsupported config format"));
    }

    #[test]
    fn env_overrides_apply() {
        let lookup = |name: &str| match name {
            "COURIER_PORT" => Some("9090".to_string()),
            "COURIER_CHANNEL_TOKEN" => Some("from-env".to_string()),
            "COURIER_REPLY_ENDPOINT" => Some("http://localhost:7000/reply".to_string()),
            _ => None,
        };
        let cfg = apply_env_overrides_with(CourierConfig::default(), lookup);
        assert_eq!(cfg.server.port, 9090);
        assert_eq!(cfg.channel.access_token.expose_secret(), "from-env");
        assert_eq!(
            cfg.reply.endpoint.as_deref(),
            Some("http://localhost:7000/reply")
        );
    }

    #[test]
    fn invalid_port_override_is_ignored() {
        let lookup = |name: &str| (name == "COURIER_PORT").then(|| "not-a-port".to_string());
        let cfg = apply_env_overrides_with(CourierConfig::default(), lookup);
        assert_eq!(cfg.server.port, 8080);
    }
}
