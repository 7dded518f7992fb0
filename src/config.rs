//! Configuration loader: merges `.env`, `forecast.toml`, and env vars.

use common::{Error, ServiceConfig};
use std::path::{Path, PathBuf};

const DEFAULT_CONFIG_PATH: &str = "forecast.toml";

fn parse_positive_usize(raw: &str, env_name: &str) -> Result<usize, Error> {
    let parsed = raw
        .trim()
        .parse::<usize>()
        .map_err(|_| Error::Config(format!("{env_name} must be an integer > 0")))?;
    if parsed == 0 {
        return Err(Error::Config(format!("{env_name} must be an integer > 0")));
    }
    Ok(parsed)
}

fn parse_non_negative_f64(raw: &str, env_name: &str) -> Result<f64, Error> {
    let parsed = raw
        .trim()
        .parse::<f64>()
        .map_err(|_| Error::Config(format!("{env_name} must be a number >= 0")))?;
    if !parsed.is_finite() || parsed < 0.0 {
        return Err(Error::Config(format!("{env_name} must be a number >= 0")));
    }
    Ok(parsed)
}

fn parse_seed(raw: &str) -> Result<Option<u64>, Error> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    trimmed
        .parse::<u64>()
        .map(Some)
        .map_err(|_| Error::Config("FORECAST_SEED must be an unsigned integer".into()))
}

pub(crate) fn validate_config(config: &ServiceConfig) -> Result<(), Error> {
    let mut issues: Vec<String> = Vec::new();

    if config.bind_addr.trim().is_empty() {
        issues.push("bind_addr must not be empty".into());
    }
    if config.artifacts.dir.trim().is_empty() {
        issues.push("artifacts.dir must not be empty".into());
    }

    let forecast = &config.forecast;
    if forecast.horizon_days == 0 {
        issues.push("forecast.horizon_days must be > 0".into());
    }
    if forecast.look_back == 0 {
        issues.push("forecast.look_back must be > 0".into());
    }
    if forecast.features == 0 {
        issues.push("forecast.features must be > 0".into());
    }
    if forecast.price_feature_index >= forecast.features {
        issues.push("forecast.price_feature_index must be < forecast.features".into());
    }
    if !forecast.noise_scale.is_finite() || forecast.noise_scale < 0.0 {
        issues.push("forecast.noise_scale must be a finite number >= 0".into());
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(Error::Config(format!(
            "Invalid config:\n - {}",
            issues.join("\n - ")
        )))
    }
}

fn read_config_file(path: &Path) -> Result<ServiceConfig, Error> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;
    toml::from_str(&contents)
        .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))
}

fn apply_env_overrides(
    config: &mut ServiceConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<(), Error> {
    if let Some(addr) = lookup("FORECAST_BIND_ADDR") {
        config.bind_addr = addr.trim().to_string();
    }
    if let Some(dir) = lookup("FORECAST_ARTIFACTS_DIR") {
        config.artifacts.dir = dir.trim().to_string();
    }
    if let Some(raw) = lookup("FORECAST_HORIZON_DAYS") {
        config.forecast.horizon_days = parse_positive_usize(&raw, "FORECAST_HORIZON_DAYS")?;
    }
    if let Some(raw) = lookup("FORECAST_NOISE_SCALE") {
        config.forecast.noise_scale = parse_non_negative_f64(&raw, "FORECAST_NOISE_SCALE")?;
    }
    if let Some(raw) = lookup("FORECAST_SEED") {
        config.forecast.seed = parse_seed(&raw)?;
    }
    Ok(())
}

pub fn load_config() -> Result<ServiceConfig, Error> {
    // 1. Load .env file from the working directory or its parents.
    if let Err(e) = dotenvy::dotenv() {
        tracing::debug!("No .env file loaded: {}", e);
    }

    // 2. Start with defaults.
    let mut config = ServiceConfig::default();

    // 3. Layer the TOML file on top if it exists. An explicit path must exist.
    match std::env::var("FORECAST_CONFIG") {
        Ok(explicit) => config = read_config_file(&PathBuf::from(explicit.trim()))?,
        Err(_) => {
            let path = Path::new(DEFAULT_CONFIG_PATH);
            if path.exists() {
                config = read_config_file(path)?;
            }
        }
    }

    // 4. Environment variables win.
    apply_env_overrides(&mut config, |name| std::env::var(name).ok())?;

    validate_config(&config)?;

    Ok(config)
}
