use std::path::PathBuf;
use std::time::Duration;

/// Server configuration loaded from environment variables.
///
/// All fields have defaults suitable for the docker-compose setup; override
/// via environment variables (or a `.env` file) elsewhere.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `8000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// ComfyUI HTTP base URL; the WebSocket URL is derived from it.
    pub comfyui_url: String,
    /// Directory finished images are written to.
    pub image_output_dir: PathBuf,
    /// Delay between two status reads of an SSE subscriber, in milliseconds.
    pub status_poll_interval_ms: u64,
    /// How long terminal records stay queryable, in seconds.
    pub record_retention_secs: u64,
    /// How often the retention job runs, in seconds.
    pub retention_sweep_interval_secs: u64,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                         | Default                                       |
    /// |---------------------------------|-----------------------------------------------|
    /// | `HOST`                          | `0.0.0.0`                                     |
    /// | `PORT`                          | `8000`                                        |
    /// | `CORS_ORIGINS`                  | `http://localhost:8888,http://localhost:5173` |
    /// | `REQUEST_TIMEOUT_SECS`          | `30`                                          |
    /// | `COMFYUI_URL`                   | `http://comfyui:8890`                         |
    /// | `IMAGE_OUTPUT_DIR`              | `/app/images`                                 |
    /// | `STATUS_POLL_INTERVAL_MS`       | `500`                                         |
    /// | `RECORD_RETENTION_SECS`         | `3600`                                        |
    /// | `RETENTION_SWEEP_INTERVAL_SECS` | `60`                                          |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "8000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:8888,http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs = env_u64("REQUEST_TIMEOUT_SECS", 30);

        let comfyui_url =
            std::env::var("COMFYUI_URL").unwrap_or_else(|_| "http://comfyui:8890".into());

        let image_output_dir = std::env::var("IMAGE_OUTPUT_DIR")
            .unwrap_or_else(|_| "/app/images".into())
            .into();

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            comfyui_url,
            image_output_dir,
            status_poll_interval_ms: env_nonzero_u64("STATUS_POLL_INTERVAL_MS", 500),
            record_retention_secs: env_u64("RECORD_RETENTION_SECS", 3600),
            retention_sweep_interval_secs: env_nonzero_u64("RETENTION_SWEEP_INTERVAL_SECS", 60),
        }
    }

    pub fn status_poll_interval(&self) -> Duration {
        Duration::from_millis(self.status_poll_interval_ms)
    }

    pub fn record_retention(&self) -> Duration {
        Duration::from_secs(self.record_retention_secs)
    }

    pub fn retention_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.retention_sweep_interval_secs)
    }
}

fn env_u64(name: &str, default: u64) -> u64 {
    parse_u64(name, std::env::var(name).ok().as_deref(), default)
}

/// Like [`env_u64`], for intervals that drive a timer and so cannot be zero.
fn env_nonzero_u64(name: &str, default: u64) -> u64 {
    parse_nonzero_u64(name, std::env::var(name).ok().as_deref(), default)
}

fn parse_u64(name: &str, raw: Option<&str>, default: u64) -> u64 {
    match raw {
        Some(value) => value
            .trim()
            .parse()
            .unwrap_or_else(|_| panic!("{name} must be a valid u64")),
        None => default,
    }
}

fn parse_nonzero_u64(name: &str, raw: Option<&str>, default: u64) -> u64 {
    let value = parse_u64(name, raw, default);
    assert!(value > 0, "{name} must be greater than zero");
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_value_uses_default() {
        assert_eq!(parse_u64("RECORD_RETENTION_SECS", None, 3600), 3600);
        assert_eq!(parse_nonzero_u64("STATUS_POLL_INTERVAL_MS", None, 500), 500);
    }

    #[test]
    fn explicit_value_overrides_default() {
        assert_eq!(parse_nonzero_u64("RETENTION_SWEEP_INTERVAL_SECS", Some("15"), 60), 15);
        assert_eq!(parse_u64("RECORD_RETENTION_SECS", Some("0"), 3600), 0);
    }

    #[test]
    #[should_panic(expected = "RETENTION_SWEEP_INTERVAL_SECS must be greater than zero")]
    fn zero_sweep_interval_is_rejected() {
        parse_nonzero_u64("RETENTION_SWEEP_INTERVAL_SECS", Some("0"), 60);
    }

    #[test]
    #[should_panic(expected = "STATUS_POLL_INTERVAL_MS must be greater than zero")]
    fn zero_poll_interval_is_rejected() {
        parse_nonzero_u64("STATUS_POLL_INTERVAL_MS", Some("0"), 500);
    }

    #[test]
    #[should_panic(expected = "REQUEST_TIMEOUT_SECS must be a valid u64")]
    fn non_numeric_value_is_rejected() {
        parse_u64("REQUEST_TIMEOUT_SECS", Some("thirty"), 30);
    }
}
