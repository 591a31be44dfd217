use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use covergen_comfyui::ComfyUIConfig;

/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Graceful shutdown timeout in seconds (default: `30`). Bounds how long
    /// in-flight pipeline runs are awaited after the listener stops.
    pub shutdown_timeout_secs: u64,
    /// Largest accepted request body (default: 10 MiB, base64 watermarks
    /// included).
    pub max_body_bytes: usize,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default                    |
    /// |------------------------|----------------------------|
    /// | `HOST`                 | `0.0.0.0`                  |
    /// | `PORT`                 | `3000`                     |
    /// | `CORS_ORIGINS`         | `http://localhost:5173`    |
    /// | `REQUEST_TIMEOUT_SECS` | `30`                       |
    /// | `SHUTDOWN_TIMEOUT_SECS`| `30`                       |
    /// | `MAX_BODY_BYTES`       | `10485760`                 |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Self {
            host,
            port: parse_env("PORT", 3000),
            cors_origins,
            request_timeout_secs: parse_env("REQUEST_TIMEOUT_SECS", 30),
            shutdown_timeout_secs: parse_env("SHUTDOWN_TIMEOUT_SECS", 30),
            max_body_bytes: parse_env("MAX_BODY_BYTES", 10 * 1024 * 1024),
        }
    }
}

/// Generation pipeline configuration.
#[derive(Debug, Clone)]
pub struct GenerationConfig {
    /// ComfyUI backend. `None` selects the built-in gradient synthesizer.
    pub comfyui: Option<ComfyUIConfig>,
    /// Root directory for `previews/` and `covers/`.
    pub storage_dir: PathBuf,
    /// Prefix of artifact URLs handed to clients.
    pub public_base_url: String,
    /// TrueType font for overlays. Falls back to the block font.
    pub font_path: Option<PathBuf>,
    /// JSON layout zone file. Falls back to the default cover layout.
    pub layout_zones_path: Option<PathBuf>,
    /// JSON style catalog. Falls back to the built-in catalog.
    pub style_catalog_path: Option<PathBuf>,
    pub pipeline_timeout_secs: u64,
    pub job_retention_hours: u64,
}

impl GenerationConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                    | Default                    |
    /// |----------------------------|----------------------------|
    /// | `COMFYUI_URL`              | unset (gradient backend)   |
    /// | `COMFYUI_CHECKPOINT`       | `sd_xl_base_1.0.safetensors` |
    /// | `COMFYUI_MAX_CONCURRENT`   | `1`                        |
    /// | `COMFYUI_POLL_INTERVAL_MS` | `1000`                     |
    /// | `STORAGE_DIR`              | `./storage`                |
    /// | `PUBLIC_BASE_URL`          | `/artifacts`               |
    /// | `FONT_PATH`                | unset (block font)         |
    /// | `LAYOUT_ZONES_PATH`        | unset (default layout)     |
    /// | `STYLE_CATALOG_PATH`       | unset (built-in catalog)   |
    /// | `PIPELINE_TIMEOUT_SECS`    | `300`                      |
    /// | `JOB_RETENTION_HOURS`      | `24`                       |
    pub fn from_env() -> Self {
        let comfyui = optional_env("COMFYUI_URL").map(|api_url| ComfyUIConfig {
            api_url,
            checkpoint: std::env::var("COMFYUI_CHECKPOINT")
                .unwrap_or_else(|_| "sd_xl_base_1.0.safetensors".into()),
            max_concurrent: parse_env("COMFYUI_MAX_CONCURRENT", 1),
            poll_interval: Duration::from_millis(parse_env("COMFYUI_POLL_INTERVAL_MS", 1000)),
        });

        Self {
            comfyui,
            storage_dir: optional_env("STORAGE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./storage")),
            public_base_url: optional_env("PUBLIC_BASE_URL").unwrap_or_else(|| "/artifacts".into()),
            font_path: optional_env("FONT_PATH").map(PathBuf::from),
            layout_zones_path: optional_env("LAYOUT_ZONES_PATH").map(PathBuf::from),
            style_catalog_path: optional_env("STYLE_CATALOG_PATH").map(PathBuf::from),
            pipeline_timeout_secs: parse_env("PIPELINE_TIMEOUT_SECS", 300),
            job_retention_hours: parse_env("JOB_RETENTION_HOURS", 24),
        }
    }

    pub fn pipeline_timeout(&self) -> Duration {
        Duration::from_secs(self.pipeline_timeout_secs)
    }

    pub fn job_retention(&self) -> Duration {
        Duration::from_secs(self.job_retention_hours * 3600)
    }
}

/// Non-empty value of `key`, if set.
fn optional_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parse `key` or fall back to `default`. A present but malformed value
/// aborts startup.
fn parse_env<T>(key: &str, default: T) -> T
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match optional_env(key) {
        Some(raw) => raw
            .parse()
            .unwrap_or_else(|e| panic!("{key} must be a valid {}: {e}", std::any::type_name::<T>())),
        None => default,
    }
}
