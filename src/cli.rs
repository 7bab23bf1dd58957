//! CLI argument parsing, validation, and startup helpers.

use clap::Parser;
use tracing::error;
use url::Url;

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "gatewarden",
    about = "Session and permission gate for the admin dashboard backend"
)]
pub struct Args {
    /// Backend base URL (e.g., "https://dashboard.example.com/api")
    #[arg(long, default_value = "http://localhost:8080")]
    pub backend_url: String,

    /// Account email
    #[arg(long)]
    pub email: String,

    /// Account password. Prefer the GATEWARDEN_PASSWORD env var over the flag
    #[arg(long, env = "GATEWARDEN_PASSWORD", hide_env_values = true)]
    pub password: String,

    /// Route to check after login (repeatable)
    #[arg(long = "route", default_value = "/dashboard")]
    pub routes: Vec<String>,

    /// Directory for the persisted session cache; omit to skip persistence
    #[arg(long)]
    pub cache_dir: Option<String>,

    /// Log out (revoking the session) before exiting
    #[arg(long)]
    pub logout: bool,

    /// Log output format
    #[arg(short, long, default_value = "pretty")]
    pub log_format: LogFormat,
}

pub fn init_logging(format: &LogFormat) {
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt::init(),
        LogFormat::Json => tracing_subscriber::fmt().json().init(),
        LogFormat::Compact => tracing_subscriber::fmt().compact().init(),
    }
}

/// Parse and validate the backend base URL.
/// Returns None and logs an error if the URL is unusable.
pub fn validate_backend_url(raw: &str) -> Option<Url> {
    match Url::parse(raw) {
        Ok(url) if url.scheme() == "http" || url.scheme() == "https" => Some(url),
        Ok(url) => {
            error!(scheme = %url.scheme(), "Backend URL must use http or https");
            None
        }
        Err(e) => {
            error!(url = %raw, error = %e, "Invalid backend URL");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_http_and_https() {
        assert!(validate_backend_url("http://localhost:8080").is_some());
        assert!(validate_backend_url("https://dashboard.example.com/api").is_some());
    }

    #[test]
    fn rejects_other_schemes_and_garbage() {
        assert!(validate_backend_url("ftp://example.com").is_none());
        assert!(validate_backend_url("not a url").is_none());
    }
}
