//! Server configuration loaded from environment variables.

/// All fields have defaults suitable for local development. In
/// production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Base URL of the generation services (default: `http://localhost:8000`).
    pub api_base_url: String,
    /// Base URL of the object-store upload endpoint (default:
    /// the generation base).
    pub upload_base_url: String,
    /// Path of the gallery JSON document (default: `data/gallery.json`).
    pub gallery_path: String,
    /// Allowed CORS origins, parsed from comma-separated
    /// `CORS_ALLOWED_ORIGINS`.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `300`; fan-out
    /// batches poll upstream jobs for minutes).
    pub request_timeout_secs: u64,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default                    |
    /// |------------------------|----------------------------|
    /// | `HOST`                 | `0.0.0.0`                  |
    /// | `PORT`                 | `3000`                     |
    /// | `API_BASE_URL`         | `http://localhost:8000`    |
    /// | `UPLOAD_BASE_URL`      | value of `API_BASE_URL`    |
    /// | `GALLERY_PATH`         | `data/gallery.json`        |
    /// | `CORS_ALLOWED_ORIGINS` | `http://localhost:3000`    |
    /// | `REQUEST_TIMEOUT_SECS` | `300`                      |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let api_base_url = std::env::var("API_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:8000".into())
            .trim_end_matches('/')
            .to_string();

        let upload_base_url = std::env::var("UPLOAD_BASE_URL")
            .map(|v| v.trim_end_matches('/').to_string())
            .unwrap_or_else(|_| api_base_url.clone());

        let gallery_path =
            std::env::var("GALLERY_PATH").unwrap_or_else(|_| "data/gallery.json".into());

        let cors_origins: Vec<String> = std::env::var("CORS_ALLOWED_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:3000".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "300".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        Self {
            host,
            port,
            api_base_url,
            upload_base_url,
            gallery_path,
            cors_origins,
            request_timeout_secs,
        }
    }
}
