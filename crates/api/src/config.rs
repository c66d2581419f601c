use std::time::Duration;

/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `5000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// How long shutdown waits for in-flight jobs, in seconds (default: `30`).
    pub shutdown_timeout_secs: u64,
    /// Upper bound on a single pipeline step, in seconds (default: `600`).
    pub step_timeout_secs: u64,
    /// Log lines kept per job (default: `500`).
    pub log_retention: usize,
    /// Pacing of the built-in generator per step, in milliseconds (default: `1500`).
    pub step_delay_ms: u64,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                 | Default                                          |
    /// |-------------------------|--------------------------------------------------|
    /// | `HOST`                  | `0.0.0.0`                                        |
    /// | `PORT`                  | `5000`                                           |
    /// | `CORS_ORIGINS`          | `http://localhost:3000,http://localhost:3001`    |
    /// | `REQUEST_TIMEOUT_SECS`  | `30`                                             |
    /// | `SHUTDOWN_TIMEOUT_SECS` | `30`                                             |
    /// | `STEP_TIMEOUT_SECS`     | `600`                                            |
    /// | `LOG_RETENTION`         | `500`                                            |
    /// | `STEP_DELAY_MS`         | `1500`                                           |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "5000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:3000,http://localhost:3001".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let shutdown_timeout_secs: u64 = std::env::var("SHUTDOWN_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("SHUTDOWN_TIMEOUT_SECS must be a valid u64");

        let step_timeout_secs: u64 = std::env::var("STEP_TIMEOUT_SECS")
            .unwrap_or_else(|_| "600".into())
            .parse()
            .expect("STEP_TIMEOUT_SECS must be a valid u64");

        let log_retention: usize = std::env::var("LOG_RETENTION")
            .unwrap_or_else(|_| "500".into())
            .parse()
            .expect("LOG_RETENTION must be a valid usize");

        let step_delay_ms: u64 = std::env::var("STEP_DELAY_MS")
            .unwrap_or_else(|_| "1500".into())
            .parse()
            .expect("STEP_DELAY_MS must be a valid u64");

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            shutdown_timeout_secs,
            step_timeout_secs,
            log_retention,
            step_delay_ms,
        }
    }

    pub fn step_timeout(&self) -> Duration {
        Duration::from_secs(self.step_timeout_secs)
    }

    pub fn step_delay(&self) -> Duration {
        Duration::from_millis(self.step_delay_ms)
    }
}
