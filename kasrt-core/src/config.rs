use std::env;

/// Runtime configuration gathered from environment variables.
///
/// Loaded once at startup by both the server and the worker binary.
/// `DATABASE_URL` is optional: when absent the binaries fall back to the
/// in-memory store, which is useful for local development and tests.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_url: Option<String>,
    pub jwt_secret: String,
    pub cron_secret: String,
    pub worker_poll_interval_seconds: u64,
    pub ocr_batch_size: usize,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let host = env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("SERVER_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| anyhow::anyhow!("Invalid SERVER_PORT"))?;

        let worker_poll_interval_seconds = env::var("WORKER_POLL_INTERVAL_SECONDS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(60);

        let ocr_batch_size = env::var("OCR_BATCH_SIZE")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(3);

        Ok(Self {
            host,
            port,
            database_url: env::var("DATABASE_URL").ok(),
            jwt_secret: env::var("JWT_SECRET").unwrap_or_else(|_| "secret".to_string()),
            cron_secret: env::var("CRON_SECRET").unwrap_or_default(),
            worker_poll_interval_seconds,
            ocr_batch_size,
        })
    }
}
