use std::path::PathBuf;

use crate::errors::AppError;
use crate::identity::JwtConfig;

const DEFAULT_PORT: u16 = 8000;
const DEFAULT_DATABASE_URL: &str = "sqlite://crew-planner.db?mode=rwc";

/// Process configuration, read once from the environment at start-up.
#[derive(Debug, Clone)]
pub struct Settings {
    pub port: u16,
    pub database_url: String,
    pub jwt: JwtConfig,
    /// Empty means any origin.
    pub allowed_origins: Vec<String>,
    pub upload_dir: PathBuf,
    pub public_base_url: String,
    pub password_reset_url: String,
    pub tls: Option<TlsPaths>,
}

#[derive(Debug, Clone)]
pub struct TlsPaths {
    pub cert: PathBuf,
    pub key: PathBuf,
}

impl Settings {
    pub fn from_env() -> Result<Self, AppError> {
        let port = match std::env::var("APP_PORT") {
            Ok(value) => value
                .parse::<u16>()
                .map_err(|_| AppError::configuration("APP_PORT must be a valid port number"))?,
            Err(_) => DEFAULT_PORT,
        };

        let tls = match (std::env::var("TLS_CERT").ok(), std::env::var("TLS_KEY").ok()) {
            (Some(cert), Some(key)) => Some(TlsPaths {
                cert: cert.into(),
                key: key.into(),
            }),
            (None, None) => None,
            _ => return Err(AppError::configuration("TLS_CERT and TLS_KEY must be set together")),
        };

        Ok(Self {
            port,
            database_url: env_or("DATABASE_URL", DEFAULT_DATABASE_URL),
            jwt: JwtConfig::from_env()?,
            allowed_origins: parse_origins(&env_or("ALLOWED_ORIGINS", "*")),
            upload_dir: env_or("UPLOAD_DIR", "./uploads").into(),
            public_base_url: env_or("PUBLIC_BASE_URL", &format!("http://localhost:{port}"))
                .trim_end_matches('/')
                .to_string(),
            password_reset_url: env_or("PASSWORD_RESET_URL", "http://localhost:3000/reset-password"),
            tls,
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

/// Comma-separated origins; `*` (alone or among others) collapses to "any".
fn parse_origins(raw: &str) -> Vec<String> {
    let origins: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(str::to_string)
        .collect();

    if origins.iter().any(|origin| origin == "*") {
        Vec::new()
    } else {
        origins
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_means_any_origin() {
        assert!(parse_origins("*").is_empty());
        assert!(parse_origins("https://a.example, *").is_empty());
    }

    #[test]
    fn explicit_origins_are_trimmed() {
        assert_eq!(
            parse_origins(" https://a.example ,https://b.example,, "),
            vec!["https://a.example".to_string(), "https://b.example".to_string()]
        );
    }
}
