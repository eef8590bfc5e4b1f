use anyhow::{anyhow, bail, Context, Result};
use std::str::FromStr;

/// Process configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub jwt_secret: String,
    pub jwt_ttl_secs: i64,
    pub body_limit_bytes: usize,
    pub activity_queue_capacity: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL").ok_or_else(|| anyhow!("DATABASE_URL not set"))?;
        let jwt_secret = lookup("JWT_SECRET").ok_or_else(|| anyhow!("JWT_SECRET not set"))?;
        if jwt_secret.len() < 16 {
            bail!("JWT_SECRET must be at least 16 bytes");
        }
        let cfg = Self {
            database_url,
            port: parse_or(&lookup, "PORT", 8081)?,
            jwt_secret,
            jwt_ttl_secs: parse_or(&lookup, "JWT_TTL_SECS", 86_400)?,
            body_limit_bytes: parse_or(&lookup, "BODY_LIMIT_BYTES", 1024 * 1024)?,
            activity_queue_capacity: parse_or(&lookup, "ACTIVITY_QUEUE_CAPACITY", 1024)?,
        };
        if cfg.jwt_ttl_secs <= 0 {
            bail!("JWT_TTL_SECS must be positive");
        }
        if cfg.activity_queue_capacity == 0 {
            bail!("ACTIVITY_QUEUE_CAPACITY must be positive");
        }
        Ok(cfg)
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid value for {key}: {raw:?}")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    const BASE: [(&str, &str); 2] = [
        ("DATABASE_URL", "postgres://localhost/tutorhub"),
        ("JWT_SECRET", "0123456789abcdef0123"),
    ];

    #[test]
    fn applies_defaults() {
        let cfg = Config::from_lookup(env(&BASE)).unwrap();
        assert_eq!(cfg.port, 8081);
        assert_eq!(cfg.jwt_ttl_secs, 86_400);
        assert_eq!(cfg.body_limit_bytes, 1024 * 1024);
        assert_eq!(cfg.activity_queue_capacity, 1024);
    }

    #[test]
    fn reads_overrides() {
        let mut pairs = BASE.to_vec();
        pairs.push(("PORT", "9000"));
        pairs.push(("JWT_TTL_SECS", "60"));
        let cfg = Config::from_lookup(env(&pairs)).unwrap();
        assert_eq!(cfg.port, 9000);
        assert_eq!(cfg.jwt_ttl_secs, 60);
    }

    #[test]
    fn requires_database_url() {
        let err = Config::from_lookup(env(&[("JWT_SECRET", "0123456789abcdef0123")])).unwrap_err();
        assert!(err.to_string().contains("DATABASE_URL"));
    }

    #[test]
    fn rejects_short_secret() {
        let err = Config::from_lookup(env(&[
            ("DATABASE_URL", "postgres://localhost/tutorhub"),
            ("JWT_SECRET", "short"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("JWT_SECRET"));
    }

    #[test]
    fn rejects_garbage_port() {
        let mut pairs = BASE.to_vec();
        pairs.push(("PORT", "eighty"));
        let err = Config::from_lookup(env(&pairs)).unwrap_err();
        assert!(err.to_string().contains("PORT"));
    }
}
