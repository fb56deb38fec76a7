use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
];

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub uploads_dir: PathBuf,
    pub jwt_secret: String,
    pub public_url: Option<String>,
    pub max_body_bytes: usize,
    /// `None` disables the orphan sweep.
    pub sweep_interval: Option<Duration>,
    pub sweep_grace: Duration,
    /// TrueType face used on access cards for scripts the bundled serif lacks.
    pub card_font: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let jwt_secret = get("JOINTLY_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("JOINTLY_JWT_SECRET is unset or still a placeholder");
        }

        let host = get("JOINTLY_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port: u16 = get("JOINTLY_PORT")
            .unwrap_or_else(|| "3000".into())
            .parse()
            .context("JOINTLY_PORT must be a port number")?;
        let db_path = get("JOINTLY_DB_PATH").unwrap_or_else(|| "jointly.db".into()).into();
        let uploads_dir = get("JOINTLY_UPLOADS_DIR").unwrap_or_else(|| "./uploads".into()).into();
        let public_url = get("JOINTLY_PUBLIC_URL")
            .map(|u| u.trim().trim_end_matches('/').to_string())
            .filter(|u| !u.is_empty());
        let max_body_mb: usize = parse_or(&get, "JOINTLY_MAX_BODY_MB", 100)?;
        let sweep_secs: u64 = parse_or(&get, "JOINTLY_ORPHAN_SWEEP_SECS", 3600)?;
        let grace_secs: u64 = parse_or(&get, "JOINTLY_ORPHAN_GRACE_SECS", 3600)?;
        if grace_secs == 0 {
            bail!("JOINTLY_ORPHAN_GRACE_SECS must be at least 1, or in-flight uploads could be swept");
        }
        let max_body_bytes = max_body_mb
            .checked_mul(1024 * 1024)
            .context("JOINTLY_MAX_BODY_MB is too large")?;
        let card_font = get("JOINTLY_CARD_FONT")
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .map(PathBuf::from);

        Ok(Self {
            host,
            port,
            db_path,
            uploads_dir,
            jwt_secret,
            public_url,
            max_body_bytes,
            sweep_interval: (sweep_secs > 0).then(|| Duration::from_secs(sweep_secs)),
            sweep_grace: Duration::from_secs(grace_secs),
            card_font,
        })
    }

    pub fn addr(&self) -> Result<SocketAddr> {
        Ok(format!("{}:{}", self.host, self.port).parse()?)
    }
}

fn parse_or<T: std::str::FromStr>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T> {
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("{} must be a non-negative integer, got {:?}", key, raw)),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_with_only_a_secret() {
        let config = config(&[("JOINTLY_JWT_SECRET", "s3cret-value")]).unwrap();
        assert_eq!(config.addr().unwrap().to_string(), "0.0.0.0:3000");
        assert_eq!(config.db_path, PathBuf::from("jointly.db"));
        assert_eq!(config.uploads_dir, PathBuf::from("./uploads"));
        assert_eq!(config.max_body_bytes, 100 * 1024 * 1024);
        assert_eq!(config.sweep_interval, Some(Duration::from_secs(3600)));
        assert_eq!(config.public_url, None);
    }

    #[test]
    fn placeholder_secrets_are_refused() {
        assert!(config(&[]).is_err());
        assert!(config(&[("JOINTLY_JWT_SECRET", "dev-secret-change-me")]).is_err());
    }

    #[test]
    fn overrides_are_parsed() {
        let parsed = config(&[
            ("JOINTLY_JWT_SECRET", "s3cret-value"),
            ("JOINTLY_PORT", "8080"),
            ("JOINTLY_PUBLIC_URL", "https://jointly.example/"),
            ("JOINTLY_ORPHAN_SWEEP_SECS", "0"),
        ])
        .unwrap();
        assert_eq!(parsed.port, 8080);
        assert_eq!(parsed.public_url.as_deref(), Some("https://jointly.example"));
        assert_eq!(parsed.sweep_interval, None);

        assert!(config(&[("JOINTLY_JWT_SECRET", "x"), ("JOINTLY_MAX_BODY_MB", "lots")]).is_err());
    }

    #[test]
    fn oversized_body_limit_is_an_error() {
        let huge = usize::MAX.to_string();
        assert!(config(&[("JOINTLY_JWT_SECRET", "s3cret-value"), ("JOINTLY_MAX_BODY_MB", &huge)]).is_err());
    }

    #[test]
    fn zero_grace_period_is_refused() {
        assert!(config(&[("JOINTLY_JWT_SECRET", "s3cret-value"), ("JOINTLY_ORPHAN_GRACE_SECS", "0")]).is_err());
        let parsed = config(&[("JOINTLY_JWT_SECRET", "s3cret-value"), ("JOINTLY_ORPHAN_GRACE_SECS", "1")]).unwrap();
        assert_eq!(parsed.sweep_grace, Duration::from_secs(1));
    }

    #[test]
    fn card_font_path_is_optional() {
        let parsed = config(&[("JOINTLY_JWT_SECRET", "s3cret-value")]).unwrap();
        assert_eq!(parsed.card_font, None);
        let parsed = config(&[
            ("JOINTLY_JWT_SECRET", "s3cret-value"),
            ("JOINTLY_CARD_FONT", "/usr/share/fonts/NotoSansCJK.ttf"),
        ])
        .unwrap();
        assert_eq!(parsed.card_font, Some(PathBuf::from("/usr/share/fonts/NotoSansCJK.ttf")));
    }
}
