use std::path::PathBuf;

use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
    pub refresh_ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub enum StorageConfig {
    Local {
        root: PathBuf,
    },
    S3 {
        endpoint: String,
        bucket: String,
        access_key: String,
        secret_key: String,
        region: String,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    pub ttl_hours: i64,
    pub cookie_secure: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt: JwtConfig,
    pub storage: StorageConfig,
    pub session: SessionConfig,
    /// Directory the static `/api/images`, `/api/profilePic` and `/api/slip` routes read from.
    pub upload_dir: PathBuf,
    pub promptpay_id: String,
    pub admin_emails: Vec<String>,
    pub max_upload_bytes: usize,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(get: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| get(key).with_context(|| format!("{key} must be set"));
        let parsed = |key: &str, default: i64| {
            get(key)
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(default)
        };

        let database_url = required("DATABASE_URL")?;
        let jwt = JwtConfig {
            secret: required("JWT_SECRET")?,
            issuer: get("JWT_ISSUER").unwrap_or_else(|| "photomart".into()),
            audience: get("JWT_AUDIENCE").unwrap_or_else(|| "photomart-users".into()),
            ttl_minutes: parsed("JWT_TTL_MINUTES", 60),
            refresh_ttl_minutes: parsed("JWT_REFRESH_TTL_MINUTES", 60 * 24 * 14),
        };

        let upload_dir = PathBuf::from(get("UPLOAD_DIR").unwrap_or_else(|| "./uploads".into()));
        let storage = match get("STORAGE_BACKEND").as_deref() {
            None | Some("local") => StorageConfig::Local {
                root: upload_dir.clone(),
            },
            Some("s3") => StorageConfig::S3 {
                endpoint: required("MINIO_ENDPOINT")?,
                bucket: required("MINIO_BUCKET")?,
                access_key: required("MINIO_ACCESS_KEY")?,
                secret_key: required("MINIO_SECRET_KEY")?,
                region: get("MINIO_REGION").unwrap_or_else(|| "us-east-1".into()),
            },
            Some(other) => anyhow::bail!("unknown STORAGE_BACKEND {other:?}"),
        };

        let session = SessionConfig {
            ttl_hours: parsed("SESSION_TTL_HOURS", 24),
            cookie_secure: get("COOKIE_SECURE")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
        };

        let admin_emails = get("ADMIN_EMAILS")
            .unwrap_or_default()
            .split(',')
            .map(|e| e.trim().to_lowercase())
            .filter(|e| !e.is_empty())
            .collect();

        let max_upload_mb = parsed("MAX_UPLOAD_MB", 20).max(1) as usize;

        Ok(Self {
            database_url,
            jwt,
            storage,
            session,
            upload_dir,
            promptpay_id: get("PROMPTPAY_ID").unwrap_or_default(),
            admin_emails,
            max_upload_bytes: max_upload_mb * 1024 * 1024,
        })
    }

    pub fn is_admin_email(&self, email: &str) -> bool {
        self.admin_emails.iter().any(|e| e == email)
    }
}
