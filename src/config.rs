use std::path::PathBuf;

use anyhow::Context;

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
}

/// Where uploaded recipe images live.
#[derive(Debug, Clone)]
pub enum StorageConfig {
    Local {
        root: PathBuf,
        url_prefix: String,
    },
    S3(S3Config),
}

/// S3-compatible object store (MinIO in development).
#[derive(Debug, Clone)]
pub struct S3Config {
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
    /// Lifetime of the presigned GET URLs handed to clients.
    pub presign_ttl_secs: u64,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt: JwtConfig,
    pub storage: StorageConfig,
    pub max_upload_bytes: usize,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let or = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
        let required = |key: &str| lookup(key).with_context(|| format!("{key} must be set"));

        let database_url = or("DATABASE_URL", "sqlite://recipes.db");
        let jwt = JwtConfig {
            secret: required("JWT_SECRET")?,
            issuer: or("JWT_ISSUER", "recipe-api"),
            audience: or("JWT_AUDIENCE", "recipe-api-users"),
            ttl_minutes: parse_or(lookup("JWT_TTL_MINUTES"), 60 * 24),
        };

        let storage = match or("STORAGE_BACKEND", "local").to_lowercase().as_str() {
            "local" => StorageConfig::Local {
                root: PathBuf::from(or("MEDIA_ROOT", "./media")),
                url_prefix: or("MEDIA_URL", "/media"),
            },
            "s3" => StorageConfig::S3(S3Config {
                endpoint: required("MINIO_ENDPOINT")?,
                bucket: required("MINIO_BUCKET")?,
                access_key: required("MINIO_ACCESS_KEY")?,
                secret_key: required("MINIO_SECRET_KEY")?,
                region: or("MINIO_REGION", "us-east-1"),
                presign_ttl_secs: parse_or(lookup("PRESIGN_TTL_SECS"), 30 * 60),
            }),
            other => anyhow::bail!("unknown STORAGE_BACKEND {other:?}, expected local or s3"),
        };

        Ok(Self {
            database_url,
            jwt,
            storage,
            max_upload_bytes: parse_or(lookup("MAX_UPLOAD_BYTES"), 10 * 1024 * 1024),
        })
    }
}

fn parse_or<T: std::str::FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|v| v.parse::<T>().ok()).unwrap_or(default)
}
