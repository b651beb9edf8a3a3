use serde::{Deserialize, Serialize};
use std::env;

/// Default endpoint of the in-cluster MinIO service.
pub const DEFAULT_S3_ENDPOINT: &str = "http://minio-proj.minio-ns.svc.cluster.local:9000";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub endpoint: Option<String>,
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
    pub path_style: bool,
}

impl StorageConfig {
    /// Read `S3_*` variables, accepting the `MINIO_*` names as fallbacks.
    pub fn from_env() -> Self {
        let endpoint = env::var("S3_ENDPOINT")
            .or_else(|_| env::var("MINIO_ENDPOINT"))
            .ok()
            .map(|e| with_scheme(&e))
            .or_else(|| Some(DEFAULT_S3_ENDPOINT.to_string()));

        Self {
            endpoint,
            region: env::var("S3_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
            access_key: env::var("S3_ACCESS_KEY")
                .or_else(|_| env::var("MINIO_ACCESS_KEY"))
                .unwrap_or_else(|_| "rootuser".to_string()),
            secret_key: env::var("S3_SECRET_KEY")
                .or_else(|_| env::var("MINIO_SECRET_KEY"))
                .unwrap_or_else(|_| "rootpass123".to_string()),
            path_style: env::var("S3_PATH_STYLE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(true),
        }
    }

    pub fn for_minio(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: Some(with_scheme(&endpoint.into())),
            region: "us-east-1".to_string(),
            access_key: "minioadmin".to_string(),
            secret_key: "minioadmin".to_string(),
            path_style: true,
        }
    }
}

/// MinIO endpoints are often given as bare `host:port`; the SDK needs a URL.
fn with_scheme(endpoint: &str) -> String {
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        endpoint.to_string()
    } else {
        format!("http://{}", endpoint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_minio() {
        let config = StorageConfig::for_minio("localhost:9000");
        assert_eq!(config.endpoint.as_deref(), Some("http://localhost:9000"));
        assert!(config.path_style);
        assert_eq!(config.access_key, "minioadmin");
    }

    #[test]
    fn test_with_scheme() {
        assert_eq!(with_scheme("minio:9000"), "http://minio:9000");
        assert_eq!(with_scheme("https://s3.example.com"), "https://s3.example.com");
    }
}
