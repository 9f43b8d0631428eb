//! Envia provisioning configuration

use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use nms_core::ServiceConfig;

use crate::error::{EnviaError, Result};

/// Envia REST API version, e.g. `1.4`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ApiVersion {
    pub major: u32,
    pub minor: u32,
}

impl ApiVersion {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }
}

impl FromStr for ApiVersion {
    type Err = EnviaError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || EnviaError::Config(format!("Envia API version has to be numeric, got {:?}", s));
        let (major, minor) = s.trim().split_once('.').unwrap_or((s.trim(), "0"));
        Ok(Self {
            major: major.parse().map_err(|_| invalid())?,
            minor: minor.parse().map_err(|_| invalid())?,
        })
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Runtime settings of the Envia provisioning service
#[derive(Debug, Clone)]
pub struct EnviaConfig {
    pub service: ServiceConfig,
    /// Base URL jobs are posted below
    pub base_url: String,
    pub api_version: ApiVersion,
    pub reseller_username: String,
    pub reseller_password: String,
    /// Root of uploaded order documents, one subdirectory per contract
    pub document_dir: PathBuf,
}

impl EnviaConfig {
    pub fn from_env() -> Result<Self> {
        let service = ServiceConfig::from_env().map_err(|e| EnviaError::Config(e.to_string()))?;

        Ok(Self {
            service,
            base_url: env::var("PROVVOIPENVIA__REST_API_URL")
                .map_err(|_| EnviaError::Config("PROVVOIPENVIA__REST_API_URL not set".to_string()))?,
            api_version: env::var("PROVVOIPENVIA__REST_API_VERSION")
                .unwrap_or_else(|_| "1.4".to_string())
                .parse()?,
            reseller_username: env::var("PROVVOIPENVIA__RESELLER_USERNAME").unwrap_or_default(),
            reseller_password: env::var("PROVVOIPENVIA__RESELLER_PASSWORD").unwrap_or_default(),
            document_dir: env::var("PROVVOIPENVIA__DOCUMENT_DIR")
                .unwrap_or_else(|_| "storage/provvoipenvia/EnviaOrderDocuments".to_string())
                .into(),
        })
    }

    /// Full URL of a job path like `contract/create`
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }
}
