//! Runtime configuration, loaded from TOML.
//!
//! ```toml
//! [crypto]
//! master_key = "base64 of exactly 32 bytes"
//!
//! [frontend]
//! url = "https://sign.example.com"
//!
//! [storage]
//! type = "local"
//!
//! [storage.local]
//! upload_dir = "uploads"
//! ```

use crate::{Error, Result};
use serde::{Deserialize, Deserializer};
use std::{fmt, path::Path, path::PathBuf};
use zeroize::Zeroize;

pub const MASTER_KEY_LEN: usize = 32;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub crypto: CryptoConfig,
    #[serde(default)]
    pub frontend: FrontendConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub otp: OtpConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CryptoConfig {
    pub master_key: MasterKey,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FrontendConfig {
    #[serde(default = "default_frontend_url")]
    pub url: String,
}

impl Default for FrontendConfig {
    fn default() -> Self {
        Self {
            url: default_frontend_url(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    #[default]
    Local,
    R2,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct StorageConfig {
    #[serde(default, rename = "type")]
    pub storage_type: StorageType,
    #[serde(default)]
    pub local: LocalStorageConfig,
    pub r2: Option<R2StorageConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LocalStorageConfig {
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,
    #[serde(default = "default_local_base_url")]
    pub base_url: String,
}

impl Default for LocalStorageConfig {
    fn default() -> Self {
        Self {
            upload_dir: default_upload_dir(),
            base_url: default_local_base_url(),
        }
    }
}

/// S3 compatible object storage settings.
#[derive(Clone, Deserialize)]
pub struct R2StorageConfig {
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: String,
    pub bucket: String,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default = "default_presigned_expiry")]
    pub presigned_url_expiry_minutes: u32,
}

impl fmt::Debug for R2StorageConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("R2StorageConfig")
            .field("endpoint", &self.endpoint)
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field(
                "presigned_url_expiry_minutes",
                &self.presigned_url_expiry_minutes,
            )
            .finish()
    }
}

/// Registration OTP settings. Only carried for the authentication collaborator.
#[derive(Debug, Clone, Deserialize)]
pub struct OtpConfig {
    #[serde(default = "default_otp_expiry")]
    pub expiry_minutes: u32,
}

impl Default for OtpConfig {
    fn default() -> Self {
        Self {
            expiry_minutes: default_otp_expiry(),
        }
    }
}

fn default_frontend_url() -> String {
    "http://localhost:5556".to_owned()
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("uploads")
}

fn default_local_base_url() -> String {
    "http://localhost:5555".to_owned()
}

fn default_region() -> String {
    "auto".to_owned()
}

fn default_presigned_expiry() -> u32 {
    60
}

fn default_otp_expiry() -> u32 {
    5
}

/// The process wide AES-256 key that wraps every private key at rest.
/// Zeroized on drop, never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct MasterKey([u8; MASTER_KEY_LEN]);

impl MasterKey {
    pub fn new(bytes: [u8; MASTER_KEY_LEN]) -> Self {
        Self(bytes)
    }

    pub fn from_base64(encoded: &str) -> Result<Self> {
        let mut decoded = base64::decode(encoded.trim())
            .map_err(|_| Error::Config("crypto.master_key is not valid base64".to_owned()))?;
        if decoded.len() != MASTER_KEY_LEN {
            let len = decoded.len();
            decoded.zeroize();
            return Err(Error::Config(format!(
                "crypto.master_key must decode to {} bytes, got {}",
                MASTER_KEY_LEN, len
            )));
        }
        let mut bytes = [0u8; MASTER_KEY_LEN];
        bytes.copy_from_slice(&decoded);
        decoded.zeroize();
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; MASTER_KEY_LEN] {
        &self.0
    }
}

impl Drop for MasterKey {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MasterKey(<redacted>)")
    }
}

impl<'de> Deserialize<'de> for MasterKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        MasterKey::from_base64(&encoded).map_err(serde::de::Error::custom)
    }
}

impl Config {
    /// Minimal configuration, mostly for tests and demos.
    pub fn new(master_key: MasterKey, frontend_url: impl Into<String>) -> Self {
        Self {
            crypto: CryptoConfig { master_key },
            frontend: FrontendConfig {
                url: frontend_url.into(),
            },
            storage: StorageConfig::default(),
            otp: OtpConfig::default(),
        }
    }

    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Config = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let source = std::fs::read_to_string(path.as_ref()).map_err(|err| {
            Error::Config(format!(
                "Can not read config file `{}`: {}",
                path.as_ref().display(),
                err
            ))
        })?;
        Self::from_toml_str(&source)
    }

    pub fn validate(&self) -> Result<()> {
        if self.frontend.url.trim().is_empty() {
            return Err(Error::Config("frontend.url must not be empty".to_owned()));
        }
        if self.storage.storage_type == StorageType::R2 {
            let r2 = self.storage.r2.as_ref().ok_or_else(|| {
                Error::Config("storage.type = r2 requires a [storage.r2] section".to_owned())
            })?;
            let required = [
                ("endpoint", &r2.endpoint),
                ("access_key", &r2.access_key),
                ("secret_key", &r2.secret_key),
                ("bucket", &r2.bucket),
            ];
            for (name, value) in required {
                if value.trim().is_empty() {
                    return Err(Error::Config(format!("storage.r2.{} must be set", name)));
                }
            }
        }
        Ok(())
    }

    /// `{frontend.url}` without a trailing slash.
    pub fn frontend_base(&self) -> &str {
        self.frontend.url.trim_end_matches('/')
    }

    pub fn signing_url(&self, token: &str) -> String {
        format!("{}/signing/{}", self.frontend_base(), token)
    }

    pub fn verification_url(&self, document_id: &str) -> String {
        format!("{}/verify/{}", self.frontend_base(), document_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key_b64() -> String {
        base64::encode([7u8; 32])
    }

    #[test]
    fn test_defaults_are_applied() {
        let source = format!("[crypto]\nmaster_key = \"{}\"\n", key_b64());
        let config = Config::from_toml_str(&source).unwrap();
        assert_eq!(config.frontend.url, "http://localhost:5556");
        assert_eq!(config.storage.storage_type, StorageType::Local);
        assert_eq!(config.storage.local.upload_dir, PathBuf::from("uploads"));
        assert_eq!(config.otp.expiry_minutes, 5);
        assert_eq!(config.crypto.master_key.as_bytes(), &[7u8; 32]);
    }

    #[test]
    fn test_short_master_key_is_rejected() {
        let source = format!(
            "[crypto]\nmaster_key = \"{}\"\n",
            base64::encode([1u8; 16])
        );
        assert!(matches!(
            Config::from_toml_str(&source),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_r2_requires_complete_section() {
        let source = format!(
            "[crypto]\nmaster_key = \"{}\"\n[storage]\ntype = \"r2\"\n[storage.r2]\nendpoint = \"https://r2.example.com\"\naccess_key = \"ak\"\nsecret_key = \"\"\nbucket = \"docs\"\n",
            key_b64()
        );
        let err = Config::from_toml_str(&source).unwrap_err();
        assert!(err.to_string().contains("secret_key"));
    }

    #[test]
    fn test_urls_strip_trailing_slash() {
        let config = Config::new(MasterKey::new([0u8; 32]), "https://sign.example.com/");
        assert_eq!(
            config.signing_url("abc"),
            "https://sign.example.com/signing/abc"
        );
        assert_eq!(
            config.verification_url("doc-1"),
            "https://sign.example.com/verify/doc-1"
        );
    }

    #[test]
    fn test_master_key_debug_is_redacted() {
        let key = MasterKey::new([9u8; 32]);
        assert_eq!(format!("{:?}", key), "MasterKey(<redacted>)");
    }
}
