//! Configuration for the SII submission client and the timestamp authority.
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Endpoint used when no explicit URL is configured. AEAT currently serves the
/// test and production flavours of the SiiStd service from the same host.
pub const DEFAULT_API_URL: &str = "https://www1.agenciatributaria.es/wlpl/SiiStd/ws/SiiStd";

const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(5000);
const DEFAULT_TIMEOUT: Duration = Duration::from_millis(60_000);
const DEFAULT_TSA_TIMEOUT: Duration = Duration::from_millis(30_000);

/// Errors raised while building configuration. These are fatal and surface at
/// construction time, never during a submission.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("missing required configuration field '{field}'")]
    Missing { field: &'static str },
    #[error("invalid value for configuration field '{field}': {value}")]
    Invalid { field: &'static str, value: String },
}

/// Configuration for [`SiiClient`](crate::api::SiiClient).
///
/// # Examples
/// ```rust
/// use std::time::Duration;
/// use sii_core::config::SiiConfig;
///
/// let config = SiiConfig::new("B12345678", "certs/company.p12", "secret")?
///     .with_test_mode(true)
///     .with_retry_delay(Duration::from_millis(500));
/// # let _ = config;
/// # Ok::<(), sii_core::config::ConfigError>(())
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiiConfig {
    api_url: String,
    nif: String,
    test_mode: bool,
    certificate_path: PathBuf,
    certificate_password: String,
    retry_attempts: u32,
    retry_delay: Duration,
    timeout: Duration,
}

impl SiiConfig {
    /// Build a configuration with defaults for everything but the identity
    /// fields. Missing NIF, certificate path, or certificate password is a
    /// fatal error here.
    pub fn new(
        nif: impl Into<String>,
        certificate_path: impl Into<PathBuf>,
        certificate_password: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let nif = nif.into();
        let certificate_path = certificate_path.into();
        let certificate_password = certificate_password.into();

        if nif.trim().is_empty() {
            return Err(ConfigError::Missing { field: "nif" });
        }
        if certificate_path.as_os_str().is_empty() {
            return Err(ConfigError::Missing {
                field: "certificate_path",
            });
        }
        if certificate_password.is_empty() {
            return Err(ConfigError::Missing {
                field: "certificate_password",
            });
        }

        Ok(Self {
            api_url: DEFAULT_API_URL.to_string(),
            nif,
            test_mode: false,
            certificate_path,
            certificate_password,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
            timeout: DEFAULT_TIMEOUT,
        })
    }

    /// Read configuration from `SII_*` environment variables.
    ///
    /// `SII_NIF`, `SII_CERTIFICATE_PATH`, and `SII_CERTIFICATE_PASSWORD` are
    /// required; `SII_API_URL`, `SII_TEST_MODE`, `SII_RETRY_ATTEMPTS`,
    /// `SII_RETRY_DELAY_MS`, and `SII_TIMEOUT_MS` override the defaults.
    ///
    /// # Errors
    /// Returns [`ConfigError`] when a required variable is absent or a numeric
    /// override cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        let var = |name: &'static str| std::env::var(name).ok().filter(|v| !v.is_empty());

        let nif = var("SII_NIF").ok_or(ConfigError::Missing { field: "nif" })?;
        let certificate_path = var("SII_CERTIFICATE_PATH").ok_or(ConfigError::Missing {
            field: "certificate_path",
        })?;
        let certificate_password = var("SII_CERTIFICATE_PASSWORD").ok_or(ConfigError::Missing {
            field: "certificate_password",
        })?;

        let mut config = Self::new(nif, certificate_path, certificate_password)?;

        if let Some(url) = var("SII_API_URL") {
            config.api_url = url;
        }
        if let Some(mode) = var("SII_TEST_MODE") {
            config.test_mode = mode == "true" || mode == "1";
        }
        if let Some(attempts) = var("SII_RETRY_ATTEMPTS") {
            config.retry_attempts = parse_num("retry_attempts", &attempts)? as u32;
        }
        if let Some(delay) = var("SII_RETRY_DELAY_MS") {
            config.retry_delay = Duration::from_millis(parse_num("retry_delay", &delay)?);
        }
        if let Some(timeout) = var("SII_TIMEOUT_MS") {
            config.timeout = Duration::from_millis(parse_num("timeout", &timeout)?);
        }

        Ok(config)
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    pub fn with_test_mode(mut self, test_mode: bool) -> Self {
        self.test_mode = test_mode;
        self
    }

    pub fn with_retry_attempts(mut self, retry_attempts: u32) -> Self {
        self.retry_attempts = retry_attempts;
        self
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    pub fn nif(&self) -> &str {
        &self.nif
    }

    pub fn test_mode(&self) -> bool {
        self.test_mode
    }

    pub fn certificate_path(&self) -> &Path {
        &self.certificate_path
    }

    pub fn certificate_password(&self) -> &str {
        &self.certificate_password
    }

    pub fn retry_attempts(&self) -> u32 {
        self.retry_attempts
    }

    pub fn retry_delay(&self) -> Duration {
        self.retry_delay
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

fn parse_num(field: &'static str, value: &str) -> Result<u64, ConfigError> {
    value.parse().map_err(|_| ConfigError::Invalid {
        field,
        value: value.to_string(),
    })
}

/// Configuration for [`TimestampClient`](crate::timestamp::TimestampClient).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TsaConfig {
    tsa_url: String,
    timeout: Duration,
    username: Option<String>,
    password: Option<String>,
    enable_stub: bool,
}

impl TsaConfig {
    pub fn new(tsa_url: impl Into<String>) -> Self {
        Self {
            tsa_url: tsa_url.into(),
            timeout: DEFAULT_TSA_TIMEOUT,
            username: None,
            password: None,
            enable_stub: false,
        }
    }

    /// Basic-auth credentials for TSA endpoints that require them.
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Opt in to fabricated, non-cryptographic timestamps for environments
    /// without TSA access. Off by default.
    pub fn with_stub(mut self, enable_stub: bool) -> Self {
        self.enable_stub = enable_stub;
        self
    }

    pub fn tsa_url(&self) -> &str {
        &self.tsa_url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    pub fn stub_enabled(&self) -> bool {
        self.enable_stub
    }
}
