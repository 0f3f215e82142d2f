//! Relying party configuration
//!
//! Loaded from environment variables with defaults, or built in code.
//!
//! | Variable | Default |
//! |---|---|
//! | `WEBAUTHN_RP_ORIGIN` | `http://localhost:8080` (comma-separated list) |
//! | `WEBAUTHN_RP_ID` | host of the first origin |
//! | `WEBAUTHN_RP_NAME` | `Keyward` |
//! | `WEBAUTHN_RP_ICON` | unset |
//! | `WEBAUTHN_TIMEOUT_SECS` | `300` |
//! | `WEBAUTHN_CHALLENGE_BYTES` | `32` |
//! | `WEBAUTHN_ALGORITHMS` | all supported (COSE ids, comma-separated) |
//! | `WEBAUTHN_ATTESTATION` | `none` |
//! | `WEBAUTHN_USER_VERIFICATION` | `preferred` |
//! | `WEBAUTHN_ATTESTATION_FORMATS` | all registered |
//! | `WEBAUTHN_ALLOW_CROSS_ORIGIN` | `false` |
//! | `SAFETYNET_API_KEY` | unset (no remote verification) |
//! | `SAFETYNET_TIMEOUT_MS` | `5000` |
//! | `SAFETYNET_MAX_AGE_SECS` | `60` |

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use url::Url;

use crate::cbor::DecodeLimits;
use crate::ceremony::options::{AttestationConveyance, UserVerificationRequirement};
use crate::challenge::{DEFAULT_CHALLENGE_BYTES, MIN_CHALLENGE_BYTES};
use crate::cose::CoseAlgorithm;

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid origin URL: {0}")]
    InvalidOrigin(String),

    #[error("No origins configured")]
    NoOrigins,

    #[error("RP ID {rp_id} is not a registrable suffix of origin {origin}")]
    RpIdMismatch { rp_id: String, origin: String },

    #[error("Invalid value for {var}: {value}")]
    InvalidValue { var: &'static str, value: String },

    #[error("Challenge length {0} is below the minimum of 16 bytes")]
    ChallengeTooShort(usize),

    #[error("No signature algorithms configured")]
    NoAlgorithms,
}

/// SafetyNet verification settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafetyNetConfig {
    /// Google API key. Remote verification is skipped when unset.
    pub api_key: Option<String>,
    /// Bound on a single verification call.
    pub timeout: Duration,
    /// Oldest acceptable `timestampMs` relative to now.
    pub max_age: Duration,
}

impl Default for SafetyNetConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            timeout: Duration::from_millis(5000),
            max_age: Duration::from_secs(60),
        }
    }
}

/// Relying party configuration
#[derive(Debug, Clone)]
pub struct RelyingPartyConfig {
    /// Effective domain the credentials are scoped to.
    pub rp_id: String,
    pub rp_name: String,
    pub rp_icon: Option<String>,
    /// Exact origins accepted in client data (scheme, host and port).
    pub origins: Vec<String>,
    /// Ceremony timeout embedded in issued options.
    pub timeout: Duration,
    pub challenge_bytes: usize,
    /// Accepted credential algorithms, in order of preference.
    pub algorithms: Vec<CoseAlgorithm>,
    pub attestation: AttestationConveyance,
    pub user_verification: UserVerificationRequirement,
    /// Attestation formats to accept; `None` accepts every registered format.
    pub attestation_formats: Option<Vec<String>>,
    pub allow_cross_origin: bool,
    pub decode_limits: DecodeLimits,
    /// DER root certificates per attestation format.
    pub trust_anchors: HashMap<String, Vec<Vec<u8>>>,
    pub safetynet: SafetyNetConfig,
}

impl Default for RelyingPartyConfig {
    fn default() -> Self {
        Self {
            rp_id: "localhost".to_string(),
            rp_name: "Keyward".to_string(),
            rp_icon: None,
            origins: vec!["http://localhost:8080".to_string()],
            timeout: Duration::from_secs(300),
            challenge_bytes: DEFAULT_CHALLENGE_BYTES,
            algorithms: CoseAlgorithm::ALL.to_vec(),
            attestation: AttestationConveyance::None,
            user_verification: UserVerificationRequirement::Preferred,
            attestation_formats: None,
            allow_cross_origin: false,
            decode_limits: DecodeLimits::default(),
            trust_anchors: HashMap::new(),
            safetynet: SafetyNetConfig::default(),
        }
    }
}

impl RelyingPartyConfig {
    /// Configuration for a single origin; the RP id is the origin's host.
    pub fn new(rp_name: &str, origin: &str) -> Result<Self, ConfigError> {
        let rp_id = host_of(origin)?;
        let config = Self {
            rp_id,
            rp_name: rp_name.to_string(),
            origins: vec![origin.trim_end_matches('/').to_string()],
            ..Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let origins: Vec<String> = lookup("WEBAUTHN_RP_ORIGIN")
            .map(|value| {
                value
                    .split(',')
                    .map(|origin| origin.trim().trim_end_matches('/').to_string())
                    .filter(|origin| !origin.is_empty())
                    .collect()
            })
            .unwrap_or(defaults.origins);
        let first = origins.first().ok_or(ConfigError::NoOrigins)?;

        let rp_id = match lookup("WEBAUTHN_RP_ID") {
            Some(rp_id) => rp_id,
            None => host_of(first)?,
        };

        let algorithms = match lookup("WEBAUTHN_ALGORITHMS") {
            Some(value) => value
                .split(',')
                .map(|id| {
                    id.trim()
                        .parse::<i64>()
                        .ok()
                        .and_then(|id| CoseAlgorithm::try_from(id).ok())
                        .ok_or_else(|| ConfigError::InvalidValue {
                            var: "WEBAUTHN_ALGORITHMS",
                            value: id.to_string(),
                        })
                })
                .collect::<Result<Vec<_>, _>>()?,
            None => defaults.algorithms,
        };

        let attestation_formats = lookup("WEBAUTHN_ATTESTATION_FORMATS").map(|value| {
            value
                .split(',')
                .map(|fmt| fmt.trim().to_string())
                .filter(|fmt| !fmt.is_empty())
                .collect()
        });

        let safetynet = SafetyNetConfig {
            api_key: lookup("SAFETYNET_API_KEY").filter(|key| !key.is_empty()),
            timeout: parse_var(&lookup, "SAFETYNET_TIMEOUT_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.safetynet.timeout),
            max_age: parse_var(&lookup, "SAFETYNET_MAX_AGE_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.safetynet.max_age),
        };

        let config = Self {
            rp_id,
            rp_name: lookup("WEBAUTHN_RP_NAME").unwrap_or(defaults.rp_name),
            rp_icon: lookup("WEBAUTHN_RP_ICON"),
            origins,
            timeout: parse_var(&lookup, "WEBAUTHN_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            challenge_bytes: parse_var(&lookup, "WEBAUTHN_CHALLENGE_BYTES")?
                .unwrap_or(defaults.challenge_bytes),
            algorithms,
            attestation: parse_var(&lookup, "WEBAUTHN_ATTESTATION")?
                .unwrap_or(defaults.attestation),
            user_verification: parse_var(&lookup, "WEBAUTHN_USER_VERIFICATION")?
                .unwrap_or(defaults.user_verification),
            attestation_formats,
            allow_cross_origin: parse_var(&lookup, "WEBAUTHN_ALLOW_CROSS_ORIGIN")?
                .unwrap_or(defaults.allow_cross_origin),
            decode_limits: defaults.decode_limits,
            trust_anchors: defaults.trust_anchors,
            safetynet,
        };

        config.validate()?;
        Ok(config)
    }

    /// Add a trusted root (DER) for an attestation format.
    pub fn with_trust_anchor(mut self, fmt: &str, root_der: Vec<u8>) -> Self {
        self.trust_anchors
            .entry(fmt.to_string())
            .or_default()
            .push(root_der);
        self
    }

    pub fn trust_anchors_for(&self, fmt: &str) -> &[Vec<u8>] {
        self.trust_anchors
            .get(fmt)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Check internal consistency.
    ///
    /// Origins must be bare `scheme://host[:port]` values, https unless the
    /// host is `localhost`, and the RP id must equal or be a parent domain of
    /// every origin host.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.origins.is_empty() {
            return Err(ConfigError::NoOrigins);
        }
        for origin in &self.origins {
            let url = Url::parse(origin)
                .map_err(|e| ConfigError::InvalidOrigin(format!("{origin}: {e}")))?;
            if url.origin().ascii_serialization() != *origin {
                return Err(ConfigError::InvalidOrigin(format!(
                    "{origin} is not a bare origin"
                )));
            }
            let host = url
                .host_str()
                .ok_or_else(|| ConfigError::InvalidOrigin(origin.clone()))?;
            if url.scheme() != "https" && !(url.scheme() == "http" && host == "localhost") {
                return Err(ConfigError::InvalidOrigin(format!(
                    "{origin} must use https"
                )));
            }
            if host != self.rp_id && !host.ends_with(&format!(".{}", self.rp_id)) {
                return Err(ConfigError::RpIdMismatch {
                    rp_id: self.rp_id.clone(),
                    origin: origin.clone(),
                });
            }
        }
        if self.challenge_bytes < MIN_CHALLENGE_BYTES {
            return Err(ConfigError::ChallengeTooShort(self.challenge_bytes));
        }
        if self.algorithms.is_empty() {
            return Err(ConfigError::NoAlgorithms);
        }
        Ok(())
    }
}

/// Accepted origins and the effective RP id, as seen by the ceremonies.
pub trait OriginProvider: Send + Sync {
    fn allowed_origins(&self) -> Vec<String>;
    fn rp_id(&self) -> String;
}

impl OriginProvider for RelyingPartyConfig {
    fn allowed_origins(&self) -> Vec<String> {
        self.origins.clone()
    }

    fn rp_id(&self) -> String {
        self.rp_id.clone()
    }
}

fn host_of(origin: &str) -> Result<String, ConfigError> {
    Url::parse(origin)
        .ok()
        .and_then(|url| url.host_str().map(str::to_string))
        .ok_or_else(|| ConfigError::InvalidOrigin(origin.to_string()))
}

fn parse_var<T, F>(lookup: &F, var: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(var)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue { var, value })
        })
        .transpose()
}
