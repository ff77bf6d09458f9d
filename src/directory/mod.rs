//! Directory service client.
//!
//! The directory resolves an intercom session name to its configuration
//! and validates participant identities. It is read-only and consulted at
//! startup and on reconfiguration; everything else runs over the broadcast
//! topic. [`HttpDirectory`] talks to a REST directory; [`StaticDirectory`]
//! serves fixed data for tests and the demo binary.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::config::IntercomConfig;
use crate::errors::DirectoryError;

/// Read-only directory lookups.
#[async_trait]
pub trait Directory: Send + Sync {
    /// Resolve a session name to its intercom configuration.
    async fn intercom_config(&self, name: &str) -> Result<IntercomConfig, DirectoryError>;

    /// Check that a participant identity is registered. Distinguishes an
    /// unregistered identity from one that is not even well-formed.
    async fn validate_identity(&self, identity: &str) -> Result<(), DirectoryError>;
}

// ---------------------------------------------------------------------------
// HTTP implementation
// ---------------------------------------------------------------------------

/// Directory client over a REST endpoint.
///
/// `GET {base}/intercoms/{name}` returns the intercom configuration;
/// `GET {base}/identities/{id}` returns 200 for a registered identity.
/// 404 maps to not-found, 400/422 to malformed-identity.
#[derive(Debug, Clone)]
pub struct HttpDirectory {
    base_url: String,
    timeout: Duration,
}

impl HttpDirectory {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn client(&self) -> Result<reqwest::Client, DirectoryError> {
        reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|err| DirectoryError::Request {
                message: err.to_string(),
            })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl Directory for HttpDirectory {
    async fn intercom_config(&self, name: &str) -> Result<IntercomConfig, DirectoryError> {
        let url = self.url(&format!("intercoms/{name}"));
        log::debug!("Fetching intercom configuration from {url}");

        let response = self
            .client()?
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|err| DirectoryError::Request {
                message: err.to_string(),
            })?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(DirectoryError::IntercomNotFound {
                name: name.to_string(),
            });
        }
        if !response.status().is_success() {
            return Err(DirectoryError::Request {
                message: format!("HTTP {} from {url}", response.status()),
            });
        }

        response
            .json::<IntercomConfig>()
            .await
            .map_err(|err| DirectoryError::Request {
                message: err.to_string(),
            })
    }

    async fn validate_identity(&self, identity: &str) -> Result<(), DirectoryError> {
        let url = self.url(&format!("identities/{identity}"));
        log::debug!("Validating identity against {url}");

        let response = self
            .client()?
            .get(&url)
            .send()
            .await
            .map_err(|err| DirectoryError::Request {
                message: err.to_string(),
            })?;

        match response.status() {
            status if status.is_success() => Ok(()),
            reqwest::StatusCode::NOT_FOUND => Err(DirectoryError::IdentityNotFound {
                identity: identity.to_string(),
            }),
            reqwest::StatusCode::BAD_REQUEST | reqwest::StatusCode::UNPROCESSABLE_ENTITY => {
                Err(DirectoryError::MalformedIdentity {
                    identity: identity.to_string(),
                })
            }
            status => Err(DirectoryError::Request {
                message: format!("HTTP {status} from {url}"),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Static implementation
// ---------------------------------------------------------------------------

/// Fixed in-memory directory for tests and demos. Identities are UUIDs;
/// anything that does not parse as one is malformed, mirroring what a real
/// directory backend rejects at the type level.
#[derive(Debug, Default)]
pub struct StaticDirectory {
    intercoms: HashMap<String, IntercomConfig>,
    identities: HashSet<String>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_intercom(mut self, name: impl Into<String>, config: IntercomConfig) -> Self {
        self.intercoms.insert(name.into(), config);
        self
    }

    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identities.insert(identity.into());
        self
    }
}

#[async_trait]
impl Directory for StaticDirectory {
    async fn intercom_config(&self, name: &str) -> Result<IntercomConfig, DirectoryError> {
        self.intercoms
            .get(name)
            .cloned()
            .ok_or_else(|| DirectoryError::IntercomNotFound {
                name: name.to_string(),
            })
    }

    async fn validate_identity(&self, identity: &str) -> Result<(), DirectoryError> {
        if Uuid::parse_str(identity).is_err() {
            return Err(DirectoryError::MalformedIdentity {
                identity: identity.to_string(),
            });
        }
        if self.identities.contains(identity) {
            Ok(())
        } else {
            Err(DirectoryError::IdentityNotFound {
                identity: identity.to_string(),
            })
        }
    }
}
