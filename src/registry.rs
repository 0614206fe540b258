//! # Registry Client
//!
//! Talks the registry v2 wire protocol for anonymous pulls: the token
//! endpoint, the manifest endpoint, and the blob endpoint.
//!
//! ## Authentication
//!
//! Anonymous only. A bearer token scoped to
//! `repository:<namespace>/<name>:pull` is fetched lazily and refreshed
//! inline before every request that needs it. Expiry is recomputed from
//! `issued_at + expires_in` each time, and a token whose `issued_at`
//! cannot be parsed is treated as expired. Tokens live only in memory
//! for the duration of one pull.
//!
//! ## Manifest Resolution
//!
//! The first manifest request advertises the OCI index media type; the
//! response is dispatched on its Content-Type (see
//! [`crate::manifest::decode_document`]). For a multi-platform index the
//! client selects the host-matching entry and re-fetches that digest with
//! the OCI manifest accept header. An index pointing at another index is
//! an error; resolution recurses exactly one level.
//!
//! ## Failure Model
//!
//! No retries, no backoff: any transport failure or non-2xx status aborts
//! the pull with [`Error::Network`].

use crate::config::Config;
use crate::constants::{OCI_INDEX_MEDIA_TYPE, OCI_MANIFEST_MEDIA_TYPE, AUTH_SERVICE};
use crate::error::{Error, Result};
use crate::manifest::{decode_document, select_platform_entry, Manifest, ManifestDocument};
use crate::platform::Platform;
use serde::Deserialize;
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// Bearer token returned by the token endpoint.
///
/// Immutable; replaced wholesale on refresh.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthToken {
    /// The bearer credential itself.
    pub access_token: String,
    /// Issue timestamp, RFC 3339.
    #[serde(default)]
    pub issued_at: String,
    /// Lifetime in seconds from `issued_at`.
    #[serde(default)]
    pub expires_in: u64,
}

impl AuthToken {
    /// Returns true if the token has expired (or its issue timestamp is
    /// unparseable, which is treated as expired).
    pub fn is_expired(&self) -> bool {
        let issued = match chrono::DateTime::parse_from_rfc3339(&self.issued_at) {
            Ok(t) => t,
            Err(_) => return true,
        };
        let expires_at = issued + chrono::Duration::seconds(self.expires_in as i64);
        chrono::Utc::now() > expires_at
    }
}

/// Splits an image reference into `(name, tag)`, defaulting the tag to
/// `latest`.
pub fn parse_image(image: &str) -> (String, String) {
    match image.split_once(':') {
        Some((name, tag)) => (name.to_string(), tag.to_string()),
        None => (image.to_string(), "latest".to_string()),
    }
}

/// Canonicalizes a repository name: bare names get the `library/`
/// namespace prepended.
pub fn canonical_repository(name: &str) -> String {
    if name.contains('/') {
        name.to_string()
    } else {
        format!("library/{}", name)
    }
}

/// Registry v2 client for one repository.
///
/// Holds the current bearer token and refreshes it inline whenever a
/// request finds it expired. Not shared across pulls.
pub struct RegistryClient {
    http: reqwest::Client,
    auth_base: String,
    registry_base: String,
    repository: String,
    token: Option<AuthToken>,
}

impl RegistryClient {
    /// Creates a client for the given repository (already canonicalized).
    pub fn new(config: &Config, repository: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            auth_base: config.auth_base().to_string(),
            registry_base: config.registry_base().to_string(),
            repository: repository.to_string(),
            token: None,
        }
    }

    /// Returns a fresh bearer credential, fetching or refreshing the
    /// token first if needed.
    async fn fresh_token(&mut self) -> Result<String> {
        let needs_refresh = match &self.token {
            Some(token) => token.is_expired(),
            None => true,
        };

        if needs_refresh {
            let token = self.request_token().await?;
            debug!(
                repository = %self.repository,
                expires_in = token.expires_in,
                "obtained registry token"
            );
            self.token = Some(token);
        }

        // Token was just set on the refresh path.
        Ok(self.token.as_ref().map(|t| t.access_token.clone()).unwrap_or_default())
    }

    /// Requests a pull-scoped token from the token endpoint
    /// (unauthenticated GET).
    async fn request_token(&self) -> Result<AuthToken> {
        let url = format!(
            "{}/token?service={}&scope=repository:{}:pull",
            self.auth_base, AUTH_SERVICE, self.repository
        );

        let response = self.http.get(&url).send().await.map_err(|e| Error::Network {
            context: format!("token for {}", self.repository),
            reason: e.to_string(),
        })?;

        if !response.status().is_success() {
            return Err(Error::Network {
                context: format!("token for {}", self.repository),
                reason: format!("status {}", response.status()),
            });
        }

        response.json::<AuthToken>().await.map_err(|e| Error::Decode {
            what: "auth token".to_string(),
            reason: e.to_string(),
        })
    }

    /// Fetches a manifest by tag or digest, returning the response
    /// Content-Type and body.
    async fn fetch_manifest(&mut self, reference: &str, accept: &str) -> Result<(String, Vec<u8>)> {
        let bearer = self.fresh_token().await?;
        let url = format!(
            "{}/v2/{}/manifests/{}",
            self.registry_base, self.repository, reference
        );

        let response = self
            .http
            .get(&url)
            .bearer_auth(&bearer)
            .header(reqwest::header::ACCEPT, accept)
            .send()
            .await
            .map_err(|e| Error::Network {
                context: format!("manifest {}", reference),
                reason: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(Error::Network {
                context: format!("manifest {}", reference),
                reason: format!("status {}", response.status()),
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        let body = response.bytes().await.map_err(|e| Error::Network {
            context: format!("manifest {}", reference),
            reason: e.to_string(),
        })?;

        Ok((content_type, body.to_vec()))
    }

    /// Resolves a reference to a platform-specific manifest.
    ///
    /// An index is re-resolved through the entry matching the host
    /// platform; resolution never recurses more than one level.
    pub async fn resolve_manifest(&mut self, reference: &str, host: &Platform) -> Result<Manifest> {
        let (content_type, body) = self.fetch_manifest(reference, OCI_INDEX_MEDIA_TYPE).await?;

        match decode_document(&content_type, &body)? {
            ManifestDocument::V1(m) => Ok(Manifest::V1(m)),
            ManifestDocument::V2(m) => Ok(Manifest::V2(m)),
            ManifestDocument::Index(index) => {
                let entry = select_platform_entry(&index, host)?;
                info!(
                    digest = %entry.digest,
                    platform = %host,
                    "resolved index entry"
                );

                let digest = entry.digest.clone();
                let (content_type, body) =
                    self.fetch_manifest(&digest, OCI_MANIFEST_MEDIA_TYPE).await?;

                match decode_document(&content_type, &body)? {
                    ManifestDocument::V1(m) => Ok(Manifest::V1(m)),
                    ManifestDocument::V2(m) => Ok(Manifest::V2(m)),
                    ManifestDocument::Index(_) => Err(Error::UnsupportedFormat(
                        "nested image index".to_string(),
                    )),
                }
            }
        }
    }

    /// Downloads a blob to `dest`, streaming chunks to disk.
    pub async fn download_blob(&mut self, digest: &str, accept: &str, dest: &Path) -> Result<()> {
        let bearer = self.fresh_token().await?;
        let url = format!(
            "{}/v2/{}/blobs/{}",
            self.registry_base, self.repository, digest
        );

        let mut response = self
            .http
            .get(&url)
            .bearer_auth(&bearer)
            .header(reqwest::header::ACCEPT, accept)
            .send()
            .await
            .map_err(|e| Error::Network {
                context: format!("blob {}", digest),
                reason: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(Error::Network {
                context: format!("blob {}", digest),
                reason: format!("status {}", response.status()),
            });
        }

        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| Error::fs(dest, e))?;

        while let Some(chunk) = response.chunk().await.map_err(|e| Error::Network {
            context: format!("blob {}", digest),
            reason: e.to_string(),
        })? {
            file.write_all(&chunk).await.map_err(|e| Error::fs(dest, e))?;
        }

        file.flush().await.map_err(|e| Error::fs(dest, e))?;
        debug!(digest, dest = %dest.display(), "stored blob");
        Ok(())
    }
}
