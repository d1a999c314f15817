//! HTTP-post handler configuration.
//!
//! The crate does not ship an HTTP client. A `post` handler renders each event
//! into a [`PostRequest`] and hands it to the embedder's [`PostTransport`].

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{HandlerError, ValidationError};
use crate::event::Event;
use crate::handler::Handler;

/// Configuration of one post endpoint.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostConfig {
    /// Identifying name of the endpoint.
    pub endpoint: String,
    /// Target address.
    pub url: String,
    /// Headers added to every request.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

impl PostConfig {
    /// Creates a config without headers.
    #[must_use]
    pub fn new(endpoint: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            url: url.into(),
            headers: BTreeMap::new(),
        }
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Validates the config.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint name or url is missing, or the url
    /// does not parse as an absolute URL.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.endpoint.is_empty() {
            return Err(ValidationError::MissingField {
                field: "endpoint".to_string(),
            });
        }
        if self.url.is_empty() {
            return Err(ValidationError::MissingField {
                field: "url".to_string(),
            });
        }
        self.parsed_url().map(|_| ())
    }

    fn parsed_url(&self) -> Result<Url, ValidationError> {
        Url::parse(&self.url).map_err(|e| ValidationError::InvalidUrl {
            url: self.url.clone(),
            reason: e.to_string(),
        })
    }

    /// Builds a POST request carrying `body`.
    ///
    /// # Errors
    ///
    /// Returns an error if the url does not parse.
    pub fn new_request(&self, body: Vec<u8>) -> Result<PostRequest, ValidationError> {
        Ok(PostRequest {
            url: self.parsed_url()?,
            headers: self.headers.clone(),
            body,
        })
    }
}

impl fmt::Debug for PostConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redacted: BTreeMap<&str, &str> = self.headers.keys().map(|k| (k.as_str(), "<redacted>")).collect();
        f.debug_struct("PostConfig")
            .field("endpoint", &self.endpoint)
            .field("url", &self.url)
            .field("headers", &redacted)
            .finish()
    }
}

/// A list of endpoint configs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PostConfigs(pub Vec<PostConfig>);

impl PostConfigs {
    /// Validates every config, stopping at the first error.
    ///
    /// # Errors
    ///
    /// Returns the first invalid config's error.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.0.iter().try_for_each(PostConfig::validate)
    }

    /// Configs keyed by endpoint name; later entries win on duplicates.
    #[must_use]
    pub fn index(&self) -> HashMap<String, PostConfig> {
        self.0.iter().map(|c| (c.endpoint.clone(), c.clone())).collect()
    }
}

/// A rendered POST request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostRequest {
    /// Target.
    pub url: Url,
    /// Headers.
    pub headers: BTreeMap<String, String>,
    /// Body.
    pub body: Vec<u8>,
}

impl PostRequest {
    /// Always `POST`.
    #[must_use]
    pub const fn method(&self) -> &'static str {
        "POST"
    }
}

/// Sends rendered requests. Supplied by the embedder.
pub trait PostTransport: Send + Sync {
    /// Sends one request.
    ///
    /// # Errors
    ///
    /// Returns an error if delivery failed.
    fn send(&self, request: PostRequest) -> Result<(), HandlerError>;
}

/// Handler forwarding events as JSON bodies to a post endpoint.
pub struct PostHandler {
    id: String,
    config: PostConfig,
    transport: Arc<dyn PostTransport>,
}

impl PostHandler {
    /// Creates a post handler.
    #[must_use]
    pub fn new(id: impl Into<String>, config: PostConfig, transport: Arc<dyn PostTransport>) -> Self {
        Self {
            id: id.into(),
            config,
            transport,
        }
    }
}

impl fmt::Debug for PostHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostHandler")
            .field("id", &self.id)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Handler for PostHandler {
    fn handle(&self, event: &Event) -> Result<(), HandlerError> {
        let body = serde_json::to_vec(event).map_err(|e| HandlerError::Rejected(e.to_string()))?;
        let request = self
            .config
            .new_request(body)
            .map_err(|e| HandlerError::Rejected(e.to_string()))?;
        self.transport.send(request)
    }

    fn name(&self) -> &str {
        &self.id
    }
}
