//! SDK entry point.

use std::sync::Arc;

use tracing::info;

use crate::config::ClientConfig;
use crate::error::{Result, SdkError};
use crate::loader::LoadAllSettings;
use crate::query::QueryBuilder;
use crate::session::FindSession;
use crate::transport::{HttpTransport, Transport};

/// Find endpoint, relative to the base URL.
pub const FIND_PATH: &str = "/data/v1/row/find";

/// Delete endpoint, relative to the base URL.
pub const DELETE_PATH: &str = "/data/v1/row/delete";

/// Handle to one platform domain.
///
/// Cheap to clone; clones share the transport and its headers.
#[derive(Clone)]
pub struct SbxClient {
    domain: u64,
    transport: Arc<dyn Transport>,
    http: Option<Arc<HttpTransport>>,
    load_all: LoadAllSettings,
}

impl SbxClient {
    /// Create a client talking HTTP to `config.base_url`.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let http = Arc::new(HttpTransport::new(
            &config.base_url,
            &config.app_key,
            config.timeout,
        )?);

        info!(domain = config.domain, base_url = %config.base_url, "SBX client initialized");

        Ok(Self::from_http(config.domain, http, config.load_all))
    }

    /// Create a client over a shared HTTP transport.
    ///
    /// Header and token setters act on `http`, so they are visible to every
    /// other holder of the same transport.
    pub fn from_http(domain: u64, http: Arc<HttpTransport>, load_all: LoadAllSettings) -> Self {
        Self {
            domain,
            transport: Arc::clone(&http) as Arc<dyn Transport>,
            http: Some(http),
            load_all,
        }
    }

    /// Create a client over any transport.
    ///
    /// The transport is opaque here, so header and token setters return
    /// [`SdkError::Config`]. Use [`SbxClient::from_http`] for an
    /// [`HttpTransport`].
    pub fn with_transport(
        domain: u64,
        transport: Arc<dyn Transport>,
        load_all: LoadAllSettings,
    ) -> Self {
        Self {
            domain,
            transport,
            http: None,
            load_all,
        }
    }

    pub fn domain(&self) -> u64 {
        self.domain
    }

    /// Start a query on `model`.
    pub fn with(&self, model: impl Into<String>) -> FindSession {
        FindSession::new(
            self.query(model),
            Arc::clone(&self.transport),
            self.load_all,
        )
    }

    /// A bare query builder for `model` in this domain.
    pub fn query(&self, model: impl Into<String>) -> QueryBuilder {
        QueryBuilder::new(self.domain, model)
    }

    /// Send a header with every subsequent request.
    pub fn set_header(&self, name: &str, value: &str) -> Result<()> {
        self.http()?.set_header(name, value)
    }

    pub fn remove_header(&self, name: &str) -> Result<()> {
        self.http()?.remove_header(name);
        Ok(())
    }

    /// Authenticate subsequent requests with a bearer token.
    pub fn set_token(&self, token: &str) -> Result<()> {
        self.http()?.set_token(token)
    }

    pub fn clear_token(&self) -> Result<()> {
        self.http()?.clear_token();
        Ok(())
    }

    fn http(&self) -> Result<&HttpTransport> {
        self.http
            .as_deref()
            .ok_or_else(|| SdkError::Config("client has no HTTP transport".to_string()))
    }
}

impl std::fmt::Debug for SbxClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SbxClient")
            .field("domain", &self.domain)
            .field("load_all", &self.load_all)
            .finish()
    }
}
