//! Context7 remote client
//!
//! Wraps the SSE transport ([`session`]) with the retry policy ([`retry`])
//! and the payload decoders ([`parser`]) behind the two tools the enrichment
//! flow needs: `resolve-library-id` and `get-library-docs`.

pub mod parser;
pub mod retry;
pub mod session;

use crate::config::Context7Config;
use crate::error::{Error, Result};
use crate::utils::validation::is_valid_api_key;
use crate::utils::HttpClientBuilder;
use async_trait::async_trait;
use parser::ToolResult;
use retry::RetryPolicy;
use serde_json::{json, Value};
use session::{SessionConfig, ToolRequest};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Tool name for library resolution
pub const RESOLVE_LIBRARY_TOOL: &str = "resolve-library-id";

/// Tool name for documentation retrieval
pub const LIBRARY_DOCS_TOOL: &str = "get-library-docs";

/// Source of library identifiers and documentation
///
/// Failures other than lifecycle misuse are reported as absent results, never
/// as errors.
#[async_trait]
pub trait DocsProvider: Send + Sync {
    /// Resolve a library name to a Context7-compatible identifier
    async fn resolve_library_id(&self, library_name: &str) -> Result<Option<String>>;

    /// Fetch formatted documentation; an empty string means none was available
    async fn get_library_docs(&self, library_id: &str, tokens: u32, topic: Option<&str>) -> Result<String>;
}

/// Context7 client
pub struct Context7Client {
    http: reqwest::Client,
    session: SessionConfig,
    retry: RetryPolicy,
    closed: AtomicBool,
    auth_failed: AtomicBool,
}

impl Context7Client {
    /// Create a client, reading the API key from the configured environment variable
    pub fn new(config: &Context7Config) -> Result<Self> {
        Self::with_api_key(config, config.api_key())
    }

    /// Create a client with an explicit API key.
    ///
    /// A malformed key is dropped with a warning and the client runs anonymously.
    pub fn with_api_key(config: &Context7Config, api_key: Option<String>) -> Result<Self> {
        let api_key = match api_key {
            Some(key) if is_valid_api_key(&key) => Some(key),
            Some(_) => {
                tracing::warn!("Context7 API key appears to be malformed");
                None
            }
            None => None,
        };
        if api_key.is_none() {
            tracing::warn!("No Context7 API key provided. Some features may not work.");
        }

        let http = HttpClientBuilder::new().build()?;

        Ok(Self {
            http,
            session: SessionConfig {
                base_url: config.base_url.trim_end_matches('/').to_string(),
                api_key,
                endpoint_timeout: Duration::from_secs(config.endpoint_timeout_secs),
                response_timeout: Duration::from_secs(config.response_timeout_secs),
            },
            retry: RetryPolicy::new(config.max_retries, config.backoff_factor),
            closed: AtomicBool::new(false),
            auth_failed: AtomicBool::new(false),
        })
    }

    /// Whether an API key is in use
    #[must_use]
    pub fn has_api_key(&self) -> bool {
        self.session.api_key.is_some()
    }

    /// Whether any invocation so far was rejected as unauthorized
    #[must_use]
    pub fn auth_failed(&self) -> bool {
        self.auth_failed.load(Ordering::Relaxed)
    }

    /// Close the client; every later call fails with [`Error::ClientClosed`]
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    /// Whether [`Context7Client::close`] has been called
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(Error::ClientClosed)
        } else {
            Ok(())
        }
    }

    /// Invoke a tool with retries; exhausted or permanent failures yield `Ok(None)`
    pub async fn call_tool(&self, request: &ToolRequest) -> Result<Option<Value>> {
        self.ensure_open()?;

        let http = &self.http;
        let session_config = &self.session;
        let auth_failed = &self.auth_failed;

        let payload = self
            .retry
            .run(&request.tool_name, move || async move {
                let outcome = session::invoke(http, session_config, request).await;
                if let Err(e) = &outcome {
                    if e.is_auth() {
                        auth_failed.store(true, Ordering::Relaxed);
                    }
                }
                outcome
            })
            .await;

        Ok(payload)
    }
}

#[async_trait]
impl DocsProvider for Context7Client {
    async fn resolve_library_id(&self, library_name: &str) -> Result<Option<String>> {
        let request = ToolRequest::new(RESOLVE_LIBRARY_TOOL, json!({ "libraryName": library_name }));
        let Some(payload) = self.call_tool(&request).await? else {
            tracing::warn!("Context7 returned nothing resolving library ID for: {library_name}");
            return Ok(None);
        };

        match parser::decode_search_results(&payload) {
            ToolResult::SearchResults(candidates) => {
                Ok(parser::best_match(&candidates, library_name).map(|c| c.library_id.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn get_library_docs(&self, library_id: &str, tokens: u32, topic: Option<&str>) -> Result<String> {
        let mut args = json!({
            "context7CompatibleLibraryID": library_id,
            "tokens": tokens,
        });
        if let Some(topic) = topic {
            args["topic"] = Value::String(topic.to_string());
        }

        let request = ToolRequest::new(LIBRARY_DOCS_TOOL, args);
        let Some(payload) = self.call_tool(&request).await? else {
            tracing::warn!("Context7 returned nothing fetching docs for library: {library_id}");
            return Ok(String::new());
        };

        match parser::decode_docs(&payload) {
            ToolResult::DocsPayload(docs) => Ok(parser::format_docs(&docs)),
            _ => Ok(String::new()),
        }
    }
}
