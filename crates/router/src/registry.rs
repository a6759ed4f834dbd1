use std::future::Future;
use std::pin::Pin;

use tierroute_common::api::registry::{KeywordSearchResponse, ListActiveResponse};
use tierroute_common::types::Template;

/// Errors from the template registry sidecar.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Registry HTTP error: {0}")]
    Http(String),

    #[error("Registry API error: {0}")]
    Api(String),

    #[error("Registry response parse error: {0}")]
    Parse(String),
}

impl From<RegistryError> for tierroute_common::TierRouteError {
    fn from(e: RegistryError) -> Self {
        tierroute_common::TierRouteError::Registry(e.to_string())
    }
}

pub type RegistryFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<T, RegistryError>> + Send + 'a>>;

/// The slice of the registry the router consumes. The registry's authoring,
/// promotion, and distillation surfaces are not called from here.
///
/// Object-safe for dyn dispatch; tests provide an in-memory fake.
pub trait TemplateRegistry: Send + Sync {
    /// All currently indexable templates.
    fn list_active<'a>(&'a self) -> RegistryFuture<'a, Vec<Template>>;

    /// Best-effort keyword/full-text search. May return empty; ordering is
    /// the registry's responsibility.
    fn search_by_keywords<'a>(
        &'a self,
        query: &'a str,
        limit: usize,
    ) -> RegistryFuture<'a, Vec<Template>>;
}

/// HTTP client for the registry sidecar.
pub struct HttpRegistryClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpRegistryClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Verify the sidecar is reachable.
    pub async fn health_check(&self) -> Result<(), RegistryError> {
        let url = format!("{}/health", self.base_url);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| RegistryError::Http(e.to_string()))?;

        if !response.status().is_success() {
            return Err(RegistryError::Api(format!(
                "Health check returned {}",
                response.status()
            )));
        }
        Ok(())
    }

    async fn get_active(&self) -> Result<Vec<Template>, RegistryError> {
        let url = format!("{}/templates/active", self.base_url);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| RegistryError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RegistryError::Api(format!("{}: {}", status, body)));
        }

        let body: ListActiveResponse = response
            .json()
            .await
            .map_err(|e| RegistryError::Parse(e.to_string()))?;

        Ok(body.templates)
    }

    async fn get_keyword_matches(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<Template>, RegistryError> {
        let url = format!("{}/templates/search", self.base_url);
        let response = self
            .http
            .get(&url)
            .query(&[("q", query), ("limit", &limit.to_string())])
            .send()
            .await
            .map_err(|e| RegistryError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RegistryError::Api(format!("{}: {}", status, body)));
        }

        let body: KeywordSearchResponse = response
            .json()
            .await
            .map_err(|e| RegistryError::Parse(e.to_string()))?;

        Ok(body.templates)
    }
}

impl TemplateRegistry for HttpRegistryClient {
    fn list_active<'a>(&'a self) -> RegistryFuture<'a, Vec<Template>> {
        Box::pin(self.get_active())
    }

    fn search_by_keywords<'a>(
        &'a self,
        query: &'a str,
        limit: usize,
    ) -> RegistryFuture<'a, Vec<Template>> {
        Box::pin(self.get_keyword_matches(query, limit))
    }
}
