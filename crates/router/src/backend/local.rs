use serde::{Deserialize, Serialize};

use super::EmbeddingError;

#[derive(Serialize)]
struct LocalEmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct LocalEmbeddingResponse {
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Deserialize)]
struct TagEntry {
    name: String,
}

#[derive(Serialize)]
struct PullRequest<'a> {
    name: &'a str,
    stream: bool,
}

/// Call the local inference server's embedding endpoint.
pub async fn call_local_embeddings(
    http: &reqwest::Client,
    base_url: &str,
    model: &str,
    text: &str,
) -> Result<Vec<f32>, EmbeddingError> {
    let url = format!("{}/api/embeddings", base_url.trim_end_matches('/'));
    let start = std::time::Instant::now();

    let request = LocalEmbeddingRequest {
        model,
        prompt: text,
    };

    let response = http
        .post(&url)
        .json(&request)
        .send()
        .await
        .map_err(|e| EmbeddingError::Http(e.to_string()))?;

    metrics::histogram!("router.embedding.latency", "provider" => "local")
        .record(start.elapsed().as_secs_f64());

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(EmbeddingError::Api(format!("{}: {}", status, body)));
    }

    let body: LocalEmbeddingResponse = response
        .json()
        .await
        .map_err(|e| EmbeddingError::Api(format!("Failed to parse response: {}", e)))?;

    if body.embedding.is_empty() {
        return Err(EmbeddingError::Api(
            "Local provider returned an empty embedding".into(),
        ));
    }

    Ok(body.embedding)
}

/// Check whether the configured model is present on the local server.
///
/// The tags listing may report names with a `:tag` suffix
/// ("nomic-embed-text:latest"); a bare configured name matches any tag.
pub async fn probe_model(
    http: &reqwest::Client,
    base_url: &str,
    model: &str,
) -> Result<bool, EmbeddingError> {
    let url = format!("{}/api/tags", base_url.trim_end_matches('/'));

    let response = http
        .get(&url)
        .send()
        .await
        .map_err(|e| EmbeddingError::Http(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(EmbeddingError::Api(format!("{}: {}", status, body)));
    }

    let body: TagsResponse = response
        .json()
        .await
        .map_err(|e| EmbeddingError::Api(format!("Failed to parse tags: {}", e)))?;

    Ok(body
        .models
        .iter()
        .any(|m| m.name == model || m.name.starts_with(&format!("{}:", model))))
}

/// Ask the local server to pull the configured model. Blocks until the pull
/// completes; only invoked when `auto_pull` is enabled and the probe
/// reported the model missing.
pub async fn pull_model(
    http: &reqwest::Client,
    base_url: &str,
    model: &str,
) -> Result<(), EmbeddingError> {
    let url = format!("{}/api/pull", base_url.trim_end_matches('/'));

    let response = http
        .post(&url)
        .json(&PullRequest {
            name: model,
            stream: false,
        })
        .send()
        .await
        .map_err(|e| EmbeddingError::Http(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(EmbeddingError::Api(format!("{}: {}", status, body)));
    }

    Ok(())
}
