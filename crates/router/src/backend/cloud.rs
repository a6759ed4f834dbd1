use serde::{Deserialize, Serialize};

use super::EmbeddingError;

#[derive(Serialize)]
struct CloudEmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct CloudEmbeddingResponse {
    data: Vec<CloudEmbeddingData>,
}

#[derive(Deserialize)]
struct CloudEmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

#[derive(Deserialize)]
struct CloudError {
    error: CloudErrorDetail,
}

#[derive(Deserialize)]
struct CloudErrorDetail {
    message: String,
}

/// Call an OpenAI-compatible /v1/embeddings endpoint. Returns one embedding
/// per input, in input order.
pub async fn call_cloud_embeddings(
    http: &reqwest::Client,
    base_url: &str,
    api_key: &str,
    model: &str,
    texts: &[String],
) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    let url = format!("{}/v1/embeddings", base_url.trim_end_matches('/'));
    let start = std::time::Instant::now();

    let request = CloudEmbeddingRequest {
        model,
        input: texts,
    };

    let response = http
        .post(&url)
        .bearer_auth(api_key)
        .json(&request)
        .send()
        .await
        .map_err(|e| EmbeddingError::Http(e.to_string()))?;

    metrics::histogram!("router.embedding.latency", "provider" => "cloud")
        .record(start.elapsed().as_secs_f64());

    let status = response.status();

    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        let body = response.text().await.unwrap_or_default();
        return Err(EmbeddingError::Auth(format!("{}: {}", status, body)));
    }

    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok());
        return Err(EmbeddingError::QuotaExceeded { retry_after });
    }

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let msg = serde_json::from_str::<CloudError>(&body)
            .map(|e| e.error.message)
            .unwrap_or(body);
        return Err(EmbeddingError::Api(format!("{}: {}", status, msg)));
    }

    let body: CloudEmbeddingResponse = response
        .json()
        .await
        .map_err(|e| EmbeddingError::Api(format!("Failed to parse response: {}", e)))?;

    if body.data.len() != texts.len() {
        return Err(EmbeddingError::Api(format!(
            "Expected {} embeddings, got {}",
            texts.len(),
            body.data.len()
        )));
    }

    // Sort by index to maintain input order.
    let mut sorted = body.data;
    sorted.sort_by_key(|d| d.index);

    Ok(sorted.into_iter().map(|d| d.embedding).collect())
}
