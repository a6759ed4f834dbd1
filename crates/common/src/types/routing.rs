use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Template;

/// What the router decided about a request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingDecision {
    /// The request matched a known template.
    Template,
    /// No template matched above the low threshold — route to the frontier
    /// tier so the output can later be distilled into a new template.
    Novel,
    /// Embeddings were unavailable and keyword search produced nothing.
    Fallback,
}

/// Banded similarity classification against the configured thresholds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityLevel {
    High,
    Medium,
    Low,
    NoMatch,
}

/// How a template match was found.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMethod {
    Embedding,
    Keyword,
}

/// Abstract model capability level. Mapped to concrete model identifiers by
/// `ModelsConfig`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelTier {
    Local,
    Mid,
    Advanced,
    Frontier,
}

impl std::fmt::Display for ModelTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelTier::Local => write!(f, "local"),
            ModelTier::Mid => write!(f, "mid"),
            ModelTier::Advanced => write!(f, "advanced"),
            ModelTier::Frontier => write!(f, "frontier"),
        }
    }
}

/// The three descending similarity thresholds. Constructed validated:
/// `1.0 >= high > medium > low > 0.0`.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct Thresholds {
    pub high: f64,
    pub medium: f64,
    pub low: f64,
}

impl Thresholds {
    pub fn new(high: f64, medium: f64, low: f64) -> Result<Self, String> {
        if !(0.0 < low && low < medium && medium < high && high <= 1.0) {
            return Err(format!(
                "thresholds must satisfy 0 < low < medium < high <= 1, got {}/{}/{}",
                high, medium, low
            ));
        }
        Ok(Self { high, medium, low })
    }

    /// Classify a similarity score. Each band is inclusive at its threshold.
    pub fn classify(&self, score: f64) -> SimilarityLevel {
        if score >= self.high {
            SimilarityLevel::High
        } else if score >= self.medium {
            SimilarityLevel::Medium
        } else if score >= self.low {
            SimilarityLevel::Low
        } else {
            SimilarityLevel::NoMatch
        }
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            high: 0.85,
            medium: 0.70,
            low: 0.50,
        }
    }
}

/// A template the router matched the input to.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RouteMatch {
    pub template: Template,
    pub similarity: f64,
    pub level: SimilarityLevel,
    pub method: MatchMethod,
}

/// The routing decision returned for every request. Degraded conditions are
/// expressed through `decision` and `embedding_failed`, never as errors.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RoutingResult {
    pub decision: RoutingDecision,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched: Option<RouteMatch>,
    pub recommended_tier: ModelTier,
    pub recommended_model: String,
    /// The input's embedding, when one was computed. Kept for downstream
    /// distillation of novel requests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_embedding: Option<Vec<f32>>,
    #[serde(default)]
    pub embedding_failed: bool,
    pub processing_ms: u64,
}

/// Point-in-time router snapshot for the stats endpoint.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RouterStats {
    pub index_size: usize,
    pub embedder_available: bool,
    pub embedding_model: String,
    pub embedding_dimensions: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_refresh: Option<DateTime<Utc>>,
    pub initialized: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thresholds_classify_inclusive() {
        let t = Thresholds::default();
        assert_eq!(t.classify(0.85), SimilarityLevel::High);
        assert_eq!(t.classify(0.8499), SimilarityLevel::Medium);
        assert_eq!(t.classify(0.70), SimilarityLevel::Medium);
        assert_eq!(t.classify(0.6999), SimilarityLevel::Low);
        assert_eq!(t.classify(0.50), SimilarityLevel::Low);
        assert_eq!(t.classify(0.4999), SimilarityLevel::NoMatch);
        assert_eq!(t.classify(1.0), SimilarityLevel::High);
        assert_eq!(t.classify(-1.0), SimilarityLevel::NoMatch);
    }

    #[test]
    fn test_thresholds_reject_bad_ordering() {
        assert!(Thresholds::new(0.7, 0.85, 0.5).is_err());
        assert!(Thresholds::new(0.85, 0.85, 0.5).is_err());
        assert!(Thresholds::new(1.1, 0.7, 0.5).is_err());
        assert!(Thresholds::new(0.85, 0.7, 0.0).is_err());
        assert!(Thresholds::new(0.85, 0.7, 0.5).is_ok());
    }
}
