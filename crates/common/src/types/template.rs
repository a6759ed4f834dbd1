use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::TemplateId;

/// Lifecycle status of a template in the registry.
///
/// Only `Validated` and `Promoted` templates are indexable — drafts have not
/// passed grading, deprecated templates are retired.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateStatus {
    Draft,
    Validated,
    Promoted,
    Deprecated,
}

/// A canonical, reusable intent record maintained by the template registry.
///
/// The router consumes these read-only: authoring, promotion, and
/// distillation live in the registry's own pipelines.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Template {
    pub id: TemplateId,
    /// Human-readable canonical intent ("fix authentication bug").
    pub intent: String,
    /// Pre-computed embedding of the intent. None until the authoring
    /// pipeline has embedded it; such templates cannot be routed to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent_embedding: Option<Vec<f32>>,
    /// How reliably this template has served past requests (0.0–1.0).
    pub confidence: f64,
    pub status: TemplateStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Freeform key-value metadata the registry attaches. Opaque here.
    #[serde(default)]
    pub properties: HashMap<String, Value>,
}

impl Template {
    pub fn new(intent: String, confidence: f64) -> Self {
        let now = Utc::now();
        Self {
            id: TemplateId::new(),
            intent,
            intent_embedding: None,
            confidence,
            status: TemplateStatus::Draft,
            created_at: now,
            updated_at: now,
            properties: HashMap::new(),
        }
    }

    /// Whether this template may appear in the routing index.
    pub fn is_active(&self) -> bool {
        matches!(
            self.status,
            TemplateStatus::Validated | TemplateStatus::Promoted
        )
    }
}
