use serde::{Deserialize, Serialize};

use crate::types::Template;

/// GET /templates/active response.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ListActiveResponse {
    pub templates: Vec<Template>,
}

/// GET /templates/search?q=&limit= response.
///
/// Ordering is the registry's responsibility; the router trusts the first
/// result to be the best keyword match.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KeywordSearchResponse {
    pub templates: Vec<Template>,
    #[serde(default)]
    pub total: Option<usize>,
}
