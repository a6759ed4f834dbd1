use tierroute_common::config::ModelsConfig;
use tierroute_common::types::{ModelTier, Thresholds};

/// Pick the cheapest tier consistent with how well the request matched and
/// how much the template has earned trust.
///
/// Pure function: high-similarity matches against high-confidence templates
/// go local; anything that at least cleared the low bar gets the advanced
/// tier; no match at all is the caller's frontier case.
pub fn select_tier(similarity: f64, confidence: f64, thresholds: &Thresholds) -> ModelTier {
    if similarity >= thresholds.high && confidence >= 0.8 {
        ModelTier::Local
    } else if similarity >= thresholds.high && confidence >= 0.6 {
        ModelTier::Mid
    } else if similarity >= thresholds.medium {
        ModelTier::Mid
    } else if similarity >= thresholds.low {
        ModelTier::Advanced
    } else {
        ModelTier::Frontier
    }
}

/// Tier → concrete model identifier mapping, fixed at construction.
/// Identifiers are opaque to the router.
#[derive(Clone, Debug)]
pub struct ModelCatalog {
    local: String,
    mid: String,
    advanced: String,
    frontier: String,
}

impl ModelCatalog {
    pub fn from_config(models: &ModelsConfig) -> Self {
        Self {
            local: models.local.clone(),
            mid: models.mid.clone(),
            advanced: models.advanced.clone(),
            frontier: models.frontier.clone(),
        }
    }

    pub fn model_for(&self, tier: ModelTier) -> &str {
        match tier {
            ModelTier::Local => &self.local,
            ModelTier::Mid => &self.mid,
            ModelTier::Advanced => &self.advanced,
            ModelTier::Frontier => &self.frontier,
        }
    }
}

impl Default for ModelCatalog {
    fn default() -> Self {
        Self::from_config(&ModelsConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_selection() {
        let t = Thresholds::default();

        assert_eq!(select_tier(0.95, 0.9, &t), ModelTier::Local);
        assert_eq!(select_tier(0.95, 0.7, &t), ModelTier::Mid);
        // High similarity, untrusted template: still mid, via the medium rule.
        assert_eq!(select_tier(0.95, 0.3, &t), ModelTier::Mid);
        assert_eq!(select_tier(0.75, 0.9, &t), ModelTier::Mid);
        assert_eq!(select_tier(0.55, 0.9, &t), ModelTier::Advanced);
        assert_eq!(select_tier(0.30, 0.9, &t), ModelTier::Frontier);
    }

    #[test]
    fn test_tier_boundaries_inclusive() {
        let t = Thresholds::default();

        assert_eq!(select_tier(0.85, 0.8, &t), ModelTier::Local);
        assert_eq!(select_tier(0.85, 0.6, &t), ModelTier::Mid);
        assert_eq!(select_tier(0.70, 1.0, &t), ModelTier::Mid);
        assert_eq!(select_tier(0.50, 1.0, &t), ModelTier::Advanced);
        assert_eq!(select_tier(0.4999, 1.0, &t), ModelTier::Frontier);
    }

    #[test]
    fn test_catalog_mapping() {
        let catalog = ModelCatalog::default();
        assert!(!catalog.model_for(ModelTier::Local).is_empty());
        assert!(!catalog.model_for(ModelTier::Frontier).is_empty());

        let models = ModelsConfig {
            local: "tiny".into(),
            mid: "mid".into(),
            advanced: "adv".into(),
            frontier: "big".into(),
        };
        let catalog = ModelCatalog::from_config(&models);
        assert_eq!(catalog.model_for(ModelTier::Mid), "mid");
        assert_eq!(catalog.model_for(ModelTier::Frontier), "big");
    }
}
