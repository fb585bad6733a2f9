//! Performance / SEO scoring pass, independent of the accessibility engine.

use serde::{Deserialize, Serialize};

/// Scoring categories requested from the secondary engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AuditCategory {
    Performance,
    Accessibility,
    BestPractices,
    Seo,
}

impl AuditCategory {
    pub const ALL: [AuditCategory; 4] = [
        AuditCategory::Performance,
        AuditCategory::Accessibility,
        AuditCategory::BestPractices,
        AuditCategory::Seo,
    ];

    /// Category id in the engine's report.
    pub fn engine_id(&self) -> &'static str {
        match self {
            AuditCategory::Performance => "performance",
            AuditCategory::Accessibility => "accessibility",
            AuditCategory::BestPractices => "best-practices",
            AuditCategory::Seo => "seo",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AuditCategory::Performance => "Performance",
            AuditCategory::Accessibility => "Accessibility",
            AuditCategory::BestPractices => "Best Practices",
            AuditCategory::Seo => "SEO",
        }
    }
}

/// 0–100 integer score per category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryScores {
    pub performance: u8,
    pub accessibility: u8,
    pub best_practices: u8,
    pub seo: u8,
}

impl CategoryScores {
    pub fn get(&self, category: AuditCategory) -> u8 {
        match category {
            AuditCategory::Performance => self.performance,
            AuditCategory::Accessibility => self.accessibility,
            AuditCategory::BestPractices => self.best_practices,
            AuditCategory::Seo => self.seo,
        }
    }
}

/// Outcome of the secondary audit stage.
///
/// `error` present means the stage degraded; `scores` is then absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecondaryAuditResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scores: Option<CategoryScores>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

/// Message stored in `error` whenever the stage degrades.
pub const SECONDARY_FAILURE_MESSAGE: &str = "secondary audit failed";

/// Stored in `hint`; the usual cause under headless automation.
pub const SECONDARY_FAILURE_HINT: &str = "first paint may not be detectable in headless mode";

impl SecondaryAuditResult {
    pub fn completed(scores: CategoryScores, raw: serde_json::Value) -> Self {
        Self {
            scores: Some(scores),
            raw: Some(raw),
            ..Self::default()
        }
    }

    /// Degraded result carrying the engine's own message as `details`.
    pub fn degraded(details: impl Into<String>) -> Self {
        Self {
            error: Some(SECONDARY_FAILURE_MESSAGE.to_string()),
            details: Some(details.into()),
            hint: Some(SECONDARY_FAILURE_HINT.to_string()),
            ..Self::default()
        }
    }

    /// Stage switched off by configuration.
    pub fn skipped() -> Self {
        Self {
            error: Some("secondary audit disabled".to_string()),
            ..Self::default()
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.error.is_some()
    }

    pub fn score(&self, category: AuditCategory) -> Option<u8> {
        if self.is_degraded() {
            return None;
        }
        self.scores.map(|s| s.get(category))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_degraded_has_no_scores() {
        let r = SecondaryAuditResult::degraded("NO_FCP");
        assert!(r.is_degraded());
        assert_eq!(r.error.as_deref(), Some(SECONDARY_FAILURE_MESSAGE));
        assert_eq!(r.details.as_deref(), Some("NO_FCP"));
        assert!(r.score(AuditCategory::Seo).is_none());
    }

    #[test]
    fn test_completed_scores_lookup() {
        let r = SecondaryAuditResult::completed(
            CategoryScores {
                performance: 91,
                accessibility: 88,
                best_practices: 100,
                seo: 75,
            },
            serde_json::json!({}),
        );
        assert!(!r.is_degraded());
        assert_eq!(r.score(AuditCategory::BestPractices), Some(100));
        assert_eq!(r.score(AuditCategory::Seo), Some(75));
    }

    #[test]
    fn test_degraded_serializes_without_scores() {
        let v = serde_json::to_value(SecondaryAuditResult::degraded("timeout")).unwrap();
        let obj = v.as_object().unwrap();
        assert!(obj.contains_key("error"));
        assert!(!obj.contains_key("scores"));
        assert!(!obj.contains_key("raw"));
    }

    #[test]
    fn test_category_ids() {
        let ids: Vec<_> = AuditCategory::ALL.iter().map(|c| c.engine_id()).collect();
        assert_eq!(ids, vec!["performance", "accessibility", "best-practices", "seo"]);
    }
}
