//! Accessibility audit results as returned by the in-page rule engine.

use serde::{Deserialize, Deserializer, Serialize};

/// Severity tier of a violation, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Impact {
    Minor,
    Moderate,
    Serious,
    Critical,
}

impl Impact {
    /// All tiers, most severe first.
    pub const DESCENDING: [Impact; 4] = [
        Impact::Critical,
        Impact::Serious,
        Impact::Moderate,
        Impact::Minor,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Impact::Critical => "critical",
            Impact::Serious => "serious",
            Impact::Moderate => "moderate",
            Impact::Minor => "minor",
        }
    }

    /// Sort weight: critical = 4 … minor = 1.
    pub fn weight(&self) -> u8 {
        match self {
            Impact::Critical => 4,
            Impact::Serious => 3,
            Impact::Moderate => 2,
            Impact::Minor => 1,
        }
    }
}

impl std::fmt::Display for Impact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One concrete DOM location failing a rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViolationNode {
    /// CSS-like selectors identifying the element; the first one is primary.
    #[serde(deserialize_with = "deserialize_targets")]
    pub target: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
}

impl ViolationNode {
    pub fn new(selector: impl Into<String>) -> Self {
        Self {
            target: vec![selector.into()],
            failure_summary: None,
            html: None,
        }
    }

    pub fn with_failure_summary(mut self, summary: impl Into<String>) -> Self {
        self.failure_summary = Some(summary.into());
        self
    }

    pub fn primary_selector(&self) -> Option<&str> {
        self.target.first().map(String::as_str).filter(|s| !s.is_empty())
    }
}

/// Targets inside shadow roots or frames arrive as nested selector lists;
/// they are joined with `" >>> "` so they stay readable but never resolve
/// through a plain `querySelector`.
fn deserialize_targets<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Target {
        Single(String),
        Nested(Vec<String>),
    }

    let raw: Vec<Target> = Vec::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .map(|t| match t {
            Target::Single(s) => s,
            Target::Nested(parts) => parts.join(" >>> "),
        })
        .collect())
}

/// A single rule failure, possibly affecting several nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Violation {
    pub id: String,
    pub impact: Impact,
    pub description: String,
    pub help: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub help_url: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    pub nodes: Vec<ViolationNode>,
}

impl Violation {
    /// Short help text when present, otherwise the long description.
    pub fn headline(&self) -> &str {
        if self.help.trim().is_empty() {
            &self.description
        } else {
            &self.help
        }
    }
}

/// A rule that passed or could not be decided.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleCheck {
    pub id: String,
    #[serde(default)]
    pub impact: Option<Impact>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub help: String,
    #[serde(default)]
    pub nodes: Vec<ViolationNode>,
}

/// Per-impact violation counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImpactCounts {
    pub critical: usize,
    pub serious: usize,
    pub moderate: usize,
    pub minor: usize,
}

impl ImpactCounts {
    pub fn get(&self, impact: Impact) -> usize {
        match impact {
            Impact::Critical => self.critical,
            Impact::Serious => self.serious,
            Impact::Moderate => self.moderate,
            Impact::Minor => self.minor,
        }
    }

    pub fn total(&self) -> usize {
        self.critical + self.serious + self.moderate + self.minor
    }
}

/// Violations sharing one impact tier.
#[derive(Debug, Clone, PartialEq)]
pub struct ImpactGroup<'a> {
    pub impact: Impact,
    pub violations: Vec<&'a Violation>,
}

/// Output of the accessibility audit stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditResult {
    pub violations: Vec<Violation>,
    #[serde(default)]
    pub passes: Vec<RuleCheck>,
    #[serde(default)]
    pub incomplete: Vec<RuleCheck>,
}

impl AuditResult {
    /// Σ nodes across all violations; the number of correlator steps.
    pub fn node_count(&self) -> usize {
        self.violations.iter().map(|v| v.nodes.len()).sum()
    }

    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn impact_counts(&self) -> ImpactCounts {
        let mut counts = ImpactCounts::default();
        for v in &self.violations {
            match v.impact {
                Impact::Critical => counts.critical += 1,
                Impact::Serious => counts.serious += 1,
                Impact::Moderate => counts.moderate += 1,
                Impact::Minor => counts.minor += 1,
            }
        }
        counts
    }

    /// Groups in descending severity; empty tiers are omitted and audit order
    /// is preserved inside each group.
    pub fn group_by_impact(&self) -> Vec<ImpactGroup<'_>> {
        Impact::DESCENDING
            .iter()
            .map(|impact| ImpactGroup {
                impact: *impact,
                violations: self.violations.iter().filter(|v| v.impact == *impact).collect(),
            })
            .filter(|g| !g.violations.is_empty())
            .collect()
    }
}
