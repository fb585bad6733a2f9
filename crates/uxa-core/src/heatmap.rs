//! Heatmap correlator: maps violation nodes to page-absolute rectangles.
//!
//! Nodes are visited in audit order, `violations[].nodes[]`. Each node
//! advances the index whether or not its selector resolves, so point indices
//! always line up with the flat node ordering.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::config::CorrelationConfig;
use crate::domain::{AuditResult, HeatmapPoint};
use crate::page::RenderablePage;
use crate::scripts;

/// Page-absolute element geometry in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ElementGeometry {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

/// Looks up a selector in the live DOM. No match is a normal `None`.
#[async_trait]
pub trait GeometryResolver: Send + Sync {
    async fn resolve(&self, selector: &str) -> Option<ElementGeometry>;
}

/// Resolves selectors by evaluating a query script in the audited page.
///
/// Each lookup is bounded, and once the stage deadline passes every further
/// lookup reports no match without touching the page.
pub struct PageGeometry<'a> {
    page: &'a dyn RenderablePage,
    lookup_timeout: Duration,
    deadline: Instant,
}

impl<'a> PageGeometry<'a> {
    pub fn new(page: &'a dyn RenderablePage, config: &CorrelationConfig) -> Self {
        Self {
            page,
            lookup_timeout: Duration::from_millis(config.lookup_timeout_ms),
            deadline: Instant::now() + Duration::from_millis(config.stage_ceiling_ms),
        }
    }
}

#[async_trait]
impl GeometryResolver for PageGeometry<'_> {
    async fn resolve(&self, selector: &str) -> Option<ElementGeometry> {
        let remaining = self.deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            tracing::debug!(selector = %selector, "correlation ceiling reached, skipping lookup");
            return None;
        }
        let limit = self.lookup_timeout.min(remaining);
        let script = scripts::resolve_geometry(selector);
        match tokio::time::timeout(limit, self.page.evaluate(&script)).await {
            Ok(Ok(serde_json::Value::Null)) => None,
            Ok(Ok(value)) => serde_json::from_value(value).ok(),
            Ok(Err(e)) => {
                tracing::debug!(selector = %selector, error = %e, "selector resolution errored");
                None
            }
            Err(_) => {
                tracing::warn!(
                    selector = %selector,
                    limit_ms = limit.as_millis() as u64,
                    "selector resolution timed out"
                );
                None
            }
        }
    }
}

/// Correlator output.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Correlation {
    pub points: Vec<HeatmapPoint>,
    /// Nodes visited; always `audit.node_count()`.
    pub nodes_visited: usize,
}

impl Correlation {
    pub fn dropped(&self) -> usize {
        self.nodes_visited - self.points.len()
    }
}

pub async fn correlate(audit: &AuditResult, resolver: &dyn GeometryResolver) -> Correlation {
    let mut index = 0;
    let mut points = Vec::new();

    for violation in &audit.violations {
        for node in &violation.nodes {
            let geometry = match node.primary_selector() {
                Some(selector) => {
                    let found = resolver.resolve(selector).await;
                    if found.is_none() {
                        tracing::debug!(
                            index,
                            rule = %violation.id,
                            selector = %selector,
                            "selector no longer resolves, dropping heatmap point"
                        );
                    }
                    found
                }
                None => {
                    tracing::debug!(index, rule = %violation.id, "node has no selector, dropping heatmap point");
                    None
                }
            };

            if let Some(g) = geometry {
                points.push(HeatmapPoint {
                    index,
                    left: g.left,
                    top: g.top,
                    width: g.width,
                    height: g.height,
                    impact: violation.impact,
                    description: violation.headline().to_string(),
                });
            }
            index += 1;
        }
    }

    Correlation {
        points,
        nodes_visited: index,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Impact, Violation, ViolationNode};
    use crate::fakes::{ScriptedPage, StaticGeometry};

    fn violation(id: &str, impact: Impact, selectors: &[&str]) -> Violation {
        Violation {
            id: id.to_string(),
            impact,
            description: format!("{id} long description"),
            help: format!("{id} help"),
            help_url: None,
            tags: vec![],
            nodes: selectors.iter().map(|s| ViolationNode::new(*s)).collect(),
        }
    }

    fn rect(left: f64, top: f64) -> ElementGeometry {
        ElementGeometry {
            left,
            top,
            width: 100.0,
            height: 20.0,
        }
    }

    #[tokio::test]
    async fn test_indices_skip_dropped_nodes() {
        let audit = AuditResult {
            violations: vec![
                violation("color-contrast", Impact::Serious, &["#a", "#gone", "#b"]),
                violation("label", Impact::Critical, &["#c"]),
            ],
            ..AuditResult::default()
        };
        let resolver = StaticGeometry::new()
            .with("#a", rect(0.0, 0.0))
            .with("#b", rect(10.0, 10.0))
            .with("#c", rect(20.0, 20.0));

        let out = correlate(&audit, &resolver).await;
        let indices: Vec<_> = out.points.iter().map(|p| p.index).collect();
        assert_eq!(indices, vec![0, 2, 3]);
        assert_eq!(out.nodes_visited, 4);
        assert_eq!(out.dropped(), 1);
        assert_eq!(resolver.calls(), 4);
        assert_eq!(out.points[2].impact, Impact::Critical);
    }

    #[tokio::test]
    async fn test_description_prefers_help() {
        let mut v = violation("region", Impact::Moderate, &["main"]);
        v.help.clear();
        let audit = AuditResult {
            violations: vec![v],
            ..AuditResult::default()
        };
        let resolver = StaticGeometry::new().with("main", rect(0.0, 0.0));
        let out = correlate(&audit, &resolver).await;
        assert_eq!(out.points[0].description, "region long description");
    }

    #[tokio::test]
    async fn test_empty_selector_counts_but_drops() {
        let audit = AuditResult {
            violations: vec![violation("x", Impact::Minor, &["", "#y"])],
            ..AuditResult::default()
        };
        let resolver = StaticGeometry::new().with("#y", rect(1.0, 2.0));
        let out = correlate(&audit, &resolver).await;
        assert_eq!(out.points.len(), 1);
        assert_eq!(out.points[0].index, 1);
        assert_eq!(resolver.calls(), 1);
    }

    #[tokio::test]
    async fn test_page_geometry_adds_scroll_offset() {
        let page = ScriptedPage::builder()
            .element("#hero img", 40.0, 100.0, 320.0, 180.0)
            .scroll_offset(0.0, 250.0)
            .build();
        let resolver = PageGeometry::new(&page, &CorrelationConfig::default());

        let g = resolver.resolve("#hero img").await.unwrap();
        assert_eq!(g, ElementGeometry { left: 40.0, top: 350.0, width: 320.0, height: 180.0 });
        assert!(resolver.resolve("#missing").await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_lookups_are_bounded() {
        let page = ScriptedPage::builder()
            .element("#a", 0.0, 0.0, 10.0, 10.0)
            .resolve_hangs()
            .build();
        let config = CorrelationConfig {
            lookup_timeout_ms: 1_000,
            stage_ceiling_ms: 2_500,
        };
        let audit = AuditResult {
            violations: vec![violation("label", Impact::Serious, &["#a", "#a", "#a", "#a", "#a"])],
            ..AuditResult::default()
        };

        let started = Instant::now();
        let out = correlate(&audit, &PageGeometry::new(&page, &config)).await;

        assert!(out.points.is_empty());
        assert_eq!(out.nodes_visited, 5);
        // 1s + 1s + 0.5s, then the ceiling short-circuits the rest
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(2_500) && elapsed < Duration::from_millis(2_600));
        assert_eq!(page.resolve_calls(), 3);
    }
}
