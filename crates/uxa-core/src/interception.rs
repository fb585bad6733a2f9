//! Request interception policy applied during page load.
//!
//! Ordered rules, first match wins, default *continue*. Blocking is limited to
//! media and a small denylist of tracking/analytics hosts so that layout-relevant
//! resources (stylesheets, scripts, fonts, images, XHR/fetch) from the page's
//! own hosts are never touched. The main document is never aborted.

use serde::{Deserialize, Serialize};
use url::Url;

/// Resource category of an outgoing request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Document,
    Stylesheet,
    Image,
    Media,
    Font,
    Script,
    Xhr,
    Fetch,
    WebSocket,
    Ping,
    Other(String),
}

impl ResourceType {
    /// Map a browser-reported type name (`"Stylesheet"`, `"media"`, …).
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "document" => ResourceType::Document,
            "stylesheet" => ResourceType::Stylesheet,
            "image" => ResourceType::Image,
            "media" => ResourceType::Media,
            "font" => ResourceType::Font,
            "script" => ResourceType::Script,
            "xhr" => ResourceType::Xhr,
            "fetch" => ResourceType::Fetch,
            "websocket" => ResourceType::WebSocket,
            "ping" => ResourceType::Ping,
            other => ResourceType::Other(other.to_string()),
        }
    }
}

/// A request as seen by the filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterceptedRequest {
    pub resource_type: ResourceType,
    pub url: String,
}

impl InterceptedRequest {
    pub fn new(resource_type: ResourceType, url: impl Into<String>) -> Self {
        Self {
            resource_type,
            url: url.into(),
        }
    }
}

/// Allow/deny verdict for one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum InterceptDecision {
    Continue,
    Abort { reason: String },
}

impl InterceptDecision {
    pub fn is_abort(&self) -> bool {
        matches!(self, InterceptDecision::Abort { .. })
    }
}

/// Stateless predicate evaluated for every outgoing request.
pub trait RequestFilter: Send + Sync {
    fn decide(&self, request: &InterceptedRequest) -> InterceptDecision;
}

/// One blocking rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InterceptRule {
    BlockResourceType { resource_type: ResourceType },
    /// Host equals `suffix` or ends with `.suffix`.
    BlockHostSuffix { suffix: String },
    /// Host contains `needle` anywhere.
    BlockHostContains { needle: String },
}

impl InterceptRule {
    fn matches(&self, request: &InterceptedRequest, host: Option<&str>) -> bool {
        match self {
            InterceptRule::BlockResourceType { resource_type } => &request.resource_type == resource_type,
            InterceptRule::BlockHostSuffix { suffix } => host.is_some_and(|h| {
                let suffix = suffix.to_ascii_lowercase();
                h == suffix || h.ends_with(&format!(".{suffix}"))
            }),
            InterceptRule::BlockHostContains { needle } => {
                host.is_some_and(|h| h.contains(&needle.to_ascii_lowercase()))
            }
        }
    }

    fn reason(&self) -> String {
        match self {
            InterceptRule::BlockResourceType { resource_type } => {
                format!("resource type {:?} blocked", resource_type)
            }
            InterceptRule::BlockHostSuffix { suffix } => format!("host matches denylisted domain {suffix}"),
            InterceptRule::BlockHostContains { needle } => format!("host contains denylisted term '{needle}'"),
        }
    }
}

/// Ordered rule set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterceptPolicy {
    pub rules: Vec<InterceptRule>,
}

impl InterceptPolicy {
    /// Let everything through.
    pub fn allow_all() -> Self {
        Self { rules: Vec::new() }
    }

    pub fn with_rule(mut self, rule: InterceptRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Media plus common tracking/analytics hosts.
    pub fn standard() -> Self {
        Self::allow_all()
            .with_rule(InterceptRule::BlockResourceType {
                resource_type: ResourceType::Media,
            })
            .with_rule(InterceptRule::BlockHostSuffix {
                suffix: "googletagmanager.com".into(),
            })
            .with_rule(InterceptRule::BlockHostSuffix {
                suffix: "doubleclick.net".into(),
            })
            .with_rule(InterceptRule::BlockHostSuffix {
                suffix: "google-analytics.com".into(),
            })
            .with_rule(InterceptRule::BlockHostContains {
                needle: "tracking".into(),
            })
    }
}

impl Default for InterceptPolicy {
    fn default() -> Self {
        Self::standard()
    }
}

/// Evaluate a request against a policy.
pub fn evaluate_request(policy: &InterceptPolicy, request: &InterceptedRequest) -> InterceptDecision {
    if request.resource_type == ResourceType::Document {
        return InterceptDecision::Continue;
    }

    let host = Url::parse(&request.url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_ascii_lowercase));

    for rule in &policy.rules {
        if rule.matches(request, host.as_deref()) {
            return InterceptDecision::Abort { reason: rule.reason() };
        }
    }

    InterceptDecision::Continue
}

impl RequestFilter for InterceptPolicy {
    fn decide(&self, request: &InterceptedRequest) -> InterceptDecision {
        evaluate_request(self, request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(kind: ResourceType, url: &str) -> InterceptedRequest {
        InterceptedRequest::new(kind, url)
    }

    #[test]
    fn test_media_is_blocked() {
        let policy = InterceptPolicy::standard();
        let d = evaluate_request(&policy, &req(ResourceType::Media, "https://example.com/intro.mp4"));
        assert!(d.is_abort());
    }

    #[test]
    fn test_layout_resources_continue() {
        let policy = InterceptPolicy::standard();
        for kind in [
            ResourceType::Stylesheet,
            ResourceType::Script,
            ResourceType::Font,
            ResourceType::Image,
            ResourceType::Xhr,
            ResourceType::Fetch,
        ] {
            let d = evaluate_request(&policy, &req(kind.clone(), "https://example.com/asset"));
            assert_eq!(d, InterceptDecision::Continue, "{kind:?} must not be blocked");
        }
    }

    #[test]
    fn test_denylisted_hosts_blocked() {
        let policy = InterceptPolicy::standard();
        let gtm = req(ResourceType::Script, "https://www.googletagmanager.com/gtm.js?id=GTM-1");
        assert!(evaluate_request(&policy, &gtm).is_abort());

        let dc = req(ResourceType::Image, "https://ad.doubleclick.net/pixel");
        assert!(evaluate_request(&policy, &dc).is_abort());

        let tracker = req(ResourceType::Ping, "https://tracking.vendor.io/collect");
        assert!(evaluate_request(&policy, &tracker).is_abort());
    }

    #[test]
    fn test_denylist_matches_host_not_path() {
        let policy = InterceptPolicy::standard();
        let first_party = req(ResourceType::Stylesheet, "https://example.com/css/tracking-table.css");
        assert_eq!(evaluate_request(&policy, &first_party), InterceptDecision::Continue);

        let lookalike = req(ResourceType::Script, "https://notdoubleclick.net/app.js");
        assert_eq!(evaluate_request(&policy, &lookalike), InterceptDecision::Continue);
    }

    #[test]
    fn test_document_never_aborted() {
        let policy = InterceptPolicy::standard();
        let d = evaluate_request(&policy, &req(ResourceType::Document, "https://tracking.example.com/"));
        assert_eq!(d, InterceptDecision::Continue);
    }

    #[test]
    fn test_first_match_reason() {
        let policy = InterceptPolicy::allow_all()
            .with_rule(InterceptRule::BlockHostContains { needle: "cdn".into() })
            .with_rule(InterceptRule::BlockResourceType {
                resource_type: ResourceType::Font,
            });
        match evaluate_request(&policy, &req(ResourceType::Font, "https://cdn.example.com/a.woff2")) {
            InterceptDecision::Abort { reason } => assert!(reason.contains("cdn")),
            other => panic!("expected Abort, got {:?}", other),
        }
    }

    #[test]
    fn test_resource_type_from_name() {
        assert_eq!(ResourceType::from_name("Stylesheet"), ResourceType::Stylesheet);
        assert_eq!(ResourceType::from_name("XHR"), ResourceType::Xhr);
        assert_eq!(ResourceType::from_name("Manifest"), ResourceType::Other("manifest".into()));
    }

    #[test]
    fn test_unparseable_url_continues() {
        let policy = InterceptPolicy::standard();
        let d = evaluate_request(&policy, &req(ResourceType::Script, "data:text/javascript,1"));
        assert_eq!(d, InterceptDecision::Continue);
    }
}
