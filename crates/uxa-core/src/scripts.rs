//! In-page scripts evaluated through [`RenderablePage::evaluate`](crate::page::RenderablePage::evaluate).
//!
//! Every script starts with a `/*uxa:<name>*/` tag so bindings and fakes can
//! tell them apart without parsing JavaScript.

/// Resolves once the page's font-loading signal fires.
pub const FONTS_READY: &str =
    "/*uxa:fonts-ready*/ (document.fonts ? document.fonts.ready.then(() => true) : Promise.resolve(true))";

/// Current scrollable document size, `{ width, height }`.
pub const DOCUMENT_SIZE: &str = "/*uxa:document-size*/ ({ \
width: document.documentElement.scrollWidth, \
height: document.documentElement.scrollHeight })";

/// Scroll back to the origin.
pub const SCROLL_TO_TOP: &str = "/*uxa:scroll-top*/ (window.scrollTo(0, 0), true)";

/// `true` when the rule engine's global is present.
pub const AUDIT_ENGINE_PROBE: &str = "/*uxa:audit-probe*/ (typeof window.axe !== 'undefined')";

/// Runs the full default ruleset against the document.
pub const AUDIT_RUN: &str = "/*uxa:audit-run*/ window.axe.run(document).then(r => ({ \
violations: r.violations, passes: r.passes, incomplete: r.incomplete }))";

/// Scroll by `step` pixels and report the (possibly grown) scrollable height.
pub fn scroll_by(step: u32) -> String {
    format!(
        "/*uxa:scroll-by*/ (() => {{ const step = {step}; window.scrollBy(0, step); \
return document.body ? document.body.scrollHeight : document.documentElement.scrollHeight; }})()"
    )
}

/// Page-absolute bounding box of the first element matching `selector`, or
/// `null` when nothing matches or the selector is invalid.
pub fn resolve_geometry(selector: &str) -> String {
    let literal = serde_json::to_string(selector).unwrap_or_else(|_| "\"\"".to_string());
    format!(
        "/*uxa:resolve*/ (() => {{ const selector = {literal}; let el = null; \
try {{ el = document.querySelector(selector); }} catch (e) {{ return null; }} \
if (!el) return null; const r = el.getBoundingClientRect(); \
return {{ left: r.left + window.scrollX, top: r.top + window.scrollY, width: r.width, height: r.height }}; }})()"
    )
}

/// Tag name of a script produced by this module.
pub fn tag_of(script: &str) -> Option<&str> {
    let rest = script.trim_start().strip_prefix("/*uxa:")?;
    let end = rest.find("*/")?;
    Some(&rest[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags() {
        assert_eq!(tag_of(FONTS_READY), Some("fonts-ready"));
        assert_eq!(tag_of(AUDIT_RUN), Some("audit-run"));
        assert_eq!(tag_of(&scroll_by(300)), Some("scroll-by"));
        assert_eq!(tag_of(&resolve_geometry("#main")), Some("resolve"));
        assert_eq!(tag_of("1 + 1"), None);
    }

    #[test]
    fn test_resolve_escapes_selector() {
        let script = resolve_geometry(r#"a[href="x"]"#);
        assert!(script.contains(r#"const selector = "a[href=\"x\"]";"#));
    }

    #[test]
    fn test_scroll_step_embedded() {
        assert!(scroll_by(300).contains("const step = 300;"));
    }
}
