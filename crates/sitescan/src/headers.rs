//! Security header audit.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub const HSTS: &str = "strict-transport-security";
pub const CSP: &str = "content-security-policy";
pub const X_FRAME_OPTIONS: &str = "x-frame-options";
pub const X_CONTENT_TYPE_OPTIONS: &str = "x-content-type-options";
pub const X_XSS_PROTECTION: &str = "x-xss-protection";
pub const REFERRER_POLICY: &str = "referrer-policy";
pub const PERMISSIONS_POLICY: &str = "permissions-policy";
pub const CORS_ALLOW_ORIGIN: &str = "access-control-allow-origin";

/// Headers counted towards the score. CORS is reported but not scored.
pub const SCORED_HEADERS: [&str; 7] = [
    HSTS,
    CSP,
    X_FRAME_OPTIONS,
    X_CONTENT_TYPE_OPTIONS,
    X_XSS_PROTECTION,
    REFERRER_POLICY,
    PERMISSIONS_POLICY,
];

/// Which hardening headers a response carried.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityHeaders {
    #[serde(rename = "hasHSTS")]
    pub has_hsts: bool,
    #[serde(rename = "hasCSP")]
    pub has_csp: bool,
    pub has_x_frame_options: bool,
    pub has_x_content_type_options: bool,
    #[serde(rename = "hasXXSSProtection")]
    pub has_x_xss_protection: bool,
    pub has_referrer_policy: bool,
    pub has_permissions_policy: bool,
    #[serde(rename = "hasCORS")]
    pub has_cors: bool,
    /// `round(100 * present / 7)` over [`SCORED_HEADERS`].
    pub score: u8,
}

impl SecurityHeaders {
    /// Audit a lower-cased header map.
    pub fn audit(headers: &BTreeMap<String, String>) -> Self {
        let has = |name: &str| headers.contains_key(name);

        let present = SCORED_HEADERS.iter().filter(|name| has(**name)).count();
        let score = (100.0 * present as f64 / SCORED_HEADERS.len() as f64).round() as u8;

        Self {
            has_hsts: has(HSTS),
            has_csp: has(CSP),
            has_x_frame_options: has(X_FRAME_OPTIONS),
            has_x_content_type_options: has(X_CONTENT_TYPE_OPTIONS),
            has_x_xss_protection: has(X_XSS_PROTECTION),
            has_referrer_policy: has(REFERRER_POLICY),
            has_permissions_policy: has(PERMISSIONS_POLICY),
            has_cors: has(CORS_ALLOW_ORIGIN),
            score,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(names: &[&str]) -> BTreeMap<String, String> {
        names.iter().map(|n| (n.to_string(), "1".to_string())).collect()
    }

    #[test]
    fn no_security_headers_scores_zero() {
        let audit = SecurityHeaders::audit(&headers(&["content-type", "server"]));
        assert_eq!(audit.score, 0);
        assert!(!audit.has_hsts);
    }

    #[test]
    fn all_scored_headers_score_full_marks() {
        let audit = SecurityHeaders::audit(&headers(&SCORED_HEADERS));
        assert_eq!(audit.score, 100);
        assert!(!audit.has_cors);
    }

    #[test]
    fn cors_does_not_move_the_score() {
        let audit = SecurityHeaders::audit(&headers(&[HSTS, CORS_ALLOW_ORIGIN]));
        assert!(audit.has_cors);
        // 1 of 7
        assert_eq!(audit.score, 14);
    }

    #[test]
    fn partial_coverage_rounds() {
        let audit = SecurityHeaders::audit(&headers(&[HSTS, CSP, X_FRAME_OPTIONS, REFERRER_POLICY]));
        // 4 / 7 = 57.14
        assert_eq!(audit.score, 57);
    }
}
