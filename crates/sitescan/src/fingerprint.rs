//! Best-effort technology detection from response headers.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Detected technologies. Every label is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TechStack {
    pub server: Option<String>,
    pub framework: Option<String>,
    pub cdn: Option<String>,
    pub cms: Option<String>,
    pub languages: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Server,
    Framework,
    Cdn,
    Cms,
    Language,
}

#[derive(Debug, Clone, Copy)]
enum Rule {
    /// Header is present.
    Present(&'static str),
    /// Header value contains the needle, compared case-insensitively.
    Contains(&'static str, &'static str),
}

struct Signature {
    rule: Rule,
    slot: Slot,
    label: &'static str,
    /// Language implied by the match, if any.
    language: Option<&'static str>,
}

const fn sig(rule: Rule, slot: Slot, label: &'static str, language: Option<&'static str>) -> Signature {
    Signature { rule, slot, label, language }
}

use Rule::{Contains, Present};
use Slot::{Cdn, Cms, Framework, Language, Server};

/// Ordered signature table; the first match fills a slot.
static SIGNATURES: &[Signature] = &[
    // CDN and hosting platforms
    sig(Present("cf-ray"), Cdn, "Cloudflare", None),
    sig(Contains("server", "cloudflare"), Cdn, "Cloudflare", None),
    sig(Present("x-amz-cf-id"), Cdn, "Amazon CloudFront", None),
    sig(Contains("via", "cloudfront"), Cdn, "Amazon CloudFront", None),
    sig(Present("x-vercel-id"), Cdn, "Vercel", None),
    sig(Present("x-nf-request-id"), Cdn, "Netlify", None),
    sig(Contains("server", "netlify"), Cdn, "Netlify", None),
    sig(Present("x-fastly-request-id"), Cdn, "Fastly", None),
    sig(Contains("x-served-by", "cache-"), Cdn, "Fastly", None),
    sig(Present("x-akamai-transformed"), Cdn, "Akamai", None),
    sig(Contains("server", "akamaighost"), Cdn, "Akamai", None),
    sig(Present("x-azure-ref"), Cdn, "Azure Front Door", None),
    sig(Present("x-github-request-id"), Cdn, "GitHub Pages", None),
    sig(Present("fly-request-id"), Cdn, "Fly.io", None),
    // Web servers
    sig(Contains("server", "nginx"), Server, "Nginx", None),
    sig(Contains("server", "openresty"), Server, "OpenResty", None),
    sig(Contains("server", "apache"), Server, "Apache", None),
    sig(Contains("server", "microsoft-iis"), Server, "IIS", Some("C#")),
    sig(Contains("server", "litespeed"), Server, "LiteSpeed", None),
    sig(Contains("server", "caddy"), Server, "Caddy", None),
    sig(Contains("server", "envoy"), Server, "Envoy", None),
    sig(Contains("server", "gws"), Server, "Google Web Server", None),
    sig(Contains("server", "cloudflare"), Server, "Cloudflare", None),
    sig(Contains("server", "vercel"), Server, "Vercel", None),
    sig(Contains("server", "gunicorn"), Server, "Gunicorn", Some("Python")),
    sig(Contains("server", "uvicorn"), Server, "Uvicorn", Some("Python")),
    sig(Contains("server", "kestrel"), Server, "Kestrel", Some("C#")),
    sig(Contains("server", "jetty"), Server, "Jetty", Some("Java")),
    sig(Contains("server", "puma"), Server, "Puma", Some("Ruby")),
    // Frameworks
    sig(Contains("x-powered-by", "next.js"), Framework, "Next.js", Some("JavaScript")),
    sig(Present("x-nextjs-cache"), Framework, "Next.js", Some("JavaScript")),
    sig(Contains("x-powered-by", "nuxt"), Framework, "Nuxt", Some("JavaScript")),
    sig(Contains("x-powered-by", "express"), Framework, "Express", Some("JavaScript")),
    sig(Contains("x-powered-by", "asp.net"), Framework, "ASP.NET", Some("C#")),
    sig(Present("x-aspnet-version"), Framework, "ASP.NET", Some("C#")),
    sig(Contains("x-powered-by", "laravel"), Framework, "Laravel", Some("PHP")),
    sig(Contains("set-cookie", "laravel_session"), Framework, "Laravel", Some("PHP")),
    sig(Contains("set-cookie", "csrftoken"), Framework, "Django", Some("Python")),
    sig(Contains("x-powered-by", "phusion passenger"), Framework, "Ruby on Rails", Some("Ruby")),
    sig(Present("x-runtime"), Framework, "Ruby on Rails", Some("Ruby")),
    sig(Contains("x-powered-by", "servlet"), Framework, "Java Servlet", Some("Java")),
    // CMS
    sig(Contains("x-generator", "drupal"), Cms, "Drupal", Some("PHP")),
    sig(Present("x-drupal-cache"), Cms, "Drupal", Some("PHP")),
    sig(Contains("x-generator", "wordpress"), Cms, "WordPress", Some("PHP")),
    sig(Contains("link", "wp-json"), Cms, "WordPress", Some("PHP")),
    sig(Present("x-pingback"), Cms, "WordPress", Some("PHP")),
    sig(Contains("x-generator", "joomla"), Cms, "Joomla", Some("PHP")),
    sig(Present("x-shopify-stage"), Cms, "Shopify", None),
    sig(Present("x-wix-request-id"), Cms, "Wix", None),
    sig(Present("x-ghost-cache-status"), Cms, "Ghost", Some("JavaScript")),
    sig(Contains("server", "squarespace"), Cms, "Squarespace", None),
    // Bare language hints
    sig(Contains("x-powered-by", "php"), Language, "PHP", None),
    sig(Contains("set-cookie", "phpsessid"), Language, "PHP", None),
    sig(Contains("set-cookie", "jsessionid"), Language, "Java", None),
    sig(Contains("x-powered-by", "python"), Language, "Python", None),
];

impl Rule {
    fn matches(self, headers: &BTreeMap<String, String>) -> bool {
        match self {
            Present(name) => headers.contains_key(name),
            Contains(name, needle) => headers
                .get(name)
                .is_some_and(|value| value.to_ascii_lowercase().contains(needle)),
        }
    }
}

impl TechStack {
    /// Match a lower-cased header map against the signature table.
    pub fn detect(headers: &BTreeMap<String, String>) -> Self {
        let mut stack = TechStack::default();

        for signature in SIGNATURES.iter().filter(|s| s.rule.matches(headers)) {
            let slot = match signature.slot {
                Server => &mut stack.server,
                Framework => &mut stack.framework,
                Cdn => &mut stack.cdn,
                Cms => &mut stack.cms,
                Language => {
                    stack.add_language(signature.label);
                    continue;
                }
            };
            if slot.is_none() {
                *slot = Some(signature.label.to_string());
                if let Some(language) = signature.language {
                    stack.add_language(language);
                }
            }
        }

        // Unknown servers are still worth showing verbatim.
        if stack.server.is_none() {
            stack.server = headers.get("server").filter(|s| !s.trim().is_empty()).cloned();
        }

        stack
    }

    fn add_language(&mut self, language: &str) {
        if !self.languages.iter().any(|l| l == language) {
            self.languages.push(language.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn empty_headers_detect_nothing() {
        assert_eq!(TechStack::detect(&BTreeMap::new()), TechStack::default());
    }

    #[test]
    fn cloudflare_fronted_express_app() {
        let stack = TechStack::detect(&headers(&[
            ("server", "cloudflare"),
            ("cf-ray", "8a1b2c3d4e5f-AMS"),
            ("x-powered-by", "Express"),
        ]));

        assert_eq!(stack.cdn.as_deref(), Some("Cloudflare"));
        assert_eq!(stack.server.as_deref(), Some("Cloudflare"));
        assert_eq!(stack.framework.as_deref(), Some("Express"));
        assert_eq!(stack.languages, vec!["JavaScript".to_string()]);
    }

    #[test]
    fn wordpress_on_nginx_with_php() {
        let stack = TechStack::detect(&headers(&[
            ("server", "nginx/1.25.3"),
            ("x-powered-by", "PHP/8.2.10"),
            ("link", "<https://example.com/wp-json/>; rel=\"https://api.w.org/\""),
        ]));

        assert_eq!(stack.server.as_deref(), Some("Nginx"));
        assert_eq!(stack.cms.as_deref(), Some("WordPress"));
        assert_eq!(stack.languages, vec!["PHP".to_string()]);
    }

    #[test]
    fn unknown_server_is_kept_verbatim() {
        let stack = TechStack::detect(&headers(&[("server", "HomeGrown/0.1")]));
        assert_eq!(stack.server.as_deref(), Some("HomeGrown/0.1"));
        assert!(stack.cdn.is_none());
    }

    #[test]
    fn vercel_hosted_next_app() {
        let stack = TechStack::detect(&headers(&[
            ("server", "Vercel"),
            ("x-vercel-id", "fra1::abc"),
            ("x-nextjs-cache", "HIT"),
        ]));
        assert_eq!(stack.cdn.as_deref(), Some("Vercel"));
        assert_eq!(stack.framework.as_deref(), Some("Next.js"));
    }
}
