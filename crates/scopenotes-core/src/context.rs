//! URL → [`UrlContext`] resolution.
//!
//! The registrable domain is approximated by the last two hostname
//! labels. There is no public-suffix awareness: `foo.co.uk` resolves to
//! domain `co.uk`.

use url::Url;

use crate::models::UrlContext;

/// Resolve a raw URL into its context, or `None` if it is not an
/// absolute URL with a host.
///
/// # Example
///
/// ```rust
/// use scopenotes_core::context::parse_url_context;
///
/// let ctx = parse_url_context("https://app.example.com/dashboard?id=123").unwrap();
/// assert_eq!(ctx.domain, "example.com");
/// assert_eq!(ctx.subdomain, "app.example.com");
/// assert_eq!(ctx.path, "/dashboard");
/// assert_eq!(ctx.full_path, "/dashboard?id=123");
/// ```
pub fn parse_url_context(raw: &str) -> Option<UrlContext> {
    let parsed = Url::parse(raw.trim()).ok()?;
    let host = parsed.host_str()?.trim_end_matches('.');
    if host.is_empty() {
        return None;
    }

    let path = parsed.path().to_string();
    let mut full_path = path.clone();
    if let Some(q) = parsed.query() {
        full_path.push('?');
        full_path.push_str(q);
    }
    if let Some(f) = parsed.fragment() {
        full_path.push('#');
        full_path.push_str(f);
    }

    Some(UrlContext {
        url: raw.to_string(),
        domain: registrable_domain(host),
        subdomain: host.to_string(),
        path,
        full_path,
    })
}

/// Last two dot-separated labels of `host`, or the host itself when it
/// has fewer than two.
pub(crate) fn registrable_domain(host: &str) -> String {
    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() <= 2 {
        return host.to_string();
    }
    labels[labels.len() - 2..].join(".")
}
