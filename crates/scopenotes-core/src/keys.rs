//! Scope-key derivation.
//!
//! One logical `(scope, context)` pair maps to two storage keys:
//!
//! | Scope | Local cache key | Remote document id |
//! |-------|-----------------|--------------------|
//! | browser | `notes:browser` | `browser` |
//! | domain | `notes:domain:<domain>` | `domain_<domain>` |
//! | subdomain | `notes:subdomain:<host>` | `subdomain_<host>` |
//! | page | `notes:page:<host><path>` | `page_<host><path with / as ~>` |
//!
//! Remote document ids may not contain `/`, so page paths are escaped.

use crate::context::registrable_domain;
use crate::models::{NoteScope, UrlContext};

/// Prefix shared by every local note collection key.
pub const LOCAL_PREFIX: &str = "notes:";

/// Local cache key for a scope-context.
pub fn storage_key(scope: NoteScope, ctx: &UrlContext) -> String {
    match scope {
        NoteScope::Domain => format!("notes:domain:{}", ctx.domain),
        NoteScope::Subdomain => format!("notes:subdomain:{}", ctx.subdomain),
        NoteScope::Page => format!("notes:page:{}{}", ctx.subdomain, ctx.path),
        NoteScope::Browser => format!("notes:{}", NoteScope::Browser),
    }
}

/// Remote document id for a scope-context.
pub fn remote_key(scope: NoteScope, ctx: &UrlContext) -> String {
    match scope {
        NoteScope::Domain => format!("domain_{}", ctx.domain),
        NoteScope::Subdomain => format!("subdomain_{}", ctx.subdomain),
        NoteScope::Page => format!("page_{}{}", ctx.subdomain, ctx.path.replace('/', "~")),
        NoteScope::Browser => NoteScope::Browser.to_string(),
    }
}

/// A local cache key written before remote sync existed, decoded back
/// into its scope and the context fragment it was derived from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyKey {
    pub scope: NoteScope,
    /// Only the fields the key encodes are meaningful; `url` and
    /// `full_path` are reconstructed best-effort.
    pub context: UrlContext,
}

impl LegacyKey {
    pub fn remote_key(&self) -> String {
        remote_key(self.scope, &self.context)
    }
}

/// Decode a `notes:<scope>[:<discriminator>]` key.
///
/// Returns `None` for keys of any other shape, including an empty
/// discriminator or a page key without a path.
pub fn parse_legacy_key(key: &str) -> Option<LegacyKey> {
    let rest = key.strip_prefix(LOCAL_PREFIX)?;
    if rest == "browser" {
        return Some(LegacyKey {
            scope: NoteScope::Browser,
            context: fragment("", "", ""),
        });
    }

    let (scope, discriminator) = rest.split_once(':')?;
    if discriminator.is_empty() {
        return None;
    }

    match scope {
        "domain" => Some(LegacyKey {
            scope: NoteScope::Domain,
            context: fragment(discriminator, discriminator, ""),
        }),
        "subdomain" => Some(LegacyKey {
            scope: NoteScope::Subdomain,
            context: fragment(&registrable_domain(discriminator), discriminator, ""),
        }),
        "page" => {
            let slash = discriminator.find('/')?;
            let (host, path) = discriminator.split_at(slash);
            if host.is_empty() {
                return None;
            }
            Some(LegacyKey {
                scope: NoteScope::Page,
                context: fragment(&registrable_domain(host), host, path),
            })
        }
        _ => None,
    }
}

fn fragment(domain: &str, subdomain: &str, path: &str) -> UrlContext {
    UrlContext {
        url: if subdomain.is_empty() {
            String::new()
        } else {
            format!("https://{}{}", subdomain, path)
        },
        domain: domain.to_string(),
        subdomain: subdomain.to_string(),
        path: path.to_string(),
        full_path: path.to_string(),
    }
}
