//! Core data models: scopes, notes, URL contexts, and remote documents.
//!
//! Notes serialize with camelCase field names so the same JSON is valid
//! both as a local cache value and as a remote document payload.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Granularity at which notes are grouped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoteScope {
    Browser,
    Domain,
    Subdomain,
    Page,
}

impl NoteScope {
    /// All scopes, most specific first. This is the presentation order.
    pub const DISPLAY_ORDER: [NoteScope; 4] = [
        NoteScope::Page,
        NoteScope::Subdomain,
        NoteScope::Domain,
        NoteScope::Browser,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NoteScope::Browser => "browser",
            NoteScope::Domain => "domain",
            NoteScope::Subdomain => "subdomain",
            NoteScope::Page => "page",
        }
    }

    /// Parse an untyped scope string, defaulting to [`NoteScope::Browser`].
    ///
    /// Unknown values indicate a caller bug upstream; they are logged and
    /// trip a debug assertion, but release builds keep working.
    pub fn from_str_lossy(raw: &str) -> NoteScope {
        match raw.parse() {
            Ok(scope) => scope,
            Err(_) => {
                tracing::warn!(scope = raw, "unrecognized note scope, using browser");
                debug_assert!(false, "unrecognized note scope: {raw}");
                NoteScope::Browser
            }
        }
    }

    /// Scopes to present for a context, most specific first.
    ///
    /// `subdomain` is dropped when the host has no genuine subdomain,
    /// since it would show the same collection label as `domain`.
    pub fn visible_for(ctx: &UrlContext) -> Vec<NoteScope> {
        Self::DISPLAY_ORDER
            .into_iter()
            .filter(|s| *s != NoteScope::Subdomain || ctx.has_subdomain())
            .collect()
    }
}

impl fmt::Display for NoteScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NoteScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "browser" => Ok(NoteScope::Browser),
            "domain" => Ok(NoteScope::Domain),
            "subdomain" => Ok(NoteScope::Subdomain),
            "page" => Ok(NoteScope::Page),
            other => Err(format!(
                "unknown scope '{}': must be browser, domain, subdomain, or page",
                other
            )),
        }
    }
}

/// Structured decomposition of a page URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UrlContext {
    /// The URL as given.
    pub url: String,
    /// Last two labels of the hostname.
    pub domain: String,
    /// Full hostname.
    pub subdomain: String,
    /// Pathname only.
    pub path: String,
    /// Pathname, query, and fragment.
    pub full_path: String,
}

impl UrlContext {
    pub fn has_subdomain(&self) -> bool {
        self.subdomain != self.domain
    }
}

/// A single user note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    /// Unique within its scope-context collection.
    pub id: String,
    pub text: String,
    /// Milliseconds since the Unix epoch.
    pub created_at: i64,
    /// Milliseconds since the Unix epoch.
    pub updated_at: i64,
}

impl Note {
    pub fn new(text: impl Into<String>) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            id: Uuid::new_v4().to_string(),
            text: text.into(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Replace the text and bump `updated_at`.
    pub fn edit(&mut self, text: impl Into<String>) {
        self.text = text.into();
        self.updated_at = chrono::Utc::now().timestamp_millis();
    }
}

/// Stored shape of one remote document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteDocument {
    #[serde(default)]
    pub notes: Vec<Note>,
    /// Assigned by the store on every write.
    pub updated_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(domain: &str, subdomain: &str) -> UrlContext {
        UrlContext {
            url: format!("https://{}/", subdomain),
            domain: domain.to_string(),
            subdomain: subdomain.to_string(),
            path: "/".to_string(),
            full_path: "/".to_string(),
        }
    }

    #[test]
    fn test_scope_round_trips_through_str() {
        for scope in NoteScope::DISPLAY_ORDER {
            assert_eq!(scope.as_str().parse::<NoteScope>().unwrap(), scope);
        }
        assert!("tab".parse::<NoteScope>().is_err());
    }

    #[test]
    fn test_scope_lossy_known_values() {
        assert_eq!(NoteScope::from_str_lossy("page"), NoteScope::Page);
        assert_eq!(NoteScope::from_str_lossy("domain"), NoteScope::Domain);
    }

    #[test]
    fn test_visible_scopes_elide_subdomain_without_subdomain() {
        let scopes = NoteScope::visible_for(&ctx("example.com", "example.com"));
        assert_eq!(
            scopes,
            vec![NoteScope::Page, NoteScope::Domain, NoteScope::Browser]
        );

        let scopes = NoteScope::visible_for(&ctx("example.com", "app.example.com"));
        assert_eq!(scopes, NoteScope::DISPLAY_ORDER.to_vec());
    }

    #[test]
    fn test_note_serializes_camel_case() {
        let note = Note {
            id: "n1".to_string(),
            text: "hello".to_string(),
            created_at: 1,
            updated_at: 2,
        };
        let json = serde_json::to_value(&note).unwrap();
        assert_eq!(json["createdAt"], 1);
        assert_eq!(json["updatedAt"], 2);
    }

    #[test]
    fn test_note_edit_bumps_updated_at() {
        let mut note = Note::new("first");
        note.updated_at = 0;
        note.edit("second");
        assert_eq!(note.text, "second");
        assert!(note.updated_at > 0);
    }

    #[test]
    fn test_remote_document_missing_notes_defaults_empty() {
        let doc: RemoteDocument = serde_json::from_str(r#"{"updatedAt": 5}"#).unwrap();
        assert!(doc.notes.is_empty());
        assert_eq!(doc.updated_at, 5);
    }
}
