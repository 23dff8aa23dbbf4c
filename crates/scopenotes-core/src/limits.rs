//! Write-time bounds on note collections.

use serde::Deserialize;

use crate::error::{SyncError, SyncResult};
use crate::models::Note;

pub const DEFAULT_MAX_NOTES: usize = 100;
pub const DEFAULT_MAX_NOTE_CHARS: usize = 50_000;
pub const DEFAULT_THROTTLE_MS: i64 = 1_000;

/// Limits applied to every live remote write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct SyncLimits {
    #[serde(default = "default_max_notes")]
    pub max_notes: usize,
    /// Measured in Unicode scalar values, not bytes.
    #[serde(default = "default_max_note_chars")]
    pub max_note_chars: usize,
    /// Minimum interval between accepted writes to the same key.
    #[serde(default = "default_throttle_ms")]
    pub throttle_ms: i64,
}

fn default_max_notes() -> usize {
    DEFAULT_MAX_NOTES
}
fn default_max_note_chars() -> usize {
    DEFAULT_MAX_NOTE_CHARS
}
fn default_throttle_ms() -> i64 {
    DEFAULT_THROTTLE_MS
}

impl Default for SyncLimits {
    fn default() -> Self {
        Self {
            max_notes: DEFAULT_MAX_NOTES,
            max_note_chars: DEFAULT_MAX_NOTE_CHARS,
            throttle_ms: DEFAULT_THROTTLE_MS,
        }
    }
}

impl SyncLimits {
    /// Check count and per-note size. Count is checked first.
    pub fn validate(&self, notes: &[Note]) -> SyncResult<()> {
        if notes.len() > self.max_notes {
            return Err(SyncError::Validation(format!(
                "maximum {} notes",
                self.max_notes
            )));
        }
        if notes
            .iter()
            .any(|n| n.text.chars().count() > self.max_note_chars)
        {
            return Err(SyncError::Validation(
                "note exceeds maximum size".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notes(count: usize, len: usize) -> Vec<Note> {
        (0..count)
            .map(|i| Note {
                id: format!("n{}", i),
                text: "x".repeat(len),
                created_at: 0,
                updated_at: 0,
            })
            .collect()
    }

    #[test]
    fn test_count_boundary() {
        let limits = SyncLimits::default();
        assert!(limits.validate(&notes(100, 10)).is_ok());
        let err = limits.validate(&notes(101, 10)).unwrap_err();
        assert!(matches!(err, SyncError::Validation(ref m) if m == "maximum 100 notes"));
    }

    #[test]
    fn test_size_boundary() {
        let limits = SyncLimits::default();
        assert!(limits.validate(&notes(1, 50_000)).is_ok());
        let err = limits.validate(&notes(1, 50_001)).unwrap_err();
        assert!(matches!(err, SyncError::Validation(ref m) if m == "note exceeds maximum size"));
    }

    #[test]
    fn test_size_counts_chars_not_bytes() {
        let limits = SyncLimits {
            max_note_chars: 3,
            ..SyncLimits::default()
        };
        let mut n = notes(1, 0);
        n[0].text = "äöü".to_string();
        assert!(limits.validate(&n).is_ok());
    }

    #[test]
    fn test_empty_collection_is_valid() {
        assert!(SyncLimits::default().validate(&[]).is_ok());
    }
}
