//! Domain model structs persisted by the store.
//!
//! Every struct derives `Serialize` and `Deserialize` so it can be handed
//! directly to a UI layer.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};

/// Display name reported until the user sets one.
pub const DEFAULT_DISPLAY_NAME: &str = "Default Name";

// ---------------------------------------------------------------------------
// ChatEntry
// ---------------------------------------------------------------------------

/// A single chat entry.  Immutable once stored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChatEntry {
    /// Row id assigned by SQLite on insert; never reused.
    pub id: i64,
    /// Message body.  Empty when the entry only carries an image.
    pub text: String,
    /// Path of the attached image, if any.
    pub image_path: Option<String>,
    /// Insert time in milliseconds since the Unix epoch.
    pub created_at: i64,
}

impl ChatEntry {
    /// Sort key of the collection: `(created_at, id)` ascending.
    pub fn order_key(&self) -> (i64, i64) {
        (self.created_at, self.id)
    }

    pub fn created_at_utc(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.created_at).single()
    }
}

// ---------------------------------------------------------------------------
// NewEntry
// ---------------------------------------------------------------------------

/// Request to append a chat entry.  The store assigns `id` and `created_at`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NewEntry {
    pub text: Option<String>,
    pub image_path: Option<String>,
}

impl NewEntry {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            image_path: None,
        }
    }

    pub fn image(path: impl Into<String>) -> Self {
        Self {
            text: None,
            image_path: Some(path.into()),
        }
    }

    /// Check that at least one of text / image path carries content and
    /// return the normalized `(body, image_path)` pair to persist.
    ///
    /// Blank text counts as empty.  A blank image path is treated as absent.
    pub fn validate(&self) -> Result<(String, Option<String>)> {
        let image_path = self
            .image_path
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .map(str::to_string);

        let body = match self.text.as_deref() {
            Some(t) if !t.trim().is_empty() => t.to_string(),
            _ => String::new(),
        };

        if body.is_empty() && image_path.is_none() {
            return Err(StoreError::InvalidEntry(
                "an entry needs text or an image".into(),
            ));
        }

        Ok((body, image_path))
    }
}

// ---------------------------------------------------------------------------
// ProfileRecord
// ---------------------------------------------------------------------------

/// The single per-installation user profile.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProfileRecord {
    pub display_name: String,
    pub image_path: Option<String>,
}

impl Default for ProfileRecord {
    fn default() -> Self {
        Self {
            display_name: DEFAULT_DISPLAY_NAME.to_string(),
            image_path: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_only_entry_is_valid() {
        let (body, image) = NewEntry::text("hello").validate().unwrap();
        assert_eq!(body, "hello");
        assert_eq!(image, None);
    }

    #[test]
    fn image_only_entry_has_empty_body() {
        let entry = NewEntry {
            text: Some(String::new()),
            image_path: Some("/img/a.jpg".into()),
        };
        let (body, image) = entry.validate().unwrap();
        assert_eq!(body, "");
        assert_eq!(image.as_deref(), Some("/img/a.jpg"));
    }

    #[test]
    fn empty_entry_is_rejected() {
        let err = NewEntry::default().validate().unwrap_err();
        assert!(matches!(err, StoreError::InvalidEntry(_)));

        let blank = NewEntry {
            text: Some("   \n".into()),
            image_path: Some("  ".into()),
        };
        assert!(matches!(
            blank.validate().unwrap_err(),
            StoreError::InvalidEntry(_)
        ));
    }

    #[test]
    fn entry_serializes_camel_case() {
        let entry = ChatEntry {
            id: 1,
            text: "hi".into(),
            image_path: None,
            created_at: 1_700_000_000_000,
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["imagePath"], serde_json::Value::Null);
        assert_eq!(json["createdAt"], 1_700_000_000_000i64);
        assert!(entry.created_at_utc().is_some());
    }

    #[test]
    fn profile_defaults() {
        let profile = ProfileRecord::default();
        assert_eq!(profile.display_name, "Default Name");
        assert!(profile.image_path.is_none());
    }
}
