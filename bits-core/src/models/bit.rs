use bytes::Bytes;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::BitsError;

/// Maximum bit text length, counted in characters.
pub const MAX_TEXT_CHARS: usize = 5000;

/// Maximum accepted photo size (10 MiB).
pub const MAX_PHOTO_BYTES: usize = 10 * 1024 * 1024;

const PHOTO_CONTENT_TYPES: &[(&str, &str)] = &[("image/jpeg", "jpg"), ("image/png", "png")];

/// A single recorded moment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bit {
    pub id: Uuid,
    pub user_id: Uuid,
    pub child_id: Option<Uuid>,
    pub text: String,
    pub context: Option<String>,
    pub photo_url: Option<String>,
    /// When the moment happened, as opposed to when it was recorded.
    pub bit_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Joined child profile, present when the store resolves the association.
    #[serde(default, rename = "children", skip_serializing_if = "Option::is_none")]
    pub child: Option<ChildSummary>,
}

impl Bit {
    /// `bit_date` when present, else the calendar date of `created_at`.
    pub fn effective_date(&self) -> NaiveDate {
        self.bit_date.unwrap_or_else(|| self.created_at.date_naive())
    }

    /// Display label of the month the bit falls in, e.g. "March 2024".
    pub fn month_label(&self) -> String {
        self.effective_date().format("%B %Y").to_string()
    }

    pub fn has_photo(&self) -> bool {
        self.photo_url.is_some()
    }
}

/// The slice of a child profile carried alongside a listed bit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChildSummary {
    pub id: Uuid,
    pub name: String,
    pub color: String,
    pub photo_url: Option<String>,
}

/// Photo bytes awaiting upload.
#[derive(Debug, Clone)]
pub struct PhotoUpload {
    pub content_type: String,
    pub bytes: Bytes,
}

impl PhotoUpload {
    pub fn new(content_type: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            content_type: content_type.into(),
            bytes: bytes.into(),
        }
    }

    /// Guess the content type from a file name extension.
    pub fn from_file_name(name: &str, bytes: impl Into<Bytes>) -> Result<Self, BitsError> {
        let ext = name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();
        let content_type = match ext.as_str() {
            "jpg" | "jpeg" => "image/jpeg",
            "png" => "image/png",
            _ => return Err(BitsError::validation("Photo must be JPEG or PNG and under 10MB")),
        };
        Ok(Self::new(content_type, bytes))
    }

    /// File extension used for the stored object.
    pub fn extension(&self) -> &'static str {
        PHOTO_CONTENT_TYPES
            .iter()
            .find(|(ct, _)| *ct == self.content_type)
            .map(|(_, ext)| *ext)
            .unwrap_or("bin")
    }

    pub fn validate(&self) -> Result<(), BitsError> {
        let known = PHOTO_CONTENT_TYPES.iter().any(|(ct, _)| *ct == self.content_type);
        if !known || self.bytes.len() > MAX_PHOTO_BYTES {
            return Err(BitsError::validation("Photo must be JPEG or PNG and under 10MB"));
        }
        Ok(())
    }
}

/// Fields supplied by the caller when recording a new bit.
#[derive(Debug, Clone, Default)]
pub struct NewBit {
    pub text: String,
    pub child_id: Option<Uuid>,
    pub context: Option<String>,
    /// Defaults to today when omitted.
    pub bit_date: Option<NaiveDate>,
    pub photo: Option<PhotoUpload>,
}

impl NewBit {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), BitsError> {
        validate_text(&self.text)?;
        if let Some(photo) = &self.photo {
            photo.validate()?;
        }
        Ok(())
    }
}

/// Partial update of an existing bit. `None` leaves the stored value untouched;
/// `Some(None)` on `child_id`/`context` clears it.
#[derive(Debug, Clone, Default)]
pub struct BitPatch {
    pub text: Option<String>,
    pub child_id: Option<Option<Uuid>>,
    pub context: Option<Option<String>>,
    pub bit_date: Option<NaiveDate>,
    pub photo: Option<PhotoUpload>,
}

impl BitPatch {
    pub fn validate(&self) -> Result<(), BitsError> {
        if let Some(text) = &self.text {
            validate_text(text)?;
        }
        if let Some(photo) = &self.photo {
            photo.validate()?;
        }
        Ok(())
    }
}

pub(crate) fn validate_text(text: &str) -> Result<(), BitsError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(BitsError::validation("Text is required"));
    }
    if trimmed.chars().count() > MAX_TEXT_CHARS {
        return Err(BitsError::validation("Text too long (max 5000 characters)"));
    }
    Ok(())
}

/// Row written to the store on create. Photo upload has already happened.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BitInsert {
    pub user_id: Uuid,
    pub text: String,
    pub child_id: Option<Uuid>,
    pub photo_url: Option<String>,
    pub context: Option<String>,
    pub bit_date: NaiveDate,
}

/// Column changes written on update; absent fields are not serialized.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BitChanges {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub child_id: Option<Option<Uuid>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bit_date: Option<NaiveDate>,
}

impl BitChanges {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn bit_at(bit_date: Option<NaiveDate>, created: DateTime<Utc>) -> Bit {
        Bit {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            child_id: None,
            text: "said 'ball' for the first time".to_string(),
            context: None,
            photo_url: None,
            bit_date,
            created_at: created,
            updated_at: created,
            child: None,
        }
    }

    #[test]
    fn test_effective_date_prefers_bit_date() {
        let created = Utc.with_ymd_and_hms(2024, 5, 2, 9, 0, 0).unwrap();
        let explicit = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert_eq!(bit_at(Some(explicit), created).effective_date(), explicit);
        assert_eq!(
            bit_at(None, created).effective_date(),
            NaiveDate::from_ymd_opt(2024, 5, 2).unwrap()
        );
    }

    #[test]
    fn test_month_label_format() {
        let created = Utc.with_ymd_and_hms(2024, 3, 15, 12, 0, 0).unwrap();
        assert_eq!(bit_at(None, created).month_label(), "March 2024");
    }

    #[test]
    fn test_text_validation_bounds() {
        assert!(NewBit::new("   ").validate().is_err());
        assert!(NewBit::new("a".repeat(MAX_TEXT_CHARS)).validate().is_ok());
        assert!(NewBit::new("a".repeat(MAX_TEXT_CHARS + 1)).validate().is_err());
        // multi-byte characters count once each
        assert!(NewBit::new("é".repeat(MAX_TEXT_CHARS)).validate().is_ok());
    }

    #[test]
    fn test_photo_validation() {
        assert!(PhotoUpload::new("image/png", vec![0u8; 16]).validate().is_ok());
        assert!(PhotoUpload::new("image/gif", vec![0u8; 16]).validate().is_err());
        assert!(PhotoUpload::new("image/jpeg", vec![0u8; MAX_PHOTO_BYTES + 1])
            .validate()
            .is_err());
        assert!(PhotoUpload::from_file_name("beach.JPG", vec![1u8]).is_ok());
        assert!(PhotoUpload::from_file_name("notes.txt", vec![1u8]).is_err());
        assert_eq!(PhotoUpload::new("image/jpeg", vec![1u8]).extension(), "jpg");
    }

    #[test]
    fn test_patch_without_text_skips_text_validation() {
        let patch = BitPatch {
            context: Some(None),
            ..Default::default()
        };
        assert!(patch.validate().is_ok());

        let patch = BitPatch {
            text: Some(String::new()),
            ..Default::default()
        };
        assert!(patch.validate().is_err());
    }

    #[test]
    fn test_changes_serialize_only_present_fields() {
        let changes = BitChanges {
            text: Some("new".into()),
            child_id: Some(None),
            ..Default::default()
        };
        let json = serde_json::to_value(&changes).unwrap();
        assert_eq!(json, serde_json::json!({ "text": "new", "child_id": null }));
        assert!(BitChanges::default().is_empty());
    }

    #[test]
    fn test_deserializes_joined_child() {
        let json = serde_json::json!({
            "id": "0b6b5c1e-6f38-4a53-8f2e-1b8c0b9d6a01",
            "user_id": "6f1c2a5e-3b0d-4c1e-9f4a-2d8b7e6c5a10",
            "child_id": "2a4d9c8e-1f3b-4e5a-b6c7-d8e9f0a1b2c3",
            "text": "hello",
            "context": null,
            "photo_url": null,
            "bit_date": "2024-03-01",
            "created_at": "2024-03-01T10:00:00+00:00",
            "updated_at": "2024-03-01T10:00:00+00:00",
            "children": {
                "id": "2a4d9c8e-1f3b-4e5a-b6c7-d8e9f0a1b2c3",
                "name": "Maya",
                "color": "hsl(195, 100%, 45%)",
                "photo_url": null
            }
        });
        let bit: Bit = serde_json::from_value(json).unwrap();
        assert_eq!(bit.child.as_ref().map(|c| c.name.as_str()), Some("Maya"));
        assert_eq!(bit.month_label(), "March 2024");
    }
}
