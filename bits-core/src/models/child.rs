use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::BitsError;
use crate::palette;

pub const MAX_NAME_CHARS: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Child {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub birthdate: NaiveDate,
    pub color: String,
    #[serde(default)]
    pub photo_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct NewChild {
    pub name: String,
    pub birthdate: Option<NaiveDate>,
    /// Defaults to the first palette token.
    pub color: Option<String>,
}

impl NewChild {
    pub fn validate(&self, today: NaiveDate) -> Result<(), BitsError> {
        validate_name(&self.name)?;
        let birthdate = self
            .birthdate
            .ok_or_else(|| BitsError::validation("Please enter a valid birthdate"))?;
        validate_birthdate(birthdate, today)?;
        if let Some(color) = &self.color {
            validate_color(color)?;
        }
        Ok(())
    }

    /// Validate against `today` and produce the row to insert.
    pub fn into_insert(self, user_id: Uuid, today: NaiveDate) -> Result<ChildInsert, BitsError> {
        let name = validate_name(&self.name)?;
        let birthdate = self
            .birthdate
            .ok_or_else(|| BitsError::validation("Please enter a valid birthdate"))?;
        validate_birthdate(birthdate, today)?;
        let color = match self.color {
            Some(c) => validate_color(&c)?,
            None => palette::DEFAULT_COLOR.to_string(),
        };
        Ok(ChildInsert {
            user_id,
            name,
            birthdate,
            color,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct ChildPatch {
    pub name: Option<String>,
    pub birthdate: Option<NaiveDate>,
    pub color: Option<String>,
}

impl ChildPatch {
    pub fn into_changes(self, today: NaiveDate) -> Result<ChildChanges, BitsError> {
        let name = self.name.as_deref().map(validate_name).transpose()?;
        if let Some(birthdate) = self.birthdate {
            validate_birthdate(birthdate, today)?;
        }
        let color = self.color.as_deref().map(validate_color).transpose()?;
        Ok(ChildChanges {
            name,
            birthdate: self.birthdate,
            color,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChildInsert {
    pub user_id: Uuid,
    pub name: String,
    pub birthdate: NaiveDate,
    pub color: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChildChanges {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub birthdate: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

fn validate_name(name: &str) -> Result<String, BitsError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(BitsError::validation("Name is required"));
    }
    if trimmed.chars().count() > MAX_NAME_CHARS {
        return Err(BitsError::validation("Name too long"));
    }
    Ok(trimmed.to_string())
}

fn validate_birthdate(birthdate: NaiveDate, today: NaiveDate) -> Result<(), BitsError> {
    let earliest = NaiveDate::from_ymd_opt(1900, 1, 1).unwrap_or(NaiveDate::MIN);
    if birthdate <= earliest || birthdate >= today {
        return Err(BitsError::validation("Please enter a valid birthdate"));
    }
    Ok(())
}

fn validate_color(color: &str) -> Result<String, BitsError> {
    let trimmed = color.trim();
    if trimmed.is_empty() {
        return Err(BitsError::validation("Please select a color"));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_new_child_defaults_color_and_trims_name() {
        let insert = NewChild {
            name: "  Maya  ".into(),
            birthdate: Some(date(2021, 4, 12)),
            color: None,
        }
        .into_insert(Uuid::nil(), today())
        .unwrap();
        assert_eq!(insert.name, "Maya");
        assert_eq!(insert.color, palette::DEFAULT_COLOR);
    }

    #[test]
    fn test_birthdate_must_be_past_and_after_1900() {
        let make = |d| NewChild {
            name: "Leo".into(),
            birthdate: Some(d),
            color: None,
        };
        assert!(make(today()).into_insert(Uuid::nil(), today()).is_err());
        assert!(make(date(1900, 1, 1)).into_insert(Uuid::nil(), today()).is_err());
        assert!(make(date(1900, 1, 2)).into_insert(Uuid::nil(), today()).is_ok());
        assert!(NewChild {
            name: "Leo".into(),
            ..Default::default()
        }
        .into_insert(Uuid::nil(), today())
        .is_err());
    }

    #[test]
    fn test_name_length_bounds() {
        let make = |n: String| NewChild {
            name: n,
            birthdate: Some(date(2020, 1, 1)),
            color: None,
        };
        assert!(make(String::new()).into_insert(Uuid::nil(), today()).is_err());
        assert!(make("x".repeat(100)).into_insert(Uuid::nil(), today()).is_ok());
        assert!(make("x".repeat(101)).into_insert(Uuid::nil(), today()).is_err());
    }

    #[test]
    fn test_patch_validates_only_present_fields() {
        let changes = ChildPatch {
            color: Some("hsl(180, 90%, 40%)".into()),
            ..Default::default()
        }
        .into_changes(today())
        .unwrap();
        assert_eq!(changes.name, None);
        assert_eq!(changes.color.as_deref(), Some("hsl(180, 90%, 40%)"));

        assert!(ChildPatch {
            color: Some(" ".into()),
            ..Default::default()
        }
        .into_changes(today())
        .is_err());
    }
}
