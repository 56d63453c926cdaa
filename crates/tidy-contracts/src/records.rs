use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::analysis::AnalysisResult;
use crate::time::normalize_timestamp;

pub const COACH_AUTHOR_NAME: &str = "Tidy Coach";
pub const COACH_AVATAR: &str = "coach";

/// One decluttered possession as the app stores it.
///
/// `created_at` is kept raw because the store may hand back a native date, an
/// ISO string or its own timestamp wrapper; read it through
/// [`ItemRecord::created_at`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ItemRecord {
    pub id: String,
    pub user_id: String,
    pub name: Option<String>,
    pub category: Option<String>,
    pub space: Option<String>,
    pub note: Option<String>,
    pub points: i64,
    pub has_before_after: bool,
    pub created_at: Value,
    pub comments: Vec<GeneratedComment>,
}

impl ItemRecord {
    pub fn created_at(&self) -> DateTime<Utc> {
        normalize_timestamp(&self.created_at)
    }

    pub fn name(&self) -> Option<&str> {
        non_blank(self.name.as_deref())
    }

    pub fn category(&self) -> Option<&str> {
        non_blank(self.category.as_deref())
    }

    pub fn space(&self) -> Option<&str> {
        non_blank(self.space.as_deref())
    }

    pub fn note(&self) -> Option<&str> {
        non_blank(self.note.as_deref())
    }

    /// Name and category are the minimum for any coaching; records without
    /// them are left alone.
    pub fn is_processable(&self) -> bool {
        self.name().is_some() && self.category().is_some()
    }

    pub fn has_automated_comment(&self) -> bool {
        self.comments.iter().any(|comment| comment.automated)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserProfile {
    pub user_id: String,
    pub vision: Option<String>,
    pub streak: u32,
    pub score: i64,
}

impl UserProfile {
    pub fn vision(&self) -> Option<&str> {
        non_blank(self.vision.as_deref())
    }
}

/// Entry in an item's comment list. User-written comments deserialize with
/// `automated == false`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GeneratedComment {
    pub author: String,
    pub avatar: String,
    pub automated: bool,
    pub text: String,
    pub created_at: String,
}

impl GeneratedComment {
    pub fn from_coach(text: impl Into<String>, created_at: impl Into<String>) -> Self {
        Self {
            author: COACH_AUTHOR_NAME.to_string(),
            avatar: COACH_AVATAR.to_string(),
            automated: true,
            text: text.into(),
            created_at: created_at.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoachSession {
    pub id: String,
    pub user_id: String,
    pub before_image_url: String,
    pub after_image_url: Option<String>,
    pub analysis: AnalysisResult,
    pub created_at: String,
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}
