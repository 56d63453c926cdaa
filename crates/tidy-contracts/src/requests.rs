use serde::{Deserialize, Serialize};

/// Body of a direct encouragement request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EncouragementRequest {
    pub item_name: Option<String>,
    pub category: Option<String>,
    pub points: i64,
    pub total_score: i64,
    pub streak: u32,
    pub category_count: u32,
}

impl EncouragementRequest {
    /// Returns the missing field names, empty when the request is usable.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if is_blank(self.item_name.as_deref()) {
            missing.push("itemName");
        }
        if is_blank(self.category.as_deref()) {
            missing.push("category");
        }
        missing
    }
}

/// Body of a direct space-analysis request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SpaceAnalysisRequest {
    pub image_base64: Option<String>,
    pub user_id: Option<String>,
    pub user_vision: Option<String>,
}

impl SpaceAnalysisRequest {
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if is_blank(self.image_base64.as_deref()) {
            missing.push("imageBase64");
        }
        if is_blank(self.user_id.as_deref()) {
            missing.push("userId");
        }
        missing
    }
}

fn is_blank(value: Option<&str>) -> bool {
    value.map(str::trim).unwrap_or_default().is_empty()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn encouragement_request_reports_missing_fields() -> anyhow::Result<()> {
        let request: EncouragementRequest =
            serde_json::from_value(json!({"points": 5, "category": " "}))?;
        assert_eq!(request.missing_fields(), vec!["itemName", "category"]);

        let request: EncouragementRequest = serde_json::from_value(json!({
            "itemName": "old router",
            "category": "electronics",
            "points": 10,
            "totalScore": 120,
            "streak": 3,
            "categoryCount": 4,
        }))?;
        assert!(request.missing_fields().is_empty());
        assert_eq!(request.category_count, 4);
        Ok(())
    }

    #[test]
    fn analysis_request_needs_image_and_user() -> anyhow::Result<()> {
        let request: SpaceAnalysisRequest =
            serde_json::from_value(json!({"userVision": "calm"}))?;
        assert_eq!(request.missing_fields(), vec!["imageBase64", "userId"]);
        Ok(())
    }
}
