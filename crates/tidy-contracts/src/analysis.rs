use serde::{Deserialize, Serialize};

/// Structured scene analysis for one photographed space.
///
/// `visible_items[i]` and `item_arrangements[i]` always refer to the same
/// object; arrangements restate where that object ends up, never a
/// different object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalysisResult {
    pub space: String,
    pub visible_items: Vec<String>,
    pub item_arrangements: Vec<String>,
    pub trash_items: Vec<String>,
    pub misplaced_items: Vec<String>,
    pub item_count: u32,
    pub steps: Vec<ActionStep>,
    pub total_minutes: u32,
    pub tip: String,
    pub encouragement: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ActionStep {
    pub step: String,
    pub minutes: u32,
}

impl AnalysisResult {
    pub fn is_removable(&self, item: &str) -> bool {
        let needle = item.trim().to_lowercase();
        self.trash_items
            .iter()
            .chain(self.misplaced_items.iter())
            .any(|candidate| candidate.trim().to_lowercase() == needle)
    }

    /// Visible objects that stay in the room, paired with their neatened
    /// arrangement, in scene order.
    pub fn kept_items(&self) -> Vec<(&str, &str)> {
        self.visible_items
            .iter()
            .zip(self.item_arrangements.iter())
            .filter(|(item, _)| !self.is_removable(item))
            .map(|(item, arrangement)| (item.as_str(), arrangement.as_str()))
            .collect()
    }

    pub fn removable_items(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for item in self.trash_items.iter().chain(self.misplaced_items.iter()) {
            let trimmed = item.trim();
            if trimmed.is_empty() {
                continue;
            }
            if out
                .iter()
                .any(|existing| existing.eq_ignore_ascii_case(trimmed))
            {
                continue;
            }
            out.push(trimmed);
        }
        out
    }
}
