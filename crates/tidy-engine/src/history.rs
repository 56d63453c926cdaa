use std::cmp::Reverse;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use indexmap::IndexMap;
use tidy_contracts::records::{ItemRecord, UserProfile};
use tidy_contracts::taxonomy::{resolve_category_label, resolve_space_label};

pub const TRAILING_WINDOW_DAYS: i64 = 7;
pub const RECENT_WINDOW: usize = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemField {
    Category,
    Space,
}

impl ItemField {
    fn read(self, record: &ItemRecord) -> Option<&str> {
        match self {
            Self::Category => record.category(),
            Self::Space => record.space(),
        }
    }
}

/// Everything the prompt needs to know about a user's past.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregatedContext {
    pub total_items: usize,
    pub items_this_week: usize,
    pub top_category: Option<String>,
    pub top_space: Option<String>,
    pub recent_activity: Vec<String>,
    pub streak: u32,
    pub score: i64,
    pub vision: Option<String>,
}

/// Builds the history context from an unordered snapshot of the user's
/// records. Ordering happens here rather than in the store query so the store
/// needs no composite index.
pub fn aggregate(
    mut records: Vec<ItemRecord>,
    profile: Option<&UserProfile>,
    now: DateTime<Utc>,
) -> AggregatedContext {
    sort_newest_first(&mut records);
    let recent = recent_window(&records, RECENT_WINDOW);

    AggregatedContext {
        total_items: records.len(),
        items_this_week: items_in_trailing_window(&records, now, TRAILING_WINDOW_DAYS),
        top_category: most_frequent(&records, ItemField::Category).map(|(key, _)| key.to_string()),
        top_space: most_frequent(recent, ItemField::Space).map(|(key, _)| key.to_string()),
        recent_activity: recent
            .iter()
            .filter(|record| record.name().is_some())
            .map(|record| format_activity_line(record, now))
            .collect(),
        streak: profile.map(|profile| profile.streak).unwrap_or(0),
        score: profile.map(|profile| profile.score).unwrap_or(0),
        vision: profile
            .and_then(UserProfile::vision)
            .map(str::to_string),
    }
}

/// Stable sort, newest first. Records with unreadable dates sink to the end.
pub fn sort_newest_first(records: &mut [ItemRecord]) {
    records.sort_by_key(|record| Reverse(record.created_at()));
}

/// Most common value of `field` with its count. Records without the field are
/// ignored; on equal counts the key seen first wins.
pub fn most_frequent(records: &[ItemRecord], field: ItemField) -> Option<(&str, usize)> {
    let mut tally: IndexMap<&str, usize> = IndexMap::new();
    for record in records {
        if let Some(value) = field.read(record) {
            *tally.entry(value).or_insert(0) += 1;
        }
    }

    let mut best: Option<(&str, usize)> = None;
    for (key, count) in tally {
        if best.map(|(_, top)| count > top).unwrap_or(true) {
            best = Some((key, count));
        }
    }
    best
}

/// Records created in `[now - window_days, now]`.
pub fn items_in_trailing_window(
    records: &[ItemRecord],
    now: DateTime<Utc>,
    window_days: i64,
) -> usize {
    let floor = now - ChronoDuration::days(window_days);
    records
        .iter()
        .map(ItemRecord::created_at)
        .filter(|created| *created >= floor && *created <= now)
        .count()
}

/// First `n` records of a newest-first slice.
pub fn recent_window(sorted: &[ItemRecord], n: usize) -> &[ItemRecord] {
    &sorted[..sorted.len().min(n)]
}

pub fn format_activity_line(record: &ItemRecord, now: DateTime<Utc>) -> String {
    let name = record.name().unwrap_or("item");
    let category = resolve_category_label(record.category().unwrap_or_default());
    let days = (now - record.created_at()).num_days().max(0);
    let when = if days == 0 {
        "today".to_string()
    } else {
        format!("{days}d ago")
    };
    match record.space() {
        Some(space) => format!(
            "- {name} ({category}, {}) {when}",
            resolve_space_label(space)
        ),
        None => format!("- {name} ({category}) {when}"),
    }
}
