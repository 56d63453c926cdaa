//! Coaching prompt templates and the composer that fills them.
//!
//! Templates are immutable and carry named `{slot}` placeholders. Bump
//! [`PROMPT_TEMPLATE_VERSION`] whenever any template text changes; the version
//! is logged with every generated comment.

use rand::Rng;
use tidy_contracts::records::ItemRecord;
use tidy_contracts::requests::EncouragementRequest;
use tidy_contracts::taxonomy::{resolve_category_label, resolve_space_label};

use crate::history::AggregatedContext;

pub const PROMPT_TEMPLATE_VERSION: &str = "coach-v3";

pub const PERSONA: &str = "You are Tidy, a warm, observant decluttering coach inside a minimalism app. \
You talk like a friend who has been paying attention: specific, brief and never preachy. \
You celebrate letting go of things, not owning better things.";

const HARD_CONSTRAINTS_TEMPLATE: &str = "HARD RULES (never break these):
1. Never use generic praise phrases such as \"great job\", \"keep it up\", \"well done\", \"amazing\" or \"awesome\".
2. Never recommend buying anything. No storage products, bins, organizers or replacements.
3. Always reference at least one concrete fact: the item itself, its note, or a number from the history.
4. Respond in the same language the user's own text (item name, note, vision) is written in.
5. {emoji_rule}";

const SHORT_EMOJI_RULE: &str = "Use exactly one emoji, never more than one.";
const DETAILED_EMOJI_RULE: &str = "Use at most two emoji; one is ideal.";

const MILESTONE_GUIDANCE: &str = "MILESTONES (notice them yourself from the numbers; mention one only if the data shows it):
- every 5th item decluttered in total (5, 10, 15, ...)
- streaks of 3, 7, 14 or 30 days
- point totals reaching 50, 100, 200 or 500";

const SHORT_TASK: &str = "TASK: React to this item in under 8 words plus exactly one emoji. \
Output only the reaction.";

const DETAILED_TASK_TEMPLATE: &str = "TASK: Write 2-3 sentences with one emoji. {maintenance_rule} \
Output only the message.";

const MAINTENANCE_RULE: &str = "The user shared a before/after photo, so include exactly one maintenance suggestion framed as a small habit, never a purchase.";
const NO_MAINTENANCE_RULE: &str = "Do not give maintenance advice.";

const ENCOURAGEMENT_TASK: &str = "TASK: The user just logged this item. Write one encouraging line \
under 12 words plus exactly one emoji that names the item or its category. Output only the line.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseMode {
    Short,
    Detailed,
}

impl ResponseMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Short => "short",
            Self::Detailed => "detailed",
        }
    }
}

/// Chooses the response length for one invocation.
pub trait ModePicker: Send + Sync {
    fn pick(&self) -> ResponseMode;
}

/// Random draw, `Detailed` with probability `detailed_weight`.
#[derive(Debug, Clone, Copy)]
pub struct WeightedModePicker {
    detailed_weight: f64,
}

impl WeightedModePicker {
    pub fn new(detailed_weight: f64) -> Self {
        let detailed_weight = if detailed_weight.is_finite() {
            detailed_weight.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self { detailed_weight }
    }
}

impl Default for WeightedModePicker {
    fn default() -> Self {
        Self::new(0.2)
    }
}

impl ModePicker for WeightedModePicker {
    fn pick(&self) -> ResponseMode {
        if rand::thread_rng().gen_bool(self.detailed_weight) {
            ResponseMode::Detailed
        } else {
            ResponseMode::Short
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FixedModePicker(pub ResponseMode);

impl ModePicker for FixedModePicker {
    fn pick(&self) -> ResponseMode {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPrompt {
    pub system: Option<String>,
    pub user: String,
    pub mode: ResponseMode,
}

impl RenderedPrompt {
    /// Both halves joined, for providers without a separate system slot.
    pub fn combined(&self) -> String {
        match self.system.as_deref() {
            Some(system) => format!("{system}\n\n{}", self.user),
            None => self.user.clone(),
        }
    }
}

/// Renders the coaching prompt for a freshly logged item. Pure apart from
/// what the caller passes in.
pub fn compose_prompt(
    item: &ItemRecord,
    history: &AggregatedContext,
    mode: ResponseMode,
) -> RenderedPrompt {
    let mut user = item_block(item);
    if let Some(vision) = history.vision.as_deref() {
        user.push_str(&format!("\nUSER VISION: \"{vision}\"\n"));
    }
    user.push('\n');
    user.push_str(&history_block(history));
    user.push('\n');
    user.push_str(&task_for(item, mode));

    RenderedPrompt {
        system: Some(system_instruction(mode)),
        user,
        mode,
    }
}

pub fn compose_with_picker(
    item: &ItemRecord,
    history: &AggregatedContext,
    picker: &dyn ModePicker,
) -> RenderedPrompt {
    compose_prompt(item, history, picker.pick())
}

/// Prompt for the direct encouragement request; always short.
pub fn compose_encouragement(request: &EncouragementRequest) -> RenderedPrompt {
    let name = request.item_name.as_deref().unwrap_or_default().trim();
    let category = resolve_category_label(request.category.as_deref().unwrap_or_default().trim());
    let user = format!(
        "JUST LOGGED\n- Item: {name}\n- Category: {category}\n- Points earned: {}\n\n\
STATS\n- Total points: {}\n- Current streak: {} days\n- Items in this category so far: {}\n\n{ENCOURAGEMENT_TASK}",
        request.points, request.total_score, request.streak, request.category_count,
    );
    RenderedPrompt {
        system: Some(system_instruction(ResponseMode::Short)),
        user,
        mode: ResponseMode::Short,
    }
}

pub fn system_instruction(mode: ResponseMode) -> String {
    let emoji_rule = match mode {
        ResponseMode::Short => SHORT_EMOJI_RULE,
        ResponseMode::Detailed => DETAILED_EMOJI_RULE,
    };
    let constraints = render_template(HARD_CONSTRAINTS_TEMPLATE, &[("emoji_rule", emoji_rule)]);
    format!("{PERSONA}\n\n{constraints}\n\n{MILESTONE_GUIDANCE}")
}

fn item_block(item: &ItemRecord) -> String {
    let mut lines = vec!["CURRENT ITEM".to_string()];
    lines.push(format!("- Name: {}", item.name().unwrap_or_default()));
    lines.push(format!(
        "- Category: {}",
        resolve_category_label(item.category().unwrap_or_default())
    ));
    if let Some(space) = item.space() {
        lines.push(format!("- Space: {}", resolve_space_label(space)));
    }
    lines.push(format!("- Points: {}", item.points));
    if let Some(note) = item.note() {
        lines.push(format!("- User note: \"{note}\""));
    }
    if item.has_before_after {
        lines.push("- Before/after photo: yes".to_string());
    }
    lines.join("\n") + "\n"
}

fn history_block(history: &AggregatedContext) -> String {
    let mut lines = vec!["HISTORY".to_string()];
    lines.push(format!("- Total items decluttered: {}", history.total_items));
    lines.push(format!("- Items in the last 7 days: {}", history.items_this_week));
    lines.push(format!("- Current streak: {} days", history.streak));
    lines.push(format!("- Total points: {}", history.score));
    if let Some(category) = history.top_category.as_deref() {
        lines.push(format!(
            "- Most decluttered category: {}",
            resolve_category_label(category)
        ));
    }
    if let Some(space) = history.top_space.as_deref() {
        lines.push(format!(
            "- Most active space lately: {}",
            resolve_space_label(space)
        ));
    }
    if history.recent_activity.is_empty() {
        lines.push("- Recent activity: none yet".to_string());
    } else {
        lines.push("- Recent activity:".to_string());
        for line in &history.recent_activity {
            lines.push(format!("  {line}"));
        }
    }
    lines.join("\n") + "\n"
}

fn task_for(item: &ItemRecord, mode: ResponseMode) -> String {
    match mode {
        ResponseMode::Short => SHORT_TASK.to_string(),
        ResponseMode::Detailed => {
            let maintenance_rule = if item.has_before_after {
                MAINTENANCE_RULE
            } else {
                NO_MAINTENANCE_RULE
            };
            render_template(
                DETAILED_TASK_TEMPLATE,
                &[("maintenance_rule", maintenance_rule)],
            )
        }
    }
}

fn render_template(template: &str, slots: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (slot, value) in slots {
        out = out.replace(&format!("{{{slot}}}"), value);
    }
    out
}
