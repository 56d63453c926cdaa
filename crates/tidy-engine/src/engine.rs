use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tidy_contracts::events::EventWriter;
use tidy_contracts::records::{GeneratedComment, ItemRecord};
use tidy_contracts::requests::{EncouragementRequest, SpaceAnalysisRequest};
use tidy_contracts::time::now_utc_iso;

use crate::analysis::{event_payload, SpaceAnalysisOutcome, SpaceAnalyzer};
use crate::config::{CoachConfig, ANALYSIS_TOKEN_CAP, TEXT_TOKEN_CAP};
use crate::error::CoachError;
use crate::generation::{AnthropicProvider, GenerationClient};
use crate::history::aggregate;
use crate::image_edit::{ImageEditProvider, OpenAiEditProvider};
use crate::prompts::{
    compose_encouragement, compose_with_picker, ModePicker, ResponseMode, WeightedModePicker,
    PROMPT_TEMPLATE_VERSION,
};
use crate::store::{BlobStore, DocumentStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    MissingFields,
    AlreadyCommented,
}

impl SkipReason {
    fn as_str(self) -> &'static str {
        match self {
            Self::MissingFields => "missing_fields",
            Self::AlreadyCommented => "already_commented",
        }
    }
}

/// Terminal state of one record-creation trigger. Nothing is retried.
#[derive(Debug, Clone, PartialEq)]
pub enum CommentOutcome {
    Skipped(SkipReason),
    Appended { text: String, mode: ResponseMode },
    /// Generated but the append failed; the text is only in the event log.
    Unsaved { text: String, error: String },
    Failed(CoachError),
}

/// Entry point for every inbound trigger. Holds no per-request state; the
/// stores are the only shared state between calls.
pub struct CoachEngine {
    coach: GenerationClient,
    analyzer: SpaceAnalyzer,
    documents: Arc<dyn DocumentStore>,
    blobs: Arc<dyn BlobStore>,
    events: EventWriter,
    mode_picker: Box<dyn ModePicker>,
}

impl CoachEngine {
    pub fn new(
        coach: GenerationClient,
        analyzer: SpaceAnalyzer,
        documents: Arc<dyn DocumentStore>,
        blobs: Arc<dyn BlobStore>,
        events: EventWriter,
    ) -> Self {
        Self {
            coach,
            analyzer,
            documents,
            blobs,
            events,
            mode_picker: Box::new(WeightedModePicker::default()),
        }
    }

    /// Wires the Anthropic text client, the optional OpenAI image editor and
    /// the file event log from `config`.
    pub fn from_config(
        config: &CoachConfig,
        documents: Arc<dyn DocumentStore>,
        blobs: Arc<dyn BlobStore>,
    ) -> Self {
        let coach = GenerationClient::new(
            Box::new(AnthropicProvider::from_config(config)),
            config.text_model.clone(),
            config.text_timeout,
            TEXT_TOKEN_CAP,
        );
        let vision = GenerationClient::new(
            Box::new(AnthropicProvider::from_config(config)),
            config.vision_model.clone(),
            config.vision_timeout,
            ANALYSIS_TOKEN_CAP,
        );
        let editor = OpenAiEditProvider::from_config(config)
            .map(|provider| Box::new(provider) as Box<dyn ImageEditProvider>);
        let events = EventWriter::new(config.events_path.clone(), "tidy");
        Self::new(
            coach,
            SpaceAnalyzer::new(vision, editor),
            documents,
            blobs,
            events,
        )
        .with_mode_picker(Box::new(WeightedModePicker::new(config.detailed_weight)))
    }

    pub fn with_mode_picker(mut self, picker: Box<dyn ModePicker>) -> Self {
        self.mode_picker = picker;
        self
    }

    pub fn events(&self) -> &EventWriter {
        &self.events
    }

    /// Record-creation trigger: appends at most one automated coaching
    /// comment. Failures end up in the event log, never with the caller.
    pub fn on_item_created(&self, item_id: &str, record: &ItemRecord) -> CommentOutcome {
        let events = self.events.for_invocation(format!("item-{item_id}"));
        let skip = |reason: SkipReason| {
            events.record(
                "comment_skipped",
                event_payload(json!({"item_id": item_id, "reason": reason.as_str()})),
            );
            CommentOutcome::Skipped(reason)
        };
        if !record.is_processable() {
            return skip(SkipReason::MissingFields);
        }
        if record.has_automated_comment() {
            return skip(SkipReason::AlreadyCommented);
        }

        let mut history = match self.documents.items_for_user(&record.user_id) {
            Ok(history) => history,
            Err(err) => {
                events.record(
                    "history_unavailable",
                    event_payload(json!({"item_id": item_id, "error": format!("{err:#}")})),
                );
                Vec::new()
            }
        };
        if !history.iter().any(|row| row.id == item_id) {
            let mut current = record.clone();
            current.id = item_id.to_string();
            history.push(current);
        }
        let profile = self
            .documents
            .profile_for_user(&record.user_id)
            .unwrap_or_else(|err| {
                events.record(
                    "profile_unavailable",
                    event_payload(json!({"item_id": item_id, "error": format!("{err:#}")})),
                );
                None
            });

        let context = aggregate(history, profile.as_ref(), Utc::now());
        let prompt = compose_with_picker(record, &context, self.mode_picker.as_ref());
        let text = match self
            .coach
            .generate_text(prompt.system.as_deref(), &prompt.user, TEXT_TOKEN_CAP)
        {
            Ok(text) => text,
            Err(err) => {
                events.record(
                    "comment_failed",
                    event_payload(json!({
                        "item_id": item_id,
                        "error_kind": err.kind(),
                        "error": err.to_string(),
                    })),
                );
                return CommentOutcome::Failed(err.into());
            }
        };

        let comment = GeneratedComment::from_coach(text.clone(), now_utc_iso());
        match self.documents.append_automated_comment(item_id, &comment) {
            Ok(true) => {
                events.record(
                    "comment_generated",
                    event_payload(json!({
                        "item_id": item_id,
                        "user_id": record.user_id,
                        "mode": prompt.mode.as_str(),
                        "prompt_version": PROMPT_TEMPLATE_VERSION,
                        "chars": text.chars().count(),
                    })),
                );
                CommentOutcome::Appended {
                    text,
                    mode: prompt.mode,
                }
            }
            Ok(false) => skip(SkipReason::AlreadyCommented),
            Err(err) => {
                let error = format!("{err:#}");
                events.record(
                    "comment_persist_failed",
                    event_payload(json!({"item_id": item_id, "text": text, "error": error})),
                );
                CommentOutcome::Unsaved { text, error }
            }
        }
    }

    /// Direct encouragement request.
    pub fn encouragement(&self, request: &EncouragementRequest) -> Result<String, CoachError> {
        let events = self
            .events
            .for_invocation(format!("encourage-{}", uuid::Uuid::new_v4()));
        let missing = request.missing_fields();
        if !missing.is_empty() {
            return Err(CoachError::missing_fields(&missing));
        }

        let prompt = compose_encouragement(request);
        match self
            .coach
            .generate_text(prompt.system.as_deref(), &prompt.user, TEXT_TOKEN_CAP)
        {
            Ok(text) => {
                events.record(
                    "encouragement_generated",
                    event_payload(json!({
                        "prompt_version": PROMPT_TEMPLATE_VERSION,
                        "chars": text.chars().count(),
                    })),
                );
                Ok(text)
            }
            Err(err) => {
                events.record(
                    "encouragement_failed",
                    event_payload(json!({"error_kind": err.kind(), "error": err.to_string()})),
                );
                Err(err.into())
            }
        }
    }

    /// Direct space-analysis request.
    pub fn analyze_space(
        &self,
        request: &SpaceAnalysisRequest,
    ) -> Result<SpaceAnalysisOutcome, CoachError> {
        let events = self
            .events
            .for_invocation(format!("analysis-{}", uuid::Uuid::new_v4()));
        self.analyzer.run(
            request,
            self.documents.as_ref(),
            self.blobs.as_ref(),
            &events,
        )
    }
}
