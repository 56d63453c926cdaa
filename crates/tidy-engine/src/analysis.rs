use serde_json::{json, Map, Value};
use tidy_contracts::analysis::{ActionStep, AnalysisResult};
use tidy_contracts::events::EventWriter;
use tidy_contracts::records::CoachSession;
use tidy_contracts::requests::SpaceAnalysisRequest;
use tidy_contracts::time::now_utc_iso;

use crate::config::ANALYSIS_TOKEN_CAP;
use crate::error::CoachError;
use crate::generation::{GenerationClient, ImageAttachment};
use crate::image_edit::{EditedImage, ImageEditProvider, ImageEditRequest};
use crate::media::{content_tag, edit_output_size, extension_for_mime, sniff_image, InlineImage};
use crate::store::{BlobStore, DocumentStore};

const EDIT_QUALITY: &str = "medium";

const SCENE_INSTRUCTION: &str = r#"You are a professional organizer looking at a photo of one space in someone's home.
Return JSON only. No markdown, no code fences, no commentary.

Schema:
{
  "space": "short name of the space, e.g. \"Home office desk\"",
  "visibleItems": ["every distinct visible object, one entry each"],
  "itemArrangements": ["for each visibleItems entry, in the same order: how that same object looks once neatened"],
  "trashItems": ["objects that are clearly garbage"],
  "misplacedItems": ["objects that belong in another room"],
  "itemCount": 0,
  "steps": [{"step": "one concrete action", "minutes": 0}],
  "totalMinutes": 0,
  "tip": "one habit that keeps this space tidy",
  "encouragement": "one warm, specific sentence"
}

Rules:
- visibleItems and itemArrangements must have the same length and order; each arrangement describes the same object, never a different one.
- Copy names into trashItems and misplacedItems exactly as written in visibleItems.
- Steps are small and physical; minutes are whole numbers.
- Never suggest buying anything."#;

/// Final result of a space analysis as returned to the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct SpaceAnalysisOutcome {
    pub analysis: AnalysisResult,
    pub after_image_url: Option<String>,
    pub session_id: Option<String>,
}

/// Uploaded photo, sniffed and decoded once.
struct SourcePhoto {
    image: InlineImage,
    bytes: Vec<u8>,
}

/// Photo -> structured analysis -> edited "after" photo -> persisted session.
///
/// Only the analysis stages are fatal. A failed or unconfigured image edit
/// yields no after image; failed persistence is logged and the analysis is
/// still returned.
pub struct SpaceAnalyzer {
    vision: GenerationClient,
    editor: Option<Box<dyn ImageEditProvider>>,
}

impl SpaceAnalyzer {
    pub fn new(vision: GenerationClient, editor: Option<Box<dyn ImageEditProvider>>) -> Self {
        Self { vision, editor }
    }

    pub fn run(
        &self,
        request: &SpaceAnalysisRequest,
        documents: &dyn DocumentStore,
        blobs: &dyn BlobStore,
        events: &EventWriter,
    ) -> Result<SpaceAnalysisOutcome, CoachError> {
        let missing = request.missing_fields();
        if !missing.is_empty() {
            return Err(CoachError::missing_fields(&missing));
        }
        let user_id = request.user_id.as_deref().unwrap_or_default().trim();
        let image = sniff_image(request.image_base64.as_deref().unwrap_or_default());
        let bytes = image.decode().map_err(|err| {
            CoachError::Validation(format!("imageBase64 is not valid base64: {err}"))
        })?;
        if bytes.is_empty() {
            return Err(CoachError::Validation("imageBase64 is empty".to_string()));
        }
        let source = SourcePhoto { image, bytes };
        events.record(
            "analysis_started",
            event_payload(json!({"user_id": user_id, "mime_type": source.image.mime_type})),
        );

        let analysis = match self.analyze_scene(&source.image, request.user_vision.as_deref()) {
            Ok(analysis) => analysis,
            Err(err) => {
                events.record(
                    "analysis_failed",
                    event_payload(json!({
                        "user_id": user_id,
                        "error_kind": err.kind(),
                        "error": err.to_string(),
                    })),
                );
                return Err(err);
            }
        };
        events.record(
            "analysis_completed",
            event_payload(json!({
                "user_id": user_id,
                "item_count": analysis.item_count,
                "total_minutes": analysis.total_minutes,
            })),
        );

        let edited = self.edit_space(&analysis, &source, events);
        let (after_image_url, session_id) = persist_session(
            user_id,
            &source,
            edited.as_ref(),
            &analysis,
            documents,
            blobs,
            events,
        );

        Ok(SpaceAnalysisOutcome {
            analysis,
            after_image_url,
            session_id,
        })
    }

    fn analyze_scene(
        &self,
        image: &InlineImage,
        user_vision: Option<&str>,
    ) -> Result<AnalysisResult, CoachError> {
        let instruction = scene_instruction(user_vision);
        let attachment = ImageAttachment {
            mime_type: image.mime_type.clone(),
            data: image.base64.clone(),
        };
        let text = self.vision.generate_with_image(
            None,
            &instruction,
            Some(attachment),
            ANALYSIS_TOKEN_CAP,
        )?;
        recover_analysis(&text)
    }

    fn edit_space(
        &self,
        analysis: &AnalysisResult,
        source: &SourcePhoto,
        events: &EventWriter,
    ) -> Option<EditedImage> {
        let Some(editor) = self.editor.as_ref() else {
            events.record(
                "image_edit_skipped",
                event_payload(json!({"reason": "no_api_key"})),
            );
            return None;
        };
        let request = ImageEditRequest {
            image: source.bytes.clone(),
            mime_type: source.image.mime_type.clone(),
            instruction: edit_instruction(analysis),
            size: edit_output_size(&source.bytes).to_string(),
            quality: EDIT_QUALITY.to_string(),
        };
        match editor.edit(&request) {
            Ok(edited) => Some(edited),
            Err(err) => {
                events.record(
                    "image_edit_failed",
                    event_payload(json!({
                        "provider": editor.name(),
                        "error_kind": err.kind(),
                        "error": err.to_string(),
                    })),
                );
                None
            }
        }
    }
}

pub fn scene_instruction(user_vision: Option<&str>) -> String {
    match user_vision.map(str::trim).filter(|vision| !vision.is_empty()) {
        Some(vision) => format!(
            "{SCENE_INSTRUCTION}\n\nThe user describes the home they want as: \"{vision}\". \
Let the tip and encouragement point toward that."
        ),
        None => SCENE_INSTRUCTION.to_string(),
    }
}

/// Parses model output into an [`AnalysisResult`]. The whole text is tried as
/// JSON first, then each balanced `{...}` span in order of its opening brace
/// until one parses as an object.
pub fn recover_analysis(text: &str) -> Result<AnalysisResult, CoachError> {
    let object = parse_object(text.trim())
        .or_else(|| {
            text.match_indices('{')
                .filter_map(|(start, _)| balanced_object_at(text, start))
                .filter_map(parse_object)
                .find(looks_like_analysis)
        })
        .ok_or_else(|| {
            CoachError::MalformedAnalysis("no JSON object in model output".to_string())
        })?;
    normalize_analysis(&object)
}

const ANALYSIS_KEYS: [&str; 5] = ["space", "visibleItems", "itemArrangements", "steps", "tip"];

/// Spans nested inside a cut-off response, such as a single step, are not
/// an analysis.
fn looks_like_analysis(object: &Map<String, Value>) -> bool {
    ANALYSIS_KEYS.iter().any(|key| object.contains_key(*key))
}

fn parse_object(candidate: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(candidate) {
        Ok(Value::Object(object)) => Some(object),
        _ => None,
    }
}

/// The first `{...}` span whose braces balance, ignoring braces inside JSON
/// strings.
pub fn first_balanced_object(text: &str) -> Option<&str> {
    balanced_object_at(text, text.find('{')?)
}

/// The balanced span opening at byte offset `start`, which must hold `{`.
fn balanced_object_at(text: &str, start: usize) -> Option<&str> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=start + offset]);
                }
            }
            _ => {}
        }
    }
    None
}

fn normalize_analysis(object: &Map<String, Value>) -> Result<AnalysisResult, CoachError> {
    let visible = raw_text_list(object.get("visibleItems"));
    let arrangements = raw_text_list(object.get("itemArrangements"));
    if visible.len() != arrangements.len() {
        return Err(CoachError::MalformedAnalysis(format!(
            "visibleItems has {} entries but itemArrangements has {}",
            visible.len(),
            arrangements.len()
        )));
    }
    let (visible_items, item_arrangements): (Vec<String>, Vec<String>) = visible
        .into_iter()
        .zip(arrangements)
        .filter(|(item, _)| !item.is_empty())
        .unzip();

    let steps: Vec<ActionStep> = object
        .get("steps")
        .and_then(Value::as_array)
        .map(|rows| rows.iter().filter_map(parse_step).collect())
        .unwrap_or_default();
    let step_minutes = steps
        .iter()
        .fold(0u32, |total, step| total.saturating_add(step.minutes));

    Ok(AnalysisResult {
        space: text_field(object, "space"),
        item_count: object
            .get("itemCount")
            .and_then(value_as_u32)
            .unwrap_or(visible_items.len() as u32),
        visible_items,
        item_arrangements,
        trash_items: clean_text_list(object.get("trashItems")),
        misplaced_items: clean_text_list(object.get("misplacedItems")),
        total_minutes: object
            .get("totalMinutes")
            .and_then(value_as_u32)
            .unwrap_or(step_minutes),
        steps,
        tip: text_field(object, "tip"),
        encouragement: text_field(object, "encouragement"),
    })
}

fn parse_step(value: &Value) -> Option<ActionStep> {
    match value {
        Value::String(text) => {
            let step = text.trim();
            (!step.is_empty()).then(|| ActionStep {
                step: step.to_string(),
                minutes: 0,
            })
        }
        Value::Object(obj) => {
            let step = ["step", "action", "title"]
                .iter()
                .find_map(|key| obj.get(*key).and_then(Value::as_str))
                .map(str::trim)
                .filter(|step| !step.is_empty())?;
            let minutes = ["minutes", "estimatedMinutes"]
                .iter()
                .find_map(|key| obj.get(*key).and_then(value_as_u32))
                .unwrap_or(0);
            Some(ActionStep {
                step: step.to_string(),
                minutes,
            })
        }
        _ => None,
    }
}

/// Keeps positions: non-string entries become empty strings.
fn raw_text_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|rows| {
            rows.iter()
                .map(|row| row.as_str().unwrap_or_default().trim().to_string())
                .collect()
        })
        .unwrap_or_default()
}

fn clean_text_list(value: Option<&Value>) -> Vec<String> {
    raw_text_list(value)
        .into_iter()
        .filter(|item| !item.is_empty())
        .collect()
}

fn text_field(object: &Map<String, Value>, key: &str) -> String {
    object
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .trim()
        .to_string()
}

fn value_as_u32(value: &Value) -> Option<u32> {
    match value {
        Value::Number(number) => number
            .as_u64()
            .or_else(|| {
                number
                    .as_f64()
                    .filter(|value| value.is_finite() && *value >= 0.0)
                    .map(|value| value.round() as u64)
            })
            .map(|value| value.min(u32::MAX as u64) as u32),
        Value::String(text) => text.trim().parse::<u32>().ok(),
        _ => None,
    }
}

/// Instruction for the image-edit provider: keep every object that is not
/// marked for removal, neaten it in place, remove only what is listed.
pub fn edit_instruction(analysis: &AnalysisResult) -> String {
    let space = if analysis.space.is_empty() {
        "room"
    } else {
        analysis.space.as_str()
    };
    let mut lines = vec![
        format!(
            "Edit this photo of a {space} so it looks like the same space a few minutes after its owner tidied it. \
This is a real lived-in home, not a showroom."
        ),
        String::new(),
        "KEEP every object that is not listed under REMOVE. Each kept object stays in the photo, neatened as described:".to_string(),
    ];
    let kept = analysis.kept_items();
    if kept.is_empty() {
        lines.push("- all remaining objects: straightened in place".to_string());
    }
    for (idx, (item, arrangement)) in kept.iter().enumerate() {
        lines.push(format!("{}. {item} -> {arrangement}", idx + 1));
    }

    lines.push(String::new());
    let removable = analysis.removable_items();
    if removable.is_empty() {
        lines.push("REMOVE: nothing. Every object stays.".to_string());
    } else {
        lines.push("REMOVE only these objects (trash or belongs in another room):".to_string());
        for item in removable {
            lines.push(format!("- {item}"));
        }
    }

    lines.push(String::new());
    lines.push("RULES:".to_string());
    lines.push("- Same camera angle, framing, lighting, walls, floor and furniture as the source photo.".to_string());
    lines.push("- Do not empty surfaces; kept objects remain clearly visible.".to_string());
    lines.push("- Do not add objects, decor, plants or storage products.".to_string());
    lines.push("- Do not restyle or stage the room; no showroom look.".to_string());
    lines.push("- Photorealistic, consistent with the original photo.".to_string());
    lines.join("\n")
}

fn persist_session(
    user_id: &str,
    source: &SourcePhoto,
    edited: Option<&EditedImage>,
    analysis: &AnalysisResult,
    documents: &dyn DocumentStore,
    blobs: &dyn BlobStore,
    events: &EventWriter,
) -> (Option<String>, Option<String>) {
    let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%S%3fZ").to_string();
    let folder = format!("coach-sessions/{}", path_segment(user_id));
    let report = |stage: &str, err: &anyhow::Error| {
        events.record(
            "session_persist_failed",
            event_payload(json!({"stage": stage, "error": format!("{err:#}")})),
        );
    };

    let before_path = format!(
        "{folder}/{stamp}-{}-before.{}",
        content_tag(&source.bytes),
        source.image.extension()
    );
    let before_image_url =
        match blobs.put_public(&before_path, &source.image.mime_type, &source.bytes) {
            Ok(url) => url,
            Err(err) => {
                // A session needs its before image, so nothing else is uploaded.
                report("before_image", &err);
                return (None, None);
            }
        };

    let after_url = edited.and_then(|edited| {
        let after_path = format!(
            "{folder}/{stamp}-{}-after.{}",
            content_tag(&edited.bytes),
            extension_for_mime(&edited.mime_type)
        );
        blobs
            .put_public(&after_path, &edited.mime_type, &edited.bytes)
            .map_err(|err| report("after_image", &err))
            .ok()
    });

    let session = CoachSession {
        id: uuid::Uuid::new_v4().to_string(),
        user_id: user_id.to_string(),
        before_image_url,
        after_image_url: after_url.clone(),
        analysis: analysis.clone(),
        created_at: now_utc_iso(),
    };
    match documents.create_session(&session) {
        Ok(()) => {
            events.record(
                "session_created",
                event_payload(json!({
                    "session_id": session.id,
                    "has_after_image": after_url.is_some(),
                })),
            );
            (after_url, Some(session.id))
        }
        Err(err) => {
            report("session", &err);
            (after_url, None)
        }
    }
}

fn path_segment(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
                ch
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "anonymous".to_string()
    } else {
        cleaned
    }
}

pub(crate) fn event_payload(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}
