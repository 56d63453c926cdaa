pub mod analysis;
pub mod config;
pub mod engine;
pub mod error;
pub mod generation;
pub mod history;
pub mod image_edit;
pub mod media;
pub mod prompts;
pub mod store;

pub use analysis::{SpaceAnalysisOutcome, SpaceAnalyzer};
pub use config::CoachConfig;
pub use engine::{CoachEngine, CommentOutcome, SkipReason};
pub use error::{CoachError, GenerationError};
pub use generation::{AnthropicProvider, GenerationClient, TextProvider};
pub use history::{aggregate, AggregatedContext};
pub use image_edit::{ImageEditProvider, OpenAiEditProvider};
pub use prompts::{compose_prompt, ModePicker, ResponseMode, PROMPT_TEMPLATE_VERSION};
pub use store::{BlobStore, DocumentStore, LocalStore, MemoryStore};
