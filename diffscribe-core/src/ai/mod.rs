// ai module - model-facing generation pipeline: prompt assembly, completion
// client, validation, deterministic repair and the orchestrating state machine

pub mod api;
pub mod branch;
pub mod generate;
pub mod prompts;
pub mod repair;
pub mod validation;

// re-export key public items for convenient access
pub use api::{ChatMessage, Completion, CompletionClient, CompletionRequest, FinishReason, OpenRouterClient};
pub use branch::branch_name_from_subject;
pub use generate::{body_allowed_for, parse_model_response, Generator, RepoContext};
pub use repair::{build_fallback, repair, repair_docs, truncate_subject_to_max};
pub use validation::{
    is_structural_error, validate_commit_message, validate_pr_message, CommitMessage,
    CommitPolicy, PrMessage, PrTemplate, ValidationResult,
};
