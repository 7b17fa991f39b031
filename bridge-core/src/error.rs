use thiserror::Error;

/// Errors the translator can raise. These never reach the backend and are
/// always surfaced (or converted) by the orchestrator; the translator
/// itself never panics.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TranslateError {
    #[error("max_tokens is required")]
    MissingMaxTokens,

    #[error("assistant tool_use '{id}' has an input that is not a JSON object")]
    ToolUseInputNotObject { id: String },

    #[error("tool_result block is missing tool_use_id")]
    ToolResultMissingId,

    #[error("tool schema is not a JSON object")]
    SchemaNotObject,

    #[error("tool schema is missing a name")]
    SchemaMissingName,
}

impl TranslateError {
    /// Stable machine-readable tag, matching the taxonomy in spec.md §7.
    pub fn tag(&self) -> &'static str {
        match self {
            TranslateError::MissingMaxTokens
            | TranslateError::ToolUseInputNotObject { .. }
            | TranslateError::ToolResultMissingId => "InvalidRequest",
            TranslateError::SchemaNotObject | TranslateError::SchemaMissingName => {
                "InvalidSchema"
            }
        }
    }
}
