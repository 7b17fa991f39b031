use serde::{Deserialize, Serialize};

/// A fixed-shape record of every translation decision a backend can tune.
/// Every flag has a default; unspecified flags take it. Preferred over a
/// dynamic key-value bag per spec.md §9: a fixed record eliminates the
/// "did the caller check this flag?" class of bug.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Capabilities {
    pub supports_images: bool,
    pub supports_tools: bool,
    pub simplify_schemas: bool,
    pub strict_additional_properties: bool,
    pub drop_top_k: bool,
    pub stop_word_max: Option<usize>,
    pub keepalive_interval_ms: u64,
    pub inactivity_timeout_ms: u64,
    pub terminal_timeout_ms: u64,
    pub normalize_system_whitespace: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            supports_images: true,
            supports_tools: true,
            simplify_schemas: false,
            strict_additional_properties: false,
            drop_top_k: false,
            stop_word_max: None,
            keepalive_interval_ms: 10_000,
            inactivity_timeout_ms: 30_000,
            terminal_timeout_ms: 60_000,
            normalize_system_whitespace: false,
        }
    }
}
