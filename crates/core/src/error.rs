#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Caller bug: unknown template, missing required binding, or an
    /// invalid template definition. Fatal, never retried.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A template definition is structurally invalid (e.g. declares
    /// both wire shapes, or neither). Raised at load time.
    #[error("Validation failed: {0}")]
    Validation(String),
}
