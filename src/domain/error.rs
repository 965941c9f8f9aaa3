//! Domain error types.

/// A parse error with position information for rule text parsing.
#[derive(Debug, Clone, thiserror::Error)]
#[error("parse error at position {position}: {message}")]
pub struct ParseError {
    pub message: String,
    pub position: usize,
}

impl ParseError {
    /// Format the error with a caret pointing at the error position in the input.
    pub fn display_with_context(&self, input: &str) -> String {
        let caret = " ".repeat(self.position) + "^";
        format!(
            "{input}\n{caret}\n{err}",
            input = input,
            caret = caret,
            err = self
        )
    }
}

/// Top-level error type for stratflow.
#[derive(Debug, thiserror::Error)]
pub enum StratflowError {
    #[error("no {what} with id '{id}'")]
    NotFound { what: &'static str, id: String },

    #[error("edge endpoint '{id}' does not exist")]
    UnknownNode { id: String },

    #[error("malformed graph: {reason}")]
    MalformedGraph { reason: String },

    #[error("invalid attribute '{key}' on {kind} node: {reason}")]
    InvalidAttribute {
        kind: String,
        key: String,
        reason: String,
    },

    #[error("symbol {symbol} is already loaded")]
    DuplicateSymbol { symbol: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error(transparent)]
    RuleParse(#[from] ParseError),

    #[error("nothing to compile: {reason}")]
    NothingCompiled { reason: String },

    #[error("data error: {reason}")]
    Data { reason: String },

    #[error("no data for {symbol}")]
    NoData { symbol: String },

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl StratflowError {
    pub fn node_not_found(id: impl Into<String>) -> Self {
        StratflowError::NotFound {
            what: "node",
            id: id.into(),
        }
    }

    pub fn edge_not_found(id: impl Into<String>) -> Self {
        StratflowError::NotFound {
            what: "edge",
            id: id.into(),
        }
    }
}

impl From<&StratflowError> for std::process::ExitCode {
    fn from(err: &StratflowError) -> Self {
        let code: u8 = match err {
            StratflowError::Io(_) | StratflowError::Json(_) => 1,
            StratflowError::ConfigParse { .. }
            | StratflowError::ConfigMissing { .. }
            | StratflowError::ConfigInvalid { .. } => 2,
            StratflowError::Data { .. }
            | StratflowError::NoData { .. }
            | StratflowError::DuplicateSymbol { .. } => 3,
            StratflowError::NotFound { .. }
            | StratflowError::UnknownNode { .. }
            | StratflowError::MalformedGraph { .. }
            | StratflowError::InvalidAttribute { .. }
            | StratflowError::RuleParse(_) => 4,
            StratflowError::NothingCompiled { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}
