use thiserror::Error;

/// Errors produced while parsing the script module format
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScriptError {
    #[error("line {line}: unknown statement '{text}'")]
    UnknownStatement { line: usize, text: String },

    #[error("line {line}: {message}")]
    Syntax { line: usize, message: String },

    #[error("line {line}: invalid literal for export '{name}': {reason}")]
    InvalidLiteral {
        line: usize,
        name: String,
        reason: String,
    },

    #[error("line {line}: export '{name}' is declared more than once")]
    DuplicateExport { line: usize, name: String },

    #[error("Invalid module specifier '{spec}': {reason}")]
    InvalidSpecifier { spec: String, reason: String },
}
