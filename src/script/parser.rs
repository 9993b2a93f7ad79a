//! Line-oriented script module format
//!
//! ```text
//! # comment
//! import "./util"
//! import greeting from "./lang"
//! export answer = 42
//! export greeting from "./lang"
//! print hello
//! print $answer
//! fail something went wrong
//! ```

use crate::script::error::ScriptError;
use serde_json::Value;
use std::collections::HashSet;

/// One statement of a script module, in source order.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// `import "<spec>"` or `import <name> from "<spec>"`.
    Import { spec: String, binding: Option<String> },
    /// `export <name> = <json literal>`.
    Export { name: String, value: Value },
    /// `export <name> from "<spec>"`.
    ReExport { name: String, spec: String },
    Print(PrintArg),
    Fail(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum PrintArg {
    Text(String),
    Binding(String),
}

/// Parsed script module.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptModule {
    statements: Vec<Statement>,
    requested: Vec<String>,
    exports: Vec<String>,
}

impl ScriptModule {
    pub fn parse(source: &str) -> Result<Self, ScriptError> {
        let mut statements = Vec::new();
        let mut requested = Vec::new();
        let mut seen_requests = HashSet::new();
        let mut exports = Vec::new();
        let mut seen_exports = HashSet::new();

        for (index, raw) in source.lines().enumerate() {
            let line = index + 1;
            let text = raw.trim();
            if text.is_empty() || text.starts_with('#') {
                continue;
            }

            let statement = parse_statement(line, text)?;
            match &statement {
                Statement::Import { spec, .. } | Statement::ReExport { spec, .. } => {
                    if seen_requests.insert(spec.clone()) {
                        requested.push(spec.clone());
                    }
                }
                _ => {}
            }
            match &statement {
                Statement::Export { name, .. } | Statement::ReExport { name, .. } => {
                    if !seen_exports.insert(name.clone()) {
                        return Err(ScriptError::DuplicateExport {
                            line,
                            name: name.clone(),
                        });
                    }
                    exports.push(name.clone());
                }
                _ => {}
            }
            statements.push(statement);
        }

        Ok(Self {
            statements,
            requested,
            exports,
        })
    }

    pub fn statements(&self) -> &[Statement] {
        &self.statements
    }

    /// Requested specifiers in first-occurrence order, without duplicates.
    pub fn requested_modules(&self) -> &[String] {
        &self.requested
    }

    /// Declared export names, local and re-exported.
    pub fn exports(&self) -> &[String] {
        &self.exports
    }

    pub fn declares_export(&self, name: &str) -> bool {
        self.exports.iter().any(|export| export == name)
    }

    /// Local names bound by `import <name> from` statements.
    pub fn import_bindings(&self) -> impl Iterator<Item = (&str, &str)> {
        self.statements.iter().filter_map(|statement| match statement {
            Statement::Import {
                spec,
                binding: Some(name),
            } => Some((name.as_str(), spec.as_str())),
            _ => None,
        })
    }

    /// Re-exported names and the specifier they come from.
    pub fn re_exports(&self) -> impl Iterator<Item = (&str, &str)> {
        self.statements.iter().filter_map(|statement| match statement {
            Statement::ReExport { name, spec } => Some((name.as_str(), spec.as_str())),
            _ => None,
        })
    }
}

fn parse_statement(line: usize, text: &str) -> Result<Statement, ScriptError> {
    let (keyword, rest) = match text.split_once(char::is_whitespace) {
        Some((keyword, rest)) => (keyword, rest.trim()),
        None => (text, ""),
    };

    match keyword {
        "import" => parse_import(line, rest),
        "export" => parse_export(line, rest),
        "print" => {
            if let Some(name) = rest.strip_prefix('$') {
                let name = identifier(line, name)?;
                Ok(Statement::Print(PrintArg::Binding(name)))
            } else {
                Ok(Statement::Print(PrintArg::Text(rest.to_string())))
            }
        }
        "fail" => Ok(Statement::Fail(rest.to_string())),
        _ => Err(ScriptError::UnknownStatement {
            line,
            text: text.to_string(),
        }),
    }
}

fn parse_import(line: usize, rest: &str) -> Result<Statement, ScriptError> {
    if rest.starts_with('"') {
        return Ok(Statement::Import {
            spec: quoted(line, rest)?,
            binding: None,
        });
    }

    let (name, spec) = rest.split_once(" from ").ok_or_else(|| ScriptError::Syntax {
        line,
        message: "expected 'import \"<spec>\"' or 'import <name> from \"<spec>\"'".to_string(),
    })?;
    Ok(Statement::Import {
        spec: quoted(line, spec.trim())?,
        binding: Some(identifier(line, name.trim())?),
    })
}

fn parse_export(line: usize, rest: &str) -> Result<Statement, ScriptError> {
    // The form is decided by what follows the name, never by separators
    // inside the value or specifier.
    let rest = rest.trim();
    let name_end = rest
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(rest.len());
    let (name, tail) = rest.split_at(name_end);
    let tail = tail.trim_start();

    if let Some(literal) = tail.strip_prefix('=') {
        let name = identifier(line, name)?;
        let value = serde_json::from_str(literal.trim()).map_err(|e| {
            ScriptError::InvalidLiteral {
                line,
                name: name.clone(),
                reason: e.to_string(),
            }
        })?;
        return Ok(Statement::Export { name, value });
    }

    if let Some(spec) = tail.strip_prefix("from ") {
        return Ok(Statement::ReExport {
            name: identifier(line, name)?,
            spec: quoted(line, spec.trim())?,
        });
    }

    Err(ScriptError::Syntax {
        line,
        message: "expected 'export <name> = <value>' or 'export <name> from \"<spec>\"'"
            .to_string(),
    })
}

fn quoted(line: usize, text: &str) -> Result<String, ScriptError> {
    let inner = text
        .strip_prefix('"')
        .and_then(|text| text.strip_suffix('"'))
        .filter(|inner| !inner.is_empty() && !inner.contains('"'))
        .ok_or_else(|| ScriptError::Syntax {
            line,
            message: format!("expected a quoted module specifier, found '{text}'"),
        })?;
    Ok(inner.to_string())
}

fn identifier(line: usize, text: &str) -> Result<String, ScriptError> {
    let mut chars = text.chars();
    let valid = match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };

    if valid {
        Ok(text.to_string())
    } else {
        Err(ScriptError::Syntax {
            line,
            message: format!("invalid identifier '{text}'"),
        })
    }
}
