//! Error types for the component compiler

use std::path::PathBuf;
use thiserror::Error;

/// A syntax error reported by the template parser, before any document or
/// section context is attached.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("line {line}: {message}")]
pub struct SyntaxError {
    pub line: usize,
    pub message: String,
}

impl SyntaxError {
    pub fn new(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}

/// A tokenizer failure while scanning component markup.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("line {line}: {message}")]
pub struct MarkupError {
    pub line: usize,
    pub message: String,
}

impl MarkupError {
    pub fn new(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum CompilerError {
    #[error("IO error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed markup in {file}: {message}")]
    MalformedMarkup { file: String, message: String },

    #[error("Template syntax error in {file} ({section}) at line {line}: {message}")]
    TemplateSyntax {
        file: String,
        section: String,
        line: usize,
        message: String,
    },

    #[error("Cyclic dependency while compiling {document}: unresolved {}", .members.join(", "))]
    CyclicDependency { document: String, members: Vec<String> },

    #[error("Duplicate template name: {name}")]
    DuplicateName { name: String },

    #[error("Render error in {name}: {message}")]
    Render { name: String, message: String },

    #[error("Invalid format: {message}")]
    InvalidFormat { message: String },
}

pub type Result<T> = std::result::Result<T, CompilerError>;

impl CompilerError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn markup(file: impl Into<String>, error: MarkupError) -> Self {
        Self::MalformedMarkup {
            file: file.into(),
            message: error.to_string(),
        }
    }

    pub fn syntax(file: impl Into<String>, section: impl Into<String>, error: SyntaxError) -> Self {
        Self::TemplateSyntax {
            file: file.into(),
            section: section.into(),
            line: error.line,
            message: error.message,
        }
    }

    pub fn render(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Render {
            name: name.into(),
            message: message.into(),
        }
    }
}
