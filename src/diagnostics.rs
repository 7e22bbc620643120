use crate::language::errors::{SyntaxError, SyntaxErrors};
use crate::language::lexer::LexError;
use crate::language::sem::SemanticError;
use miette::{Diagnostic, NamedSource, Report, SourceSpan};
use std::path::Path;
use thiserror::Error;

/// Pretty, source-annotated rendering for lexing and parsing errors.
#[derive(Debug, Error, Diagnostic)]
#[error("{message}")]
pub struct SyntaxDiagnostic {
    #[source_code]
    src: NamedSource,
    #[label("here")]
    span: SourceSpan,
    #[help]
    help: Option<String>,
    message: String,
}

impl SyntaxDiagnostic {
    pub fn from_error(src: NamedSource, err: SyntaxError) -> Self {
        Self {
            src,
            span: err.to_source_span(),
            help: err.help.clone(),
            message: err.message.clone(),
        }
    }
}

pub fn emit_syntax_errors(path: &str, source: &str, errors: &SyntaxErrors) {
    for err in &errors.errors {
        let src = NamedSource::new(path.to_string(), source.to_string());
        let diagnostic = SyntaxDiagnostic::from_error(src, err.clone());
        eprintln!("{:?}", Report::new(diagnostic));
    }
}

pub fn emit_lex_errors(path: &str, source: &str, errors: Vec<LexError>) {
    let errors = errors
        .into_iter()
        .map(|err| SyntaxError::new(err.message, err.span))
        .collect();
    emit_syntax_errors(path, source, &SyntaxErrors::new(errors));
}

/// Semantic and type errors are plain one-liners with a source position;
/// there can be many of them and they read best as a compact list.
pub fn report_semantic_errors(source: &str, errors: &[SemanticError]) {
    for err in errors {
        let (line, column) = err.span.line_col(source);
        eprintln!(
            "{} error: {} at {}:{}",
            err.phase.as_str(),
            err.message,
            line,
            column
        );
    }
}

pub fn report_io_error(path: &Path, error: &std::io::Error) {
    eprintln!("Failed to access {}: {}", path.display(), error);
}
