use crate::language::{ast::Program, span::Span};

mod names;
pub mod scope;
mod typecheck;

pub use names::resolve_names;
pub use typecheck::check_types;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Name,
    Type,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Name => "semantic",
            Phase::Type => "type",
        }
    }
}

#[derive(Clone, Debug)]
pub struct SemanticError {
    pub phase: Phase,
    pub message: String,
    pub span: Span,
}

impl SemanticError {
    pub fn new(phase: Phase, message: impl Into<String>, span: Span) -> Self {
        Self {
            phase,
            message: message.into(),
            span,
        }
    }
}

/// Runs name resolution then type checking, accumulating every diagnostic
/// from both passes. Resolution installs placeholder declarations for
/// unresolved names, so the checker can always run to completion.
pub fn analyse(program: &Program) -> Vec<SemanticError> {
    let mut errors = resolve_names(program);
    errors.extend(check_types(program));
    errors
}
