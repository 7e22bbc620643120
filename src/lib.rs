pub mod diagnostics;
pub mod language;
