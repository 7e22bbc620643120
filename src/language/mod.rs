pub mod ast;
pub mod errors;
pub mod gen;
pub mod lexer;
pub mod parser;
pub mod printer;
pub mod sem;
pub mod span;
pub mod token;

#[cfg(test)]
mod tests;
