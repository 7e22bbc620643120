use crate::language::span::Span;

#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TokenKind {
    Identifier(String),
    Integer(i32),
    Character(char),
    String(String),

    Include,

    Int,
    Char,
    Void,
    Struct,
    Sizeof,
    If,
    Else,
    While,
    Return,

    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    AmpersandAmpersand,
    PipePipe,
    Eq,
    EqEq,
    BangEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Dot,
    Comma,
    Semi,

    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,

    Eof,
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            TokenKind::Identifier(name) => return write!(f, "identifier '{}'", name),
            TokenKind::Integer(value) => return write!(f, "integer literal {}", value),
            TokenKind::Character(value) => return write!(f, "character literal {:?}", value),
            TokenKind::String(value) => return write!(f, "string literal {:?}", value),
            TokenKind::Include => "'#include'",
            TokenKind::Int => "'int'",
            TokenKind::Char => "'char'",
            TokenKind::Void => "'void'",
            TokenKind::Struct => "'struct'",
            TokenKind::Sizeof => "'sizeof'",
            TokenKind::If => "'if'",
            TokenKind::Else => "'else'",
            TokenKind::While => "'while'",
            TokenKind::Return => "'return'",
            TokenKind::Plus => "'+'",
            TokenKind::Minus => "'-'",
            TokenKind::Star => "'*'",
            TokenKind::Slash => "'/'",
            TokenKind::Percent => "'%'",
            TokenKind::AmpersandAmpersand => "'&&'",
            TokenKind::PipePipe => "'||'",
            TokenKind::Eq => "'='",
            TokenKind::EqEq => "'=='",
            TokenKind::BangEq => "'!='",
            TokenKind::Lt => "'<'",
            TokenKind::LtEq => "'<='",
            TokenKind::Gt => "'>'",
            TokenKind::GtEq => "'>='",
            TokenKind::Dot => "'.'",
            TokenKind::Comma => "','",
            TokenKind::Semi => "';'",
            TokenKind::LParen => "'('",
            TokenKind::RParen => "')'",
            TokenKind::LBrace => "'{'",
            TokenKind::RBrace => "'}'",
            TokenKind::LBracket => "'['",
            TokenKind::RBracket => "']'",
            TokenKind::Eof => "end of file",
        };
        f.write_str(text)
    }
}
