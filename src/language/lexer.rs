use crate::language::{
    span::Span,
    token::{Token, TokenKind},
};

#[derive(Clone, Debug)]
pub struct LexError {
    pub message: String,
    pub span: Span,
}

pub fn lex(source: &str) -> Result<Vec<Token>, Vec<LexError>> {
    let lexer = Lexer::new(source);
    lexer.run()
}

struct Lexer<'a> {
    src: &'a str,
    chars: std::str::Chars<'a>,
    current: Option<char>,
    offset: usize,
    tokens: Vec<Token>,
    errors: Vec<LexError>,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        let mut chars = src.chars();
        let current = chars.next();
        Self {
            src,
            chars,
            current,
            offset: 0,
            tokens: Vec::new(),
            errors: Vec::new(),
        }
    }

    fn run(mut self) -> Result<Vec<Token>, Vec<LexError>> {
        while let Some(ch) = self.current {
            match ch {
                '/' if self.peek() == Some('/') => self.eat_line_comment(),
                '/' if self.peek() == Some('*') => self.eat_block_comment(),
                ch if ch.is_whitespace() => {
                    self.bump();
                }
                '#' => self.lex_include(),
                ch if ch.is_ascii_alphabetic() || ch == '_' => self.lex_identifier(),
                ch if ch.is_ascii_digit() => self.lex_number(),
                '"' => self.lex_string(),
                '\'' => self.lex_char(),
                _ => self.lex_symbol(),
            }
        }
        self.push_token(TokenKind::Eof, self.offset, self.offset);

        if self.errors.is_empty() {
            Ok(self.tokens)
        } else {
            Err(self.errors)
        }
    }

    fn bump(&mut self) -> Option<char> {
        if let Some(ch) = self.current {
            self.offset += ch.len_utf8();
        }
        self.current = self.chars.next();
        self.current
    }

    fn peek(&self) -> Option<char> {
        self.chars.clone().next()
    }

    fn push_token(&mut self, kind: TokenKind, start: usize, end: usize) {
        self.tokens.push(Token {
            kind,
            span: Span::new(start, end),
        });
    }

    fn error(&mut self, start: usize, end: usize, message: impl Into<String>) {
        self.errors.push(LexError {
            message: message.into(),
            span: Span::new(start, end),
        });
    }

    fn eat_line_comment(&mut self) {
        self.bump();
        self.bump();
        while let Some(ch) = self.current {
            if ch == '\n' {
                break;
            }
            self.bump();
        }
    }

    fn eat_block_comment(&mut self) {
        self.bump();
        self.bump();
        while let Some(ch) = self.current {
            if ch == '*' && self.peek() == Some('/') {
                self.bump();
                self.bump();
                return;
            }
            self.bump();
        }
        self.error(self.offset, self.offset, "Unterminated block comment");
    }

    fn lex_include(&mut self) {
        let start = self.offset;
        self.bump(); // '#'
        while let Some(ch) = self.current {
            if ch.is_ascii_alphabetic() {
                self.bump();
            } else {
                break;
            }
        }

        let end = self.offset;
        if &self.src[start..end] == "#include" {
            self.push_token(TokenKind::Include, start, end);
        } else {
            self.error(start, end, "Unknown preprocessor directive");
        }
    }

    fn lex_identifier(&mut self) {
        let start = self.offset;
        while let Some(ch) = self.current {
            if ch.is_ascii_alphanumeric() || ch == '_' {
                self.bump();
            } else {
                break;
            }
        }

        let end = self.offset;
        let slice = &self.src[start..end];
        let kind = match slice {
            "int" => TokenKind::Int,
            "char" => TokenKind::Char,
            "void" => TokenKind::Void,
            "struct" => TokenKind::Struct,
            "sizeof" => TokenKind::Sizeof,
            "if" => TokenKind::If,
            "else" => TokenKind::Else,
            "while" => TokenKind::While,
            "return" => TokenKind::Return,
            _ => TokenKind::Identifier(slice.to_string()),
        };
        self.push_token(kind, start, end);
    }

    fn lex_number(&mut self) {
        let start = self.offset;
        while let Some(ch) = self.current {
            if ch.is_ascii_digit() {
                self.bump();
            } else {
                break;
            }
        }

        let end = self.offset;
        let text = &self.src[start..end];
        match text.parse::<i32>() {
            Ok(value) => self.push_token(TokenKind::Integer(value), start, end),
            Err(_) => self.error(start, end, "Invalid integer literal"),
        }
    }

    fn escape(&mut self, delimiter: char) -> Option<char> {
        let escaped = match self.current {
            Some('t') => '\t',
            Some('b') => '\u{8}',
            Some('n') => '\n',
            Some('r') => '\r',
            Some('f') => '\u{c}',
            Some('0') => '\0',
            Some('\\') => '\\',
            Some('\'') => '\'',
            Some('"') => '"',
            Some(other) if other == delimiter => other,
            _ => return None,
        };
        self.bump();
        Some(escaped)
    }

    fn lex_string(&mut self) {
        let start = self.offset;
        self.bump();
        let mut value = String::new();
        while let Some(ch) = self.current {
            match ch {
                '"' => {
                    self.bump();
                    let end = self.offset;
                    self.push_token(TokenKind::String(value), start, end);
                    return;
                }
                '\n' => break,
                '\\' => {
                    self.bump();
                    match self.escape('"') {
                        Some(escaped) => value.push(escaped),
                        None => {
                            self.error(self.offset, self.offset, "Invalid escape in string literal");
                            self.bump();
                        }
                    }
                }
                _ => {
                    value.push(ch);
                    self.bump();
                }
            }
        }
        self.error(start, self.offset, "Unterminated string literal");
    }

    fn lex_char(&mut self) {
        let start = self.offset;
        self.bump(); // '
        let value = match self.current {
            Some('\\') => {
                self.bump();
                match self.escape('\'') {
                    Some(escaped) => escaped,
                    None => {
                        self.error(start, self.offset, "Invalid escape in character literal");
                        return;
                    }
                }
            }
            Some('\'') | None => {
                self.error(start, self.offset, "Empty character literal");
                self.bump();
                return;
            }
            Some(ch) => {
                self.bump();
                ch
            }
        };
        if self.current != Some('\'') {
            self.error(start, self.offset, "Unterminated character literal");
            return;
        }
        self.bump();
        let end = self.offset;
        self.push_token(TokenKind::Character(value), start, end);
    }

    fn lex_symbol(&mut self) {
        let start = self.offset;
        match self.current {
            Some('(') => self.single(TokenKind::LParen),
            Some(')') => self.single(TokenKind::RParen),
            Some('{') => self.single(TokenKind::LBrace),
            Some('}') => self.single(TokenKind::RBrace),
            Some('[') => self.single(TokenKind::LBracket),
            Some(']') => self.single(TokenKind::RBracket),
            Some(',') => self.single(TokenKind::Comma),
            Some('.') => self.single(TokenKind::Dot),
            Some(';') => self.single(TokenKind::Semi),
            Some('+') => self.single(TokenKind::Plus),
            Some('-') => self.single(TokenKind::Minus),
            Some('*') => self.single(TokenKind::Star),
            Some('/') => self.single(TokenKind::Slash),
            Some('%') => self.single(TokenKind::Percent),
            Some('&') => {
                self.bump();
                if self.current == Some('&') {
                    self.bump();
                    self.push_token(TokenKind::AmpersandAmpersand, start, self.offset);
                } else {
                    self.error(start, self.offset, "Expected '&&'");
                }
            }
            Some('|') => {
                self.bump();
                if self.current == Some('|') {
                    self.bump();
                    self.push_token(TokenKind::PipePipe, start, self.offset);
                } else {
                    self.error(start, self.offset, "Expected '||'");
                }
            }
            Some('!') => {
                self.bump();
                if self.current == Some('=') {
                    self.bump();
                    self.push_token(TokenKind::BangEq, start, self.offset);
                } else {
                    self.error(start, self.offset, "Expected '!='");
                }
            }
            Some('=') => {
                self.bump();
                if self.current == Some('=') {
                    self.bump();
                    self.push_token(TokenKind::EqEq, start, self.offset);
                } else {
                    self.push_token(TokenKind::Eq, start, self.offset);
                }
            }
            Some('<') => {
                self.bump();
                if self.current == Some('=') {
                    self.bump();
                    self.push_token(TokenKind::LtEq, start, self.offset);
                } else {
                    self.push_token(TokenKind::Lt, start, self.offset);
                }
            }
            Some('>') => {
                self.bump();
                if self.current == Some('=') {
                    self.bump();
                    self.push_token(TokenKind::GtEq, start, self.offset);
                } else {
                    self.push_token(TokenKind::Gt, start, self.offset);
                }
            }
            Some(ch) => {
                self.bump();
                self.error(start, self.offset, format!("Unexpected character '{}'", ch));
            }
            None => {}
        }
    }

    fn single(&mut self, kind: TokenKind) {
        let start = self.offset;
        self.bump();
        self.push_token(kind, start, self.offset);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        lex(source)
            .expect("lex")
            .into_iter()
            .map(|token| token.kind)
            .collect()
    }

    #[test]
    fn lexes_declaration() {
        assert_eq!(
            kinds("int x;"),
            vec![
                TokenKind::Int,
                TokenKind::Identifier("x".into()),
                TokenKind::Semi,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn lexes_two_char_operators() {
        assert_eq!(
            kinds("== != <= >= && ||"),
            vec![
                TokenKind::EqEq,
                TokenKind::BangEq,
                TokenKind::LtEq,
                TokenKind::GtEq,
                TokenKind::AmpersandAmpersand,
                TokenKind::PipePipe,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn lexes_literals_and_escapes() {
        assert_eq!(
            kinds("'a' '\\n' \"hi\\t\" 42"),
            vec![
                TokenKind::Character('a'),
                TokenKind::Character('\n'),
                TokenKind::String("hi\t".into()),
                TokenKind::Integer(42),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn lexes_include_and_skips_comments() {
        assert_eq!(
            kinds("#include \"minic-stdlib.h\"\n// line\n/* block */ int"),
            vec![
                TokenKind::Include,
                TokenKind::String("minic-stdlib.h".into()),
                TokenKind::Int,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn reports_unterminated_string() {
        let errors = lex("\"oops").expect_err("should fail");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("Unterminated"));
    }

    #[test]
    fn single_ampersand_is_an_error() {
        assert!(lex("a & b").is_err());
    }
}
