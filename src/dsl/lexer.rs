//! Lexer (tokenizer) for the system definition language.

use crate::error::{AquasolveError, Result};

/// A token produced by the lexer.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    /// The kind of token
    pub kind: TokenKind,
    /// The token's text
    pub text: String,
    /// Line number (1-indexed)
    pub line: usize,
    /// Column number (1-indexed)
    pub column: usize,
}

/// Token types in the input language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// An identifier (cell name, function name)
    Identifier,
    /// A number (integer, decimal or scientific notation)
    Number,
    /// A directive (starts with '.')
    Directive,
    /// `+`
    Plus,
    /// `-`
    Minus,
    /// `*`
    Star,
    /// `/`
    Slash,
    /// `^`
    Caret,
    /// `<`
    Lt,
    /// `>`
    Gt,
    /// `<=`
    Le,
    /// `>=`
    Ge,
    /// `==`
    EqEq,
    /// `!=`
    NotEq,
    /// `&&`
    AndAnd,
    /// `||`
    OrOr,
    /// `!`
    Bang,
    /// `=`
    Equals,
    /// `(`
    OpenParen,
    /// `)`
    CloseParen,
    /// `,`
    Comma,
    /// Newline
    Newline,
    /// End of file
    Eof,
}

/// Lexer for tokenizing system definition input.
pub struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
    line: usize,
    column: usize,
}

impl<'a> Lexer<'a> {
    /// Create a new lexer for the given input.
    pub fn new(input: &'a str) -> Self {
        Self {
            chars: input.char_indices().peekable(),
            line: 1,
            column: 1,
        }
    }

    /// Get the next token.
    pub fn next_token(&mut self) -> Result<Token> {
        self.skip_whitespace_and_comments();

        let ch = match self.chars.peek().copied() {
            Some((_, ch)) => ch,
            None => {
                return Ok(Token {
                    kind: TokenKind::Eof,
                    text: String::new(),
                    line: self.line,
                    column: self.column,
                });
            }
        };

        let start_line = self.line;
        let start_column = self.column;

        let (kind, text) = match ch {
            '\n' => {
                self.advance();
                (TokenKind::Newline, "\n".to_string())
            }
            '.' => {
                self.advance();
                let name = self.read_identifier();
                if name.is_empty() {
                    return Err(AquasolveError::lexer(
                        start_line,
                        start_column,
                        "expected directive name after '.'",
                    ));
                }
                (TokenKind::Directive, format!(".{}", name))
            }
            '0'..='9' => (TokenKind::Number, self.read_number()),
            '(' => self.single(TokenKind::OpenParen, "("),
            ')' => self.single(TokenKind::CloseParen, ")"),
            ',' => self.single(TokenKind::Comma, ","),
            '+' => self.single(TokenKind::Plus, "+"),
            '-' => self.single(TokenKind::Minus, "-"),
            '*' => self.single(TokenKind::Star, "*"),
            '/' => self.single(TokenKind::Slash, "/"),
            '^' => self.single(TokenKind::Caret, "^"),
            '<' => {
                self.advance();
                if self.eat('=') {
                    (TokenKind::Le, "<=".to_string())
                } else {
                    (TokenKind::Lt, "<".to_string())
                }
            }
            '>' => {
                self.advance();
                if self.eat('=') {
                    (TokenKind::Ge, ">=".to_string())
                } else {
                    (TokenKind::Gt, ">".to_string())
                }
            }
            '=' => {
                self.advance();
                if self.eat('=') {
                    (TokenKind::EqEq, "==".to_string())
                } else {
                    (TokenKind::Equals, "=".to_string())
                }
            }
            '!' => {
                self.advance();
                if self.eat('=') {
                    (TokenKind::NotEq, "!=".to_string())
                } else {
                    (TokenKind::Bang, "!".to_string())
                }
            }
            '&' => {
                self.advance();
                if self.eat('&') {
                    (TokenKind::AndAnd, "&&".to_string())
                } else {
                    return Err(AquasolveError::lexer(
                        start_line,
                        start_column,
                        "expected '&&'",
                    ));
                }
            }
            '|' => {
                self.advance();
                if self.eat('|') {
                    (TokenKind::OrOr, "||".to_string())
                } else {
                    return Err(AquasolveError::lexer(
                        start_line,
                        start_column,
                        "expected '||'",
                    ));
                }
            }
            _ if ch.is_alphabetic() || ch == '_' => {
                (TokenKind::Identifier, self.read_identifier())
            }
            _ => {
                return Err(AquasolveError::lexer(
                    start_line,
                    start_column,
                    format!("unexpected character '{}'", ch),
                ));
            }
        };

        Ok(Token {
            kind,
            text,
            line: start_line,
            column: start_column,
        })
    }

    fn single(&mut self, kind: TokenKind, text: &str) -> (TokenKind, String) {
        self.advance();
        (kind, text.to_string())
    }

    fn advance(&mut self) -> Option<char> {
        if let Some((_, ch)) = self.chars.next() {
            if ch == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
            Some(ch)
        } else {
            None
        }
    }

    /// Consume the next character if it matches.
    fn eat(&mut self, expected: char) -> bool {
        if let Some(&(_, ch)) = self.chars.peek() {
            if ch == expected {
                self.advance();
                return true;
            }
        }
        false
    }

    fn skip_whitespace_and_comments(&mut self) {
        while let Some(&(_, ch)) = self.chars.peek() {
            if ch == ' ' || ch == '\t' || ch == '\r' {
                self.advance();
            } else if ch == '#' || ch == ';' {
                // Skip comment until end of line
                while let Some(&(_, c)) = self.chars.peek() {
                    if c == '\n' {
                        break;
                    }
                    self.advance();
                }
            } else {
                break;
            }
        }
    }

    fn read_identifier(&mut self) -> String {
        let mut text = String::new();
        while let Some(&(_, ch)) = self.chars.peek() {
            if ch.is_alphanumeric() || ch == '_' {
                text.push(ch);
                self.advance();
            } else {
                break;
            }
        }
        text
    }

    fn read_number(&mut self) -> String {
        let mut text = String::new();

        // Integer part
        while let Some(&(_, ch)) = self.chars.peek() {
            if ch.is_ascii_digit() {
                text.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        // Decimal part
        if let Some(&(_, '.')) = self.chars.peek() {
            text.push('.');
            self.advance();
            while let Some(&(_, ch)) = self.chars.peek() {
                if ch.is_ascii_digit() {
                    text.push(ch);
                    self.advance();
                } else {
                    break;
                }
            }
        }

        // Exponent part. An 'e'/'E' only belongs to the number when a digit
        // (optionally behind a sign) follows; otherwise `2e` lexes as the
        // number `2` and the identifier `e`.
        if let Some(&(_, ch)) = self.chars.peek() {
            if ch == 'e' || ch == 'E' {
                let mut look = self.chars.clone();
                look.next();
                let is_exponent = match look.next() {
                    Some((_, d)) if d.is_ascii_digit() => true,
                    Some((_, '+')) | Some((_, '-')) => {
                        matches!(look.next(), Some((_, d)) if d.is_ascii_digit())
                    }
                    _ => false,
                };
                if is_exponent {
                    text.push(ch);
                    self.advance();
                    if let Some(&(_, sign)) = self.chars.peek() {
                        if sign == '-' || sign == '+' {
                            text.push(sign);
                            self.advance();
                        }
                    }
                    while let Some(&(_, d)) = self.chars.peek() {
                        if d.is_ascii_digit() {
                            text.push(d);
                            self.advance();
                        } else {
                            break;
                        }
                    }
                }
            }
        }

        text
    }
}

/// Parse a numeric token's text.
pub fn parse_value(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        let mut lexer = Lexer::new(input);
        let mut out = Vec::new();
        loop {
            let tok = lexer.next_token().unwrap();
            let eof = tok.kind == TokenKind::Eof;
            out.push(tok.kind);
            if eof {
                break;
            }
        }
        out
    }

    #[test]
    fn test_lexer_basic() {
        let input = "pH 7.5";
        let mut lexer = Lexer::new(input);

        let tok = lexer.next_token().unwrap();
        assert_eq!(tok.kind, TokenKind::Identifier);
        assert_eq!(tok.text, "pH");

        let tok = lexer.next_token().unwrap();
        assert_eq!(tok.kind, TokenKind::Number);
        assert_eq!(tok.text, "7.5");
    }

    #[test]
    fn test_lexer_directive() {
        let input = ".var tolerance 1e-10";
        let mut lexer = Lexer::new(input);

        let tok = lexer.next_token().unwrap();
        assert_eq!(tok.kind, TokenKind::Directive);
        assert_eq!(tok.text, ".var");
    }

    #[test]
    fn test_scientific_notation() {
        for (input, expected) in [("1e-5", 1e-5), ("2.5E+3", 2.5e3), ("3e2", 300.0)] {
            let mut lexer = Lexer::new(input);
            let tok = lexer.next_token().unwrap();
            assert_eq!(tok.kind, TokenKind::Number, "input {}", input);
            assert_eq!(parse_value(&tok.text), Some(expected));
        }
    }

    #[test]
    fn test_exponent_needs_digits() {
        // `2e` is the number 2 followed by the identifier e
        let mut lexer = Lexer::new("2e");
        assert_eq!(lexer.next_token().unwrap().kind, TokenKind::Number);
        assert_eq!(lexer.next_token().unwrap().kind, TokenKind::Identifier);

        // `1e-x` is 1, identifier e, minus, identifier x
        assert_eq!(
            kinds("1e-x"),
            vec![
                TokenKind::Number,
                TokenKind::Identifier,
                TokenKind::Minus,
                TokenKind::Identifier,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            kinds("a <= b == c && d || !e"),
            vec![
                TokenKind::Identifier,
                TokenKind::Le,
                TokenKind::Identifier,
                TokenKind::EqEq,
                TokenKind::Identifier,
                TokenKind::AndAnd,
                TokenKind::Identifier,
                TokenKind::OrOr,
                TokenKind::Bang,
                TokenKind::Identifier,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_comments_skipped() {
        assert_eq!(
            kinds("x # trailing comment\n; full-line comment\ny"),
            vec![
                TokenKind::Identifier,
                TokenKind::Newline,
                TokenKind::Newline,
                TokenKind::Identifier,
                TokenKind::Eof
            ]
        );
    }
}
