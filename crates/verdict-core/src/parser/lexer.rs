//! Lexer for the constraint expression language

use super::token::{Token, TokenKind};

/// Lexer for tokenizing a single constraint expression
pub struct Lexer {
    input: Vec<char>,
    position: usize,
    column: usize,
}

impl Lexer {
    /// Create a new lexer from an expression string
    pub fn new(input: &str) -> Self {
        Self {
            input: input.chars().collect(),
            position: 0,
            column: 1,
        }
    }

    /// Get the next token
    pub fn next_token(&mut self) -> Token {
        self.skip_whitespace();

        let start_column = self.column;

        if self.is_at_end() {
            return Token::new(TokenKind::Eof, String::new(), start_column);
        }

        let ch = self.current_char();

        if ch.is_ascii_digit() {
            return self.lex_number();
        }

        if ch.is_alphabetic() || ch == '_' {
            return self.lex_identifier();
        }

        self.lex_operator_or_punctuation()
    }

    /// Tokenize all input
    pub fn tokenize(&mut self) -> Vec<Token> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token();
            let is_eof = token.kind == TokenKind::Eof;
            tokens.push(token);
            if is_eof {
                break;
            }
        }
        tokens
    }

    fn current_char(&self) -> char {
        self.input[self.position]
    }

    fn peek_char(&self) -> Option<char> {
        if self.position + 1 < self.input.len() {
            Some(self.input[self.position + 1])
        } else {
            None
        }
    }

    fn is_at_end(&self) -> bool {
        self.position >= self.input.len()
    }

    fn advance(&mut self) -> char {
        let ch = self.current_char();
        self.position += 1;
        self.column += 1;
        ch
    }

    fn skip_whitespace(&mut self) {
        while !self.is_at_end() && self.current_char().is_whitespace() {
            self.advance();
        }
    }

    fn lex_number(&mut self) -> Token {
        let start_column = self.column;

        let mut number_str = String::new();
        let mut is_real = false;

        while !self.is_at_end() && self.current_char().is_ascii_digit() {
            number_str.push(self.advance());
        }

        // A decimal point only counts when followed by a digit
        if !self.is_at_end() && self.current_char() == '.' {
            if let Some(next_ch) = self.peek_char() {
                if next_ch.is_ascii_digit() {
                    is_real = true;
                    number_str.push(self.advance());

                    while !self.is_at_end() && self.current_char().is_ascii_digit() {
                        number_str.push(self.advance());
                    }
                }
            }
        }

        if is_real {
            match number_str.parse::<f64>() {
                Ok(r) => Token::new(TokenKind::RealLit(r), number_str, start_column),
                Err(_) => Token::new(
                    TokenKind::Error(format!("Invalid rational literal: {}", number_str)),
                    number_str,
                    start_column,
                ),
            }
        } else {
            match number_str.parse::<i64>() {
                Ok(n) => Token::new(TokenKind::IntLit(n), number_str, start_column),
                Err(_) => Token::new(
                    TokenKind::Error(format!("Invalid integer literal: {}", number_str)),
                    number_str,
                    start_column,
                ),
            }
        }
    }

    fn lex_identifier(&mut self) -> Token {
        let start_column = self.column;

        let mut ident = String::new();
        while !self.is_at_end() {
            let ch = self.current_char();
            if ch.is_alphanumeric() || ch == '_' {
                ident.push(self.advance());
            } else {
                break;
            }
        }

        let kind = match ident.as_str() {
            "True" => TokenKind::BoolLit(true),
            "False" => TokenKind::BoolLit(false),
            _ => TokenKind::Ident(ident.clone()),
        };

        Token::new(kind, ident, start_column)
    }

    fn lex_operator_or_punctuation(&mut self) -> Token {
        let start_column = self.column;

        let ch = self.advance();

        // Two-character comparison operators
        if !self.is_at_end() {
            let next_ch = self.current_char();
            let two_char = format!("{}{}", ch, next_ch);

            let kind = match two_char.as_str() {
                "==" => Some(TokenKind::Eq),
                "!=" => Some(TokenKind::Neq),
                "<=" => Some(TokenKind::LtEq),
                ">=" => Some(TokenKind::GtEq),
                _ => None,
            };

            if let Some(kind) = kind {
                self.advance();
                return Token::new(kind, two_char, start_column);
            }
        }

        let kind = match ch {
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '*' => TokenKind::Star,
            '/' => TokenKind::Slash,
            '<' => TokenKind::Lt,
            '>' => TokenKind::Gt,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            ',' => TokenKind::Comma,
            '=' => TokenKind::Error("single '=' is not an operator; use '=='".to_string()),
            _ => TokenKind::Error(format!("Unexpected character: {}", ch)),
        };

        Token::new(kind, ch.to_string(), start_column)
    }
}
