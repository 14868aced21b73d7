use super::token::{SourceLoc, Token, TokenWithLoc};
use crate::error::Diagnostic;

pub struct Lexer<'a> {
    input: &'a str,
    bytes: &'a [u8],
    pos: usize,
    line: usize,
    col: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Lexer {
            input,
            bytes: input.as_bytes(),
            pos: 0,
            line: 1,
            col: 1,
        }
    }

    fn get_loc(&self) -> SourceLoc {
        SourceLoc::new(self.line, self.col)
    }

    fn current(&self) -> Option<char> {
        if self.pos >= self.bytes.len() {
            return None;
        }
        let byte = self.bytes[self.pos];
        if byte < 128 {
            Some(byte as char)
        } else {
            self.input[self.pos..].chars().next()
        }
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.current();
        if let Some(ch) = c {
            if ch == '\n' {
                self.line += 1;
                self.col = 1;
            } else {
                self.col += 1;
            }
            self.pos += ch.len_utf8();
        }
        c
    }

    fn peek(&self, offset: usize) -> Option<char> {
        let byte_pos = self.pos + offset;
        if byte_pos >= self.bytes.len() {
            return None;
        }
        let byte = self.bytes[byte_pos];
        if byte < 128 {
            Some(byte as char)
        } else {
            self.input[byte_pos..].chars().next()
        }
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.current() {
            if c.is_whitespace() {
                self.advance();
            } else if c == '/' && self.peek(1) == Some('/') {
                // Line comment
                while let Some(c) = self.advance() {
                    if c == '\n' {
                        break;
                    }
                }
            } else {
                break;
            }
        }
    }

    fn read_string(&mut self, loc: SourceLoc) -> Result<Token, Diagnostic> {
        self.advance(); // skip opening quote
        let mut s = String::new();
        loop {
            match self.current() {
                None => return Err(Diagnostic::at("unterminated string literal", loc)),
                Some('"') => {
                    self.advance();
                    return Ok(Token::Str(s));
                }
                Some('\\') => {
                    self.advance();
                    match self.current() {
                        Some('n') => s.push('\n'),
                        Some('t') => s.push('\t'),
                        Some('r') => s.push('\r'),
                        Some('\\') => s.push('\\'),
                        Some('"') => s.push('"'),
                        Some(c) => s.push(c),
                        None => {
                            return Err(Diagnostic::at("unterminated string escape", loc));
                        }
                    }
                    self.advance();
                }
                Some(c) => {
                    s.push(c);
                    self.advance();
                }
            }
        }
    }

    fn read_number(&mut self, loc: SourceLoc) -> Result<Token, Diagnostic> {
        let start = self.pos;
        let mut has_dot = false;

        while let Some(c) = self.current() {
            if c.is_ascii_digit() {
                self.advance();
            } else if c == '.' && !has_dot && self.peek(1).is_some_and(|d| d.is_ascii_digit()) {
                has_dot = true;
                self.advance();
            } else {
                break;
            }
        }

        let text = &self.input[start..self.pos];
        if has_dot {
            text.parse::<f64>()
                .map(Token::Float)
                .map_err(|_| Diagnostic::at(format!("invalid float literal '{}'", text), loc))
        } else {
            text.parse::<i64>()
                .map(Token::Int)
                .map_err(|_| Diagnostic::at(format!("invalid integer literal '{}'", text), loc))
        }
    }

    fn read_ident(&mut self) -> Token {
        let start = self.pos;
        while let Some(c) = self.current() {
            if c.is_alphanumeric() || c == '_' {
                self.advance();
            } else {
                break;
            }
        }

        match &self.input[start..self.pos] {
            "true" => Token::True,
            "false" => Token::False,
            "nil" => Token::Nil,
            "let" => Token::Let,
            "fn" => Token::Fn,
            "if" => Token::If,
            "else" => Token::Else,
            "while" => Token::While,
            "return" => Token::Return,
            "throw" => Token::Throw,
            ident => Token::Ident(ident.to_string()),
        }
    }

    /// Read the next token, or `None` at end of input.
    pub fn next_token(&mut self) -> Result<Option<TokenWithLoc>, Diagnostic> {
        self.skip_whitespace();

        let loc = self.get_loc();
        let Some(c) = self.current() else {
            return Ok(None);
        };

        let token = match c {
            '(' => {
                self.advance();
                Token::LeftParen
            }
            ')' => {
                self.advance();
                Token::RightParen
            }
            '{' => {
                self.advance();
                Token::LeftBrace
            }
            '}' => {
                self.advance();
                Token::RightBrace
            }
            ',' => {
                self.advance();
                Token::Comma
            }
            ';' => {
                self.advance();
                Token::Semicolon
            }
            '+' => {
                self.advance();
                Token::Plus
            }
            '-' => {
                self.advance();
                Token::Minus
            }
            '*' => {
                self.advance();
                Token::Star
            }
            '/' => {
                self.advance();
                Token::Slash
            }
            '%' => {
                self.advance();
                Token::Percent
            }
            '!' => {
                self.advance();
                if self.current() == Some('=') {
                    self.advance();
                    Token::BangEqual
                } else {
                    Token::Bang
                }
            }
            '=' => {
                self.advance();
                if self.current() == Some('=') {
                    self.advance();
                    Token::EqualEqual
                } else {
                    Token::Equal
                }
            }
            '<' => {
                self.advance();
                if self.current() == Some('=') {
                    self.advance();
                    Token::LessEqual
                } else {
                    Token::Less
                }
            }
            '>' => {
                self.advance();
                if self.current() == Some('=') {
                    self.advance();
                    Token::GreaterEqual
                } else {
                    Token::Greater
                }
            }
            '&' => {
                self.advance();
                if self.current() == Some('&') {
                    self.advance();
                    Token::AndAnd
                } else {
                    return Err(Diagnostic::at("unexpected character '&'", loc));
                }
            }
            '|' => {
                self.advance();
                if self.current() == Some('|') {
                    self.advance();
                    Token::OrOr
                } else {
                    return Err(Diagnostic::at("unexpected character '|'", loc));
                }
            }
            '"' => self.read_string(loc)?,
            c if c.is_ascii_digit() => self.read_number(loc)?,
            c if c.is_alphabetic() || c == '_' => self.read_ident(),
            c => {
                return Err(Diagnostic::at(format!("unexpected character '{}'", c), loc));
            }
        };

        Ok(Some(TokenWithLoc { token, loc }))
    }

    /// Tokenize the full input.
    pub fn tokenize(mut self) -> Result<Vec<TokenWithLoc>, Diagnostic> {
        let mut tokens = Vec::new();
        while let Some(token) = self.next_token()? {
            tokens.push(token);
        }
        Ok(tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(input: &str) -> Vec<Token> {
        Lexer::new(input)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.token)
            .collect()
    }

    #[test]
    fn test_lex_arithmetic() {
        assert_eq!(lex("1 + 1"), vec![Token::Int(1), Token::Plus, Token::Int(1)]);
    }

    #[test]
    fn test_lex_keywords_and_idents() {
        assert_eq!(
            lex("let x = true;"),
            vec![
                Token::Let,
                Token::Ident("x".to_string()),
                Token::Equal,
                Token::True,
                Token::Semicolon,
            ]
        );
    }

    #[test]
    fn test_lex_two_char_operators() {
        assert_eq!(
            lex("== != <= >= && ||"),
            vec![
                Token::EqualEqual,
                Token::BangEqual,
                Token::LessEqual,
                Token::GreaterEqual,
                Token::AndAnd,
                Token::OrOr,
            ]
        );
    }

    #[test]
    fn test_lex_string_with_escapes() {
        assert_eq!(
            lex(r#""a\nb""#),
            vec![Token::Str("a\nb".to_string())]
        );
    }

    #[test]
    fn test_lex_float() {
        assert_eq!(lex("3.25"), vec![Token::Float(3.25)]);
    }

    #[test]
    fn test_lex_comment_skipped() {
        assert_eq!(lex("1 // comment\n2"), vec![Token::Int(1), Token::Int(2)]);
    }

    #[test]
    fn test_lex_unterminated_string() {
        let err = Lexer::new("\"abc").tokenize().unwrap_err();
        assert!(err.message.contains("unterminated"));
    }

    #[test]
    fn test_lex_tracks_locations() {
        let tokens = Lexer::new("1\n  2").tokenize().unwrap();
        assert_eq!(tokens[0].loc, SourceLoc::new(1, 1));
        assert_eq!(tokens[1].loc, SourceLoc::new(2, 3));
    }
}
