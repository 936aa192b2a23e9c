//! Tokenizer for the expression grammar (spec §4.A).

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Number(f64),
    String(String),
    Ident(String),
    BacktickIdent(String),
    True,
    False,
    Null,
    Or,
    And,
    Not,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    StarStar,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Character offset of the first character of this token in the source text.
    pub position: usize,
}

pub struct Lexer<'a> {
    chars: Vec<char>,
    source: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            chars: source.chars().collect(),
            source,
            pos: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>, (usize, String)> {
        let mut tokens = Vec::new();
        loop {
            self.skip_whitespace();
            let start = self.pos;
            let Some(c) = self.peek() else {
                tokens.push(Token { kind: TokenKind::Eof, position: start });
                break;
            };

            let kind = match c {
                '(' => { self.advance(); TokenKind::LParen }
                ')' => { self.advance(); TokenKind::RParen }
                '[' => { self.advance(); TokenKind::LBracket }
                ']' => { self.advance(); TokenKind::RBracket }
                ',' => { self.advance(); TokenKind::Comma }
                '+' => { self.advance(); TokenKind::Plus }
                '-' => { self.advance(); TokenKind::Minus }
                '%' => { self.advance(); TokenKind::Percent }
                '*' => {
                    self.advance();
                    if self.peek() == Some('*') {
                        self.advance();
                        TokenKind::StarStar
                    } else {
                        TokenKind::Star
                    }
                }
                '/' => { self.advance(); TokenKind::Slash }
                '=' => { self.advance(); TokenKind::Eq }
                '!' => {
                    self.advance();
                    if self.peek() == Some('=') {
                        self.advance();
                        TokenKind::Ne
                    } else {
                        return Err((start, "expected '=' after '!'".to_string()));
                    }
                }
                '<' => {
                    self.advance();
                    if self.peek() == Some('=') {
                        self.advance();
                        TokenKind::Le
                    } else {
                        TokenKind::Lt
                    }
                }
                '>' => {
                    self.advance();
                    if self.peek() == Some('=') {
                        self.advance();
                        TokenKind::Ge
                    } else {
                        TokenKind::Gt
                    }
                }
                '\'' | '"' => self.lex_string(c, start)?,
                '`' => self.lex_backtick(start)?,
                d if d.is_ascii_digit() => self.lex_number(start)?,
                c if c == '_' || c.is_alphabetic() => self.lex_ident_or_keyword(start),
                other => {
                    return Err((start, format!("unexpected character '{other}'")));
                }
            };

            tokens.push(Token { kind, position: start });
        }
        Ok(tokens)
    }

    fn lex_string(&mut self, quote: char, start: usize) -> Result<TokenKind, (usize, String)> {
        self.advance(); // consume opening quote
        let mut value = String::new();
        loop {
            match self.advance() {
                None => return Err((start, "unterminated string literal".to_string())),
                Some(c) if c == quote => break,
                Some('\\') => match self.advance() {
                    Some(next) => value.push(next),
                    None => return Err((start, "unterminated string literal".to_string())),
                },
                Some(c) => value.push(c),
            }
        }
        Ok(TokenKind::String(value))
    }

    fn lex_backtick(&mut self, start: usize) -> Result<TokenKind, (usize, String)> {
        self.advance();
        let mut value = String::new();
        loop {
            match self.advance() {
                None => return Err((start, "unterminated backtick identifier".to_string())),
                Some('`') => break,
                Some(c) => value.push(c),
            }
        }
        Ok(TokenKind::BacktickIdent(value))
    }

    fn lex_number(&mut self, start: usize) -> Result<TokenKind, (usize, String)> {
        let mut text = String::new();
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            text.push(self.advance().unwrap());
        }
        if self.peek() == Some('.') && matches!(self.peek_at(1), Some(c) if c.is_ascii_digit()) {
            text.push(self.advance().unwrap());
            while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                text.push(self.advance().unwrap());
            }
        }
        if matches!(self.peek(), Some('e') | Some('E')) {
            let mut lookahead = 1;
            if matches!(self.peek_at(1), Some('+') | Some('-')) {
                lookahead = 2;
            }
            if matches!(self.peek_at(lookahead), Some(c) if c.is_ascii_digit()) {
                text.push(self.advance().unwrap());
                if matches!(self.peek(), Some('+') | Some('-')) {
                    text.push(self.advance().unwrap());
                }
                while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                    text.push(self.advance().unwrap());
                }
            }
        }
        text.parse::<f64>()
            .map(TokenKind::Number)
            .map_err(|_| (start, format!("invalid number literal '{text}'")))
    }

    fn lex_ident_or_keyword(&mut self, _start: usize) -> TokenKind {
        let mut text = String::new();
        while matches!(self.peek(), Some(c) if c.is_alphanumeric() || c == '_') {
            text.push(self.advance().unwrap());
        }
        match text.as_str() {
            "or" => TokenKind::Or,
            "and" => TokenKind::And,
            "not" => TokenKind::Not,
            "true" => TokenKind::True,
            "false" => TokenKind::False,
            "null" => TokenKind::Null,
            _ => TokenKind::Ident(text),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        Lexer::new(source).tokenize().unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn tokenizes_numbers_and_operators() {
        assert_eq!(
            kinds("1 + 2.5 * 3"),
            vec![
                TokenKind::Number(1.0),
                TokenKind::Plus,
                TokenKind::Number(2.5),
                TokenKind::Star,
                TokenKind::Number(3.0),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn tokenizes_power_distinct_from_star() {
        assert_eq!(kinds("2 ** 3"), vec![TokenKind::Number(2.0), TokenKind::StarStar, TokenKind::Number(3.0), TokenKind::Eof]);
    }

    #[test]
    fn tokenizes_backtick_identifier_with_spaces() {
        assert_eq!(
            kinds("`net sales` + 1"),
            vec![
                TokenKind::BacktickIdent("net sales".into()),
                TokenKind::Plus,
                TokenKind::Number(1.0),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn tokenizes_string_with_escape() {
        assert_eq!(kinds(r#"'a\'b'"#), vec![TokenKind::String("a'b".into()), TokenKind::Eof]);
    }

    #[test]
    fn reports_position_of_unexpected_character() {
        let err = Lexer::new("1 + @").tokenize().unwrap_err();
        assert_eq!(err.0, 4);
    }
}
