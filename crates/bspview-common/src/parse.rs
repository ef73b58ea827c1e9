// parse.rs — text tokenizer shared by the entity lump and config files
//
// Whitespace and `//` comments separate tokens. A quoted string is one token
// and may contain spaces and braces; an unterminated quote runs to the end of
// the input. Outside quotes, `{` and `}` are tokens of their own.

/// One lexical token, borrowing from the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token<'a> {
    OpenBrace,
    CloseBrace,
    Quoted(&'a str),
    Word(&'a str),
}

impl<'a> Token<'a> {
    /// Text of a string-like token.
    pub fn text(&self) -> Option<&'a str> {
        match *self {
            Token::Quoted(s) | Token::Word(s) => Some(s),
            Token::OpenBrace | Token::CloseBrace => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Tokenizer<'a> {
    data: &'a str,
    pos: usize,
    line: usize,
}

impl<'a> Tokenizer<'a> {
    pub fn new(data: &'a str) -> Self {
        Self {
            data,
            pos: 0,
            line: 1,
        }
    }

    /// 1-based line of the next unread byte.
    pub fn line(&self) -> usize {
        self.line
    }

    fn bump(&mut self) {
        if self.data.as_bytes()[self.pos] == b'\n' {
            self.line += 1;
        }
        self.pos += 1;
    }

    fn skip_whitespace_and_comments(&mut self) {
        let bytes = self.data.as_bytes();
        loop {
            while self.pos < bytes.len() && bytes[self.pos] <= b' ' {
                self.bump();
            }
            if bytes[self.pos..].starts_with(b"//") {
                while self.pos < bytes.len() && bytes[self.pos] != b'\n' {
                    self.bump();
                }
                continue;
            }
            break;
        }
    }
}

impl<'a> Iterator for Tokenizer<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Token<'a>> {
        self.skip_whitespace_and_comments();
        let bytes = self.data.as_bytes();
        if self.pos >= bytes.len() {
            return None;
        }

        match bytes[self.pos] {
            b'{' => {
                self.bump();
                Some(Token::OpenBrace)
            }
            b'}' => {
                self.bump();
                Some(Token::CloseBrace)
            }
            b'"' => {
                self.bump();
                let start = self.pos;
                while self.pos < bytes.len() && bytes[self.pos] != b'"' {
                    self.bump();
                }
                let text = &self.data[start..self.pos];
                if self.pos < bytes.len() {
                    // closing quote
                    self.bump();
                }
                Some(Token::Quoted(text))
            }
            _ => {
                let start = self.pos;
                while self.pos < bytes.len()
                    && bytes[self.pos] > b' '
                    && !matches!(bytes[self.pos], b'{' | b'}' | b'"')
                    && !bytes[self.pos..].starts_with(b"//")
                {
                    self.bump();
                }
                Some(Token::Word(&self.data[start..self.pos]))
            }
        }
    }
}

/// Split one line into its string tokens, dropping braces.
pub fn tokenize_line(line: &str) -> Vec<&str> {
    Tokenizer::new(line).filter_map(|t| t.text()).collect()
}
