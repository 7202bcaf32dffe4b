use std::fmt;

use crate::token::{Span, Spanned, Symbol, Token, TokenKind, KEYWORDS};

/// Largest value an integer constant may take.
pub const MAX_INT: u16 = 32_767;

type Result<T, E = Spanned<Error>> = std::result::Result<T, E>;

/// Lexes the whole input, stopping at the first error.
pub fn lex_all(src: &str) -> Result<Vec<Token>> {
    Lexer::new(src).collect()
}

/// Lexes the whole input into the XML token listing: one element per token,
/// wrapped in a `<tokens>` element.
pub fn xml_tokens(src: &str) -> Result<String> {
    let mut xml = String::with_capacity(src.len() * 4);
    xml.push_str("<tokens>\n");
    for token in Lexer::new(src) {
        // Writing into a `String` never fails.
        let _ = token?.kind.write_xml(&mut xml);
    }
    xml.push_str("</tokens>\n");
    Ok(xml)
}

/// The Jack scanner.
///
/// Tokens are produced on demand, one per [`Lexer::advance`] call. Whitespace
/// and comments are never surfaced as tokens.
pub struct Lexer<'src> {
    src: &'src str,
    cursor: usize,
    current_lo: usize,
    finished: bool,
}

impl<'src> Lexer<'src> {
    /// Constructs a new lexer with the default state.
    pub fn new(src: &'src str) -> Lexer<'src> {
        Lexer {
            src,
            cursor: 0,
            current_lo: 0,
            finished: false,
        }
    }

    pub fn src(&self) -> &'src str {
        self.src
    }

    /// Skips any whitespace and comments, and returns whether any token is
    /// left in the input.
    ///
    /// An unclosed block comment is left unconsumed (and reported as
    /// available), so that the next [`Lexer::advance`] reports it.
    pub fn has_more_tokens(&mut self) -> bool {
        match self.skip_trivia() {
            Ok(()) => !self.is_at_end(),
            Err(_) => true,
        }
    }

    /// Consumes and classifies exactly one token. Once the input is
    /// exhausted, every call returns an [`TokenKind::Eof`] token.
    pub fn advance(&mut self) -> Result<Token> {
        self.skip_trivia()?;
        let kind = self.scan_token_kind()?;
        Ok(Token::new(kind, self.span()))
    }

    /// Tries to scan the current character.
    fn scan_token_kind(&mut self) -> Result<TokenKind> {
        if self.is_at_end() {
            self.current_lo = self.cursor;
            return Ok(TokenKind::Eof);
        }
        match self.mark_advance() {
            '"' => self.string(),
            c if c.is_ascii_alphabetic() || c == '_' => Ok(self.identifier_or_keyword()),
            c if c.is_ascii_digit() => self.number(),
            c => match Symbol::from_char(c) {
                Some(symbol) => Ok(TokenKind::Symbol(symbol)),
                None => Err(self.span().wrap(Error::UnexpectedChar(c))),
            },
        }
    }

    /// Lexes a string constant. The language has no escape sequences, so the
    /// first quotation mark always closes the string.
    fn string(&mut self) -> Result<TokenKind> {
        loop {
            if self.is_at_end() {
                return Err(self.span().wrap(Error::UnterminatedString));
            }
            match self.peek() {
                '"' => {
                    self.advance_char();
                    break;
                }
                // The line break itself is not part of the reported span.
                '\n' | '\r' => {
                    return Err(self.span().wrap(Error::UnterminatedString));
                }
                c if c == '\0' || !c.is_ascii() => {
                    let lo = self.cursor;
                    self.advance_char();
                    let span = Span::new_of_bounds(lo..self.cursor);
                    return Err(span.wrap(Error::UnexpectedChar(c)));
                }
                _ => {
                    self.advance_char();
                }
            }
        }
        let raw = self.substr();
        Ok(TokenKind::String(raw[1..raw.len() - 1].to_string()))
    }

    fn identifier_or_keyword(&mut self) -> TokenKind {
        let valid_identifier_suffix = |c: char| c.is_ascii_alphanumeric() || c == '_';

        while valid_identifier_suffix(self.peek()) {
            self.advance_char();
        }
        let substr = self.substr();
        match KEYWORDS.get(substr).copied() {
            Some(keyword) => TokenKind::Keyword(keyword),
            None => TokenKind::Identifier(substr.to_string()),
        }
    }

    fn number(&mut self) -> Result<TokenKind> {
        while self.peek().is_ascii_digit() {
            self.advance_char();
        }
        // Any digit run which doesn't fit in an u16 is necessarily out of
        // range as well.
        match self.substr().parse::<u16>() {
            Ok(number) if number <= MAX_INT => Ok(TokenKind::Int(number)),
            _ => Err(self.span().wrap(Error::IntegerOutOfRange)),
        }
    }

    /// Skips whitespace, `// line` comments and `/* block */` comments (which
    /// also covers `/** doc */` ones). Block comments do not nest.
    fn skip_trivia(&mut self) -> Result<()> {
        loop {
            match (self.peek(), self.peek_second()) {
                (c, _) if c.is_ascii_whitespace() => {
                    self.advance_char();
                }
                ('/', '/') => {
                    while !self.is_at_end() && self.peek() != '\n' {
                        self.advance_char();
                    }
                }
                ('/', '*') => self.block_comment()?,
                _ => return Ok(()),
            }
        }
    }

    fn block_comment(&mut self) -> Result<()> {
        let lo = self.cursor;
        let rest = &self.src[lo + 2..];
        match rest.find("*/") {
            Some(end) => {
                self.cursor = lo + 2 + end + 2;
                Ok(())
            }
            None => {
                let span = Span::new_of_bounds(lo..self.src.len());
                Err(span.wrap(Error::UnclosedComment))
            }
        }
    }
}

impl Iterator for Lexer<'_> {
    type Item = Result<Token>;

    /// Yields every token up to (and including) the first [`TokenKind::Eof`]
    /// or error.
    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let next = self.advance();
        self.finished = next.as_ref().map_or(true, Token::is_eof);
        Some(next)
    }
}

impl Lexer<'_> {
    /// Starts a new token "mark" and advances the cursor.
    fn mark_advance(&mut self) -> char {
        self.current_lo = self.cursor;
        self.advance_char()
    }

    /// Returns the next char and advances the cursor.
    fn advance_char(&mut self) -> char {
        let c = self.peek();
        if !self.is_at_end() {
            self.cursor += c.len_utf8();
        }
        c
    }

    fn is_at_end(&self) -> bool {
        self.cursor >= self.src.len()
    }

    /// Returns the next char without advancing the cursor. Past the end of
    /// the input, returns `'\0'`, which callers must tell apart from a real
    /// NUL with [`Lexer::is_at_end`].
    fn peek(&self) -> char {
        self.src[self.cursor..].chars().next().unwrap_or('\0')
    }

    /// Returns the char after the next one without advancing the cursor.
    fn peek_second(&self) -> char {
        self.src[self.cursor..].chars().nth(1).unwrap_or('\0')
    }

    /// Returns the current span.
    fn span(&self) -> Span {
        Span::new_of_bounds(self.current_lo..self.cursor)
    }

    /// Returns the substring of the current marked bounds.
    fn substr(&self) -> &str {
        self.span().substr(self.src)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Error {
    UnexpectedChar(char),
    UnterminatedString,
    UnclosedComment,
    IntegerOutOfRange,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::UnexpectedChar(c) => write!(f, "unexpected character {c:?}"),
            Error::UnterminatedString => write!(f, "unterminated string constant"),
            Error::UnclosedComment => write!(f, "unclosed comment"),
            Error::IntegerOutOfRange => {
                write!(f, "integer constant out of range (maximum is {MAX_INT})")
            }
        }
    }
}
