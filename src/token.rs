use std::{fmt, ops::Range};

#[derive(Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    lo: usize,
    len: u32,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span) -> Token {
        Token {
            kind,
            len: span.len,
            lo: span.lo,
        }
    }

    pub fn span(&self) -> Span {
        Span {
            len: self.len,
            lo: self.lo,
        }
    }

    pub fn is_eof(&self) -> bool {
        self.kind == TokenKind::Eof
    }

    pub fn is_keyword(&self, keyword: Keyword) -> bool {
        self.kind == TokenKind::Keyword(keyword)
    }

    pub fn is_symbol(&self, symbol: Symbol) -> bool {
        self.kind == TokenKind::Symbol(symbol)
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Token({:?}, {})", self.kind, self.span())
    }
}

#[derive(Copy, Clone, PartialEq, Eq)]
pub struct Span {
    pub len: u32,
    pub lo: usize,
}

impl Span {
    pub fn new_of_bounds(Range { start: lo, end: hi }: Range<usize>) -> Span {
        debug_assert!(hi >= lo);
        Self::new_of_length(lo, u32::try_from(hi - lo).unwrap_or(u32::MAX))
    }

    pub fn new_of_length(lo: usize, len: u32) -> Span {
        Span { len, lo }
    }

    pub fn hi(&self) -> usize {
        self.lo + self.len as usize
    }

    /// Returns a span which starts at `self` and ends at `other`.
    pub fn to(self, other: Span) -> Span {
        Span::new_of_bounds(self.lo..other.hi().max(self.hi()))
    }

    pub fn substr(self, src: &str) -> &str {
        &src[self.lo..self.hi()]
    }

    /// Wraps the provided value with this span.
    pub fn wrap<T>(self, inner: T) -> Spanned<T> {
        Spanned { span: self, inner }
    }

    /// Returns the one-based `(line, column)` pair of the span start.
    pub fn line_col(self, src: &str) -> (usize, usize) {
        let before = &src[..self.lo.min(src.len())];
        let line = before.matches('\n').count() + 1;
        let col = match before.rfind('\n') {
            Some(nl) => before.len() - nl,
            None => before.len() + 1,
        };
        (line, col)
    }
}

impl fmt::Debug for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Span({self}, len: {})", self.len)
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lo = self.lo;
        let hi = self.hi();
        write!(f, "{lo}..{hi}")
    }
}

/// Some value (usually a diagnostic) paired with the source span it refers to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Spanned<T> {
    pub span: Span,
    pub inner: T,
}

impl<T> Spanned<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Spanned<U> {
        Spanned {
            span: self.span,
            inner: f(self.inner),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TokenKind {
    Keyword(Keyword),
    Symbol(Symbol),
    /// Always within `0..=32767`.
    Int(u16),
    /// String constant, without the surrounding quotes.
    String(String),
    Identifier(String),
    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Keyword(keyword) => write!(f, "keyword `{keyword}`"),
            TokenKind::Symbol(symbol) => write!(f, "`{symbol}`"),
            TokenKind::Int(int) => write!(f, "integer {int}"),
            TokenKind::String(string) => write!(f, "string {string:?}"),
            TokenKind::Identifier(ident) => write!(f, "identifier `{ident}`"),
            TokenKind::Eof => f.write_str("end of input"),
        }
    }
}

impl TokenKind {
    /// Element name of the token in the XML token listing. `None` for
    /// [`TokenKind::Eof`], which is not listed.
    pub const fn xml_tag(&self) -> Option<&'static str> {
        let tag = match self {
            TokenKind::Keyword(_) => "keyword",
            TokenKind::Symbol(_) => "symbol",
            TokenKind::Int(_) => "integerConstant",
            TokenKind::String(_) => "stringConstant",
            TokenKind::Identifier(_) => "identifier",
            TokenKind::Eof => return None,
        };
        Some(tag)
    }

    /// Writes the token as an XML element, such as `<symbol> &lt; </symbol>`.
    pub fn write_xml(&self, w: &mut impl fmt::Write) -> fmt::Result {
        let Some(tag) = self.xml_tag() else {
            return Ok(());
        };
        write!(w, "<{tag}> ")?;
        match self {
            TokenKind::Keyword(keyword) => w.write_str(keyword.as_str())?,
            TokenKind::Symbol(symbol) => write_escaped(w, symbol.as_char())?,
            TokenKind::Int(int) => write!(w, "{int}")?,
            TokenKind::String(text) | TokenKind::Identifier(text) => {
                text.chars().try_for_each(|c| write_escaped(w, c))?;
            }
            TokenKind::Eof => unreachable!(),
        }
        writeln!(w, " </{tag}>")
    }
}

fn write_escaped(w: &mut impl fmt::Write, c: char) -> fmt::Result {
    match c {
        '<' => w.write_str("&lt;"),
        '>' => w.write_str("&gt;"),
        '&' => w.write_str("&amp;"),
        '"' => w.write_str("&quot;"),
        c => w.write_char(c),
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Keyword {
    Class,
    Constructor,
    Function,
    Method,
    Field,
    Static,
    Var,
    Int,
    Char,
    Boolean,
    Void,
    True,
    False,
    Null,
    This,
    Let,
    Do,
    If,
    Else,
    While,
    Return,
}

impl Keyword {
    pub const fn as_str(self) -> &'static str {
        match self {
            Keyword::Class => "class",
            Keyword::Constructor => "constructor",
            Keyword::Function => "function",
            Keyword::Method => "method",
            Keyword::Field => "field",
            Keyword::Static => "static",
            Keyword::Var => "var",
            Keyword::Int => "int",
            Keyword::Char => "char",
            Keyword::Boolean => "boolean",
            Keyword::Void => "void",
            Keyword::True => "true",
            Keyword::False => "false",
            Keyword::Null => "null",
            Keyword::This => "this",
            Keyword::Let => "let",
            Keyword::Do => "do",
            Keyword::If => "if",
            Keyword::Else => "else",
            Keyword::While => "while",
            Keyword::Return => "return",
        }
    }
}

impl fmt::Display for Keyword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub static KEYWORDS: phf::Map<&'static str, Keyword> = phf::phf_map! {
    "class" => Keyword::Class,
    "constructor" => Keyword::Constructor,
    "function" => Keyword::Function,
    "method" => Keyword::Method,
    "field" => Keyword::Field,
    "static" => Keyword::Static,
    "var" => Keyword::Var,
    "int" => Keyword::Int,
    "char" => Keyword::Char,
    "boolean" => Keyword::Boolean,
    "void" => Keyword::Void,
    "true" => Keyword::True,
    "false" => Keyword::False,
    "null" => Keyword::Null,
    "this" => Keyword::This,
    "let" => Keyword::Let,
    "do" => Keyword::Do,
    "if" => Keyword::If,
    "else" => Keyword::Else,
    "while" => Keyword::While,
    "return" => Keyword::Return,
};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Symbol {
    LBrace,
    RBrace,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Dot,
    Comma,
    Semicolon,
    Plus,
    Minus,
    Star,
    Slash,
    Amp,
    Pipe,
    Less,
    Greater,
    Eq,
    Tilde,
}

impl Symbol {
    pub const fn from_char(c: char) -> Option<Symbol> {
        let symbol = match c {
            '{' => Symbol::LBrace,
            '}' => Symbol::RBrace,
            '(' => Symbol::LParen,
            ')' => Symbol::RParen,
            '[' => Symbol::LBracket,
            ']' => Symbol::RBracket,
            '.' => Symbol::Dot,
            ',' => Symbol::Comma,
            ';' => Symbol::Semicolon,
            '+' => Symbol::Plus,
            '-' => Symbol::Minus,
            '*' => Symbol::Star,
            '/' => Symbol::Slash,
            '&' => Symbol::Amp,
            '|' => Symbol::Pipe,
            '<' => Symbol::Less,
            '>' => Symbol::Greater,
            '=' => Symbol::Eq,
            '~' => Symbol::Tilde,
            _ => return None,
        };
        Some(symbol)
    }

    pub const fn as_char(self) -> char {
        match self {
            Symbol::LBrace => '{',
            Symbol::RBrace => '}',
            Symbol::LParen => '(',
            Symbol::RParen => ')',
            Symbol::LBracket => '[',
            Symbol::RBracket => ']',
            Symbol::Dot => '.',
            Symbol::Comma => ',',
            Symbol::Semicolon => ';',
            Symbol::Plus => '+',
            Symbol::Minus => '-',
            Symbol::Star => '*',
            Symbol::Slash => '/',
            Symbol::Amp => '&',
            Symbol::Pipe => '|',
            Symbol::Less => '<',
            Symbol::Greater => '>',
            Symbol::Eq => '=',
            Symbol::Tilde => '~',
        }
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}
