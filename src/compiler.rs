//! The compilation engine.
//!
//! A single-pass recursive-descent parser which emits VM code while it
//! recognizes the grammar. No syntax tree is built: each production consumes
//! its tokens, updates the symbol table and writes the corresponding VM
//! instructions before returning.
//!
//! ```text
//! class          ::= 'class' ID '{' classVarDec* subroutineDec* '}'
//! classVarDec    ::= ('static' | 'field') type ID (',' ID)* ';'
//! type           ::= 'int' | 'char' | 'boolean' | ID
//! subroutineDec  ::= ('constructor' | 'function' | 'method') ('void' | type) ID
//!                    '(' parameterList ')' '{' varDec* statement* '}'
//! parameterList  ::= (type ID (',' type ID)*)?
//! varDec         ::= 'var' type ID (',' ID)* ';'
//! statement      ::= let | if | while | do | return
//! let            ::= 'let' ID ('[' expr ']')? '=' expr ';'
//! if             ::= 'if' '(' expr ')' '{' statement* '}' ('else' '{' statement* '}')?
//! while          ::= 'while' '(' expr ')' '{' statement* '}'
//! do             ::= 'do' call ';'
//! return         ::= 'return' expr? ';'
//! expr           ::= term (op term)*
//! term           ::= INT | STRING | 'true' | 'false' | 'null' | 'this'
//!                  | ID | ID '[' expr ']' | call | '(' expr ')' | ('-' | '~') term
//! call           ::= ID '(' exprList ')' | ID '.' ID '(' exprList ')'
//! exprList       ::= (expr (',' expr)*)?
//! op             ::= '+' | '-' | '*' | '/' | '&' | '|' | '<' | '>' | '='
//! ```
//!
//! Operators have no precedence: `1 + 2 * 3` is `(1 + 2) * 3`.

use std::{fmt, io};

use log::{debug, trace};

use crate::{
    lexer::{self, Lexer},
    symbol_table::{Kind, SymbolTable},
    token::{Keyword, Span, Spanned, Symbol, Token, TokenKind},
    vm::{Command, Segment, VmWriter},
};

type Result<T, E = CompileError> = std::result::Result<T, E>;

/// Compiles the single class in `src`, writing its VM code into `out`.
///
/// On failure, whatever was already written into `out` must be discarded.
pub fn compile<W>(src: &str, out: W) -> Result<Report>
where
    W: io::Write,
{
    let mut c = Compiler::new(src, VmWriter::new(out))?;
    c.compile_class()?;
    c.finish()?;
    c.writer.flush()?;
    Ok(c.into_report())
}

/// Outcome of a successful compilation.
#[derive(Debug, Default)]
pub struct Report {
    pub class_name: String,
    /// Fully qualified names of the emitted functions, in emission order.
    pub functions: Vec<String>,
    pub instructions: usize,
    pub warnings: Vec<Spanned<Warning>>,
}

struct Compiler<'src, W> {
    lexer: Lexer<'src>,
    /// The lookahead token.
    current: Token,
    symbols: SymbolTable,
    writer: VmWriter<W>,
    class_name: String,
    returns: ReturnKind,
    /// Source of the unique suffix of `if` and `while` labels.
    label_counter: u32,
    functions: Vec<String>,
    warnings: Vec<Spanned<Warning>>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum SubroutineKind {
    Constructor,
    Function,
    Method,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum ReturnKind {
    Void,
    Value,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Statement {
    Let,
    If,
    While,
    Do,
    Return,
}

impl Statement {
    fn from_token(token: &Token) -> Option<Statement> {
        let statement = match token.kind {
            TokenKind::Keyword(Keyword::Let) => Statement::Let,
            TokenKind::Keyword(Keyword::If) => Statement::If,
            TokenKind::Keyword(Keyword::While) => Statement::While,
            TokenKind::Keyword(Keyword::Do) => Statement::Do,
            TokenKind::Keyword(Keyword::Return) => Statement::Return,
            _ => return None,
        };
        Some(statement)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    And,
    Or,
    Lt,
    Gt,
    Eq,
}

impl BinaryOp {
    fn from_token(token: &Token) -> Option<BinaryOp> {
        let op = match token.kind {
            TokenKind::Symbol(Symbol::Plus) => BinaryOp::Add,
            TokenKind::Symbol(Symbol::Minus) => BinaryOp::Sub,
            TokenKind::Symbol(Symbol::Star) => BinaryOp::Mul,
            TokenKind::Symbol(Symbol::Slash) => BinaryOp::Div,
            TokenKind::Symbol(Symbol::Amp) => BinaryOp::And,
            TokenKind::Symbol(Symbol::Pipe) => BinaryOp::Or,
            TokenKind::Symbol(Symbol::Less) => BinaryOp::Lt,
            TokenKind::Symbol(Symbol::Greater) => BinaryOp::Gt,
            TokenKind::Symbol(Symbol::Eq) => BinaryOp::Eq,
            _ => return None,
        };
        Some(op)
    }
}

/// Where a subroutine call goes to.
enum CallTarget {
    /// A method call. The receiver is pushed as the implicit first argument.
    Method { class: String },
    /// A function or constructor call, without receiver.
    Function { class: String },
}

impl CallTarget {
    fn class(&self) -> &str {
        match self {
            CallTarget::Method { class } | CallTarget::Function { class } => class,
        }
    }

    fn implicit_args(&self) -> u16 {
        match self {
            CallTarget::Method { .. } => 1,
            CallTarget::Function { .. } => 0,
        }
    }
}

impl<W> Compiler<'_, W>
where
    W: io::Write,
{
    fn compile_class(&mut self) -> Result<()> {
        self.consume_keyword(Keyword::Class)?;
        let (name, _) = self.consume_ident()?;
        self.class_name = name;
        self.consume_symbol(Symbol::LBrace)?;

        while self.is_keyword(Keyword::Static) || self.is_keyword(Keyword::Field) {
            self.compile_class_var_dec()?;
        }
        while self.is_keyword(Keyword::Constructor)
            || self.is_keyword(Keyword::Function)
            || self.is_keyword(Keyword::Method)
        {
            self.compile_subroutine()?;
        }

        // The closing brace is checked without reading past it; whatever
        // follows is checked by `finish`.
        if !self.is_symbol(Symbol::RBrace) {
            return Err(self.unexpected(Expected::Symbol(Symbol::RBrace)));
        }
        Ok(())
    }

    fn compile_class_var_dec(&mut self) -> Result<()> {
        let kind = match self.consume_any_keyword(&[Keyword::Static, Keyword::Field])? {
            Keyword::Static => Kind::Static,
            Keyword::Field => Kind::Field,
            _ => unreachable!(),
        };
        let ty = self.compile_type()?;
        self.compile_var_names(&ty, kind)
    }

    fn compile_subroutine(&mut self) -> Result<()> {
        self.symbols.start_subroutine();

        let subroutine = match self.consume_any_keyword(&[
            Keyword::Constructor,
            Keyword::Function,
            Keyword::Method,
        ])? {
            Keyword::Constructor => SubroutineKind::Constructor,
            Keyword::Function => SubroutineKind::Function,
            Keyword::Method => SubroutineKind::Method,
            _ => unreachable!(),
        };
        self.returns = if self.take_keyword(Keyword::Void)? {
            ReturnKind::Void
        } else {
            self.compile_type()?;
            ReturnKind::Value
        };
        let (name, _) = self.consume_ident()?;
        let function_name = format!("{}.{name}", self.class_name);

        self.consume_symbol(Symbol::LParen)?;
        if subroutine == SubroutineKind::Method {
            // Always argument 0, the scope was just reset.
            self.symbols.define("this", &self.class_name, Kind::Argument);
        }
        self.compile_parameter_list()?;
        self.consume_symbol(Symbol::RParen)?;

        self.consume_symbol(Symbol::LBrace)?;
        while self.is_keyword(Keyword::Var) {
            self.compile_var_dec()?;
        }

        let locals = self.symbols.var_count(Kind::Local);
        self.writer.write_function(&function_name, locals)?;
        match subroutine {
            SubroutineKind::Constructor => {
                let fields = self.symbols.var_count(Kind::Field);
                self.writer.write_push(Segment::Constant, fields)?;
                self.writer.write_call("Memory.alloc", 1)?;
                self.writer.write_pop(Segment::Pointer, 0)?;
            }
            SubroutineKind::Method => {
                self.writer.write_push(Segment::Argument, 0)?;
                self.writer.write_pop(Segment::Pointer, 0)?;
            }
            SubroutineKind::Function => {}
        }

        self.compile_statements()?;
        self.consume_symbol(Symbol::RBrace)?;

        debug!("compiled {subroutine:?} {function_name} ({locals} locals)");
        self.functions.push(function_name);
        Ok(())
    }

    fn compile_parameter_list(&mut self) -> Result<()> {
        if !self.is_type() {
            return Ok(());
        }
        loop {
            let ty = self.compile_type()?;
            let (name, span) = self.consume_ident()?;
            self.define(&name, &ty, Kind::Argument, span)?;
            if !self.take_symbol(Symbol::Comma)? {
                return Ok(());
            }
        }
    }

    fn compile_var_dec(&mut self) -> Result<()> {
        self.consume_keyword(Keyword::Var)?;
        let ty = self.compile_type()?;
        self.compile_var_names(&ty, Kind::Local)
    }

    /// Parses `ID (',' ID)* ';'`, defining each name.
    fn compile_var_names(&mut self, ty: &str, kind: Kind) -> Result<()> {
        loop {
            let (name, span) = self.consume_ident()?;
            self.define(&name, ty, kind, span)?;
            if !self.take_symbol(Symbol::Comma)? {
                break;
            }
        }
        self.consume_symbol(Symbol::Semicolon)?;
        Ok(())
    }

    fn compile_type(&mut self) -> Result<String> {
        let ty = match &self.current.kind {
            TokenKind::Keyword(k @ (Keyword::Int | Keyword::Char | Keyword::Boolean)) => {
                k.as_str().to_string()
            }
            TokenKind::Identifier(class) => class.clone(),
            _ => return Err(self.unexpected(Expected::Type)),
        };
        self.advance()?;
        Ok(ty)
    }

    /// Compiles statements for as long as the current token starts one.
    fn compile_statements(&mut self) -> Result<()> {
        while let Some(statement) = Statement::from_token(&self.current) {
            match statement {
                Statement::Let => self.compile_let()?,
                Statement::If => self.compile_if()?,
                Statement::While => self.compile_while()?,
                Statement::Do => self.compile_do()?,
                Statement::Return => self.compile_return()?,
            }
        }
        Ok(())
    }

    fn compile_let(&mut self) -> Result<()> {
        self.consume_keyword(Keyword::Let)?;
        let (name, span) = self.consume_ident()?;
        let (segment, index) = self.resolve_variable(&name, span)?;

        if self.take_symbol(Symbol::LBracket)? {
            // The target address stays on the stack while the value is
            // computed, since the value may itself rebase `that`.
            self.writer.write_push(segment, index)?;
            self.compile_expression()?;
            self.consume_symbol(Symbol::RBracket)?;
            self.writer.write_arithmetic(Command::Add)?;

            self.consume_symbol(Symbol::Eq)?;
            self.compile_expression()?;

            self.writer.write_pop(Segment::Temp, 0)?;
            self.writer.write_pop(Segment::Pointer, 1)?;
            self.writer.write_push(Segment::Temp, 0)?;
            self.writer.write_pop(Segment::That, 0)?;
        } else {
            self.consume_symbol(Symbol::Eq)?;
            self.compile_expression()?;
            self.writer.write_pop(segment, index)?;
        }

        self.consume_symbol(Symbol::Semicolon)?;
        Ok(())
    }

    fn compile_if(&mut self) -> Result<()> {
        let id = self.next_label_id();
        let else_label = format!("IF{id}_ELSE");
        let out_label = format!("IF{id}_OUT");

        self.consume_keyword(Keyword::If)?;
        self.compile_condition()?;
        self.writer.write_arithmetic(Command::Not)?;
        self.writer.write_if(&else_label)?;

        self.compile_block()?;
        self.writer.write_goto(&out_label)?;
        self.writer.write_label(&else_label)?;

        if self.take_keyword(Keyword::Else)? {
            self.compile_block()?;
        }
        self.writer.write_label(&out_label)?;
        Ok(())
    }

    fn compile_while(&mut self) -> Result<()> {
        let id = self.next_label_id();
        let top_label = format!("WHILE{id}_TOP");
        let end_label = format!("WHILE{id}_END");

        self.consume_keyword(Keyword::While)?;
        self.writer.write_label(&top_label)?;
        self.compile_condition()?;
        self.writer.write_arithmetic(Command::Not)?;
        self.writer.write_if(&end_label)?;

        self.compile_block()?;
        self.writer.write_goto(&top_label)?;
        self.writer.write_label(&end_label)?;
        Ok(())
    }

    /// Parses `'(' expr ')'`.
    fn compile_condition(&mut self) -> Result<()> {
        self.consume_symbol(Symbol::LParen)?;
        self.compile_expression()?;
        self.consume_symbol(Symbol::RParen)?;
        Ok(())
    }

    /// Parses `'{' statement* '}'`.
    fn compile_block(&mut self) -> Result<()> {
        self.consume_symbol(Symbol::LBrace)?;
        self.compile_statements()?;
        self.consume_symbol(Symbol::RBrace)?;
        Ok(())
    }

    fn compile_do(&mut self) -> Result<()> {
        self.consume_keyword(Keyword::Do)?;
        let (name, span) = self.consume_ident()?;
        self.compile_subroutine_call(name, span)?;
        self.consume_symbol(Symbol::Semicolon)?;
        // Every call leaves a value behind.
        self.writer.write_pop(Segment::Temp, 0)?;
        Ok(())
    }

    fn compile_return(&mut self) -> Result<()> {
        let span = self.consume_keyword(Keyword::Return)?.span();
        if self.is_symbol(Symbol::Semicolon) {
            if self.returns == ReturnKind::Value {
                self.warn(span.wrap(Warning::MissingReturnValue));
            }
            self.writer.write_push(Segment::Constant, 0)?;
        } else {
            if self.returns == ReturnKind::Void {
                self.warn(span.wrap(Warning::ReturnValueInVoid));
            }
            self.compile_expression()?;
        }
        self.consume_symbol(Symbol::Semicolon)?;
        self.writer.write_return()?;
        Ok(())
    }

    fn compile_expression(&mut self) -> Result<()> {
        self.compile_term()?;
        while let Some(op) = BinaryOp::from_token(&self.current) {
            self.advance()?;
            self.compile_term()?;
            match op {
                BinaryOp::Add => self.writer.write_arithmetic(Command::Add)?,
                BinaryOp::Sub => self.writer.write_arithmetic(Command::Sub)?,
                BinaryOp::And => self.writer.write_arithmetic(Command::And)?,
                BinaryOp::Or => self.writer.write_arithmetic(Command::Or)?,
                BinaryOp::Lt => self.writer.write_arithmetic(Command::Lt)?,
                BinaryOp::Gt => self.writer.write_arithmetic(Command::Gt)?,
                BinaryOp::Eq => self.writer.write_arithmetic(Command::Eq)?,
                BinaryOp::Mul => self.writer.write_call("Math.multiply", 2)?,
                BinaryOp::Div => self.writer.write_call("Math.divide", 2)?,
            }
        }
        Ok(())
    }

    fn compile_term(&mut self) -> Result<()> {
        let token = self.advance()?;
        let span = token.span();
        match token.kind {
            TokenKind::Int(int) => self.writer.write_push(Segment::Constant, int)?,
            TokenKind::String(string) => self.compile_string(&string, span)?,
            TokenKind::Keyword(Keyword::True) => {
                self.writer.write_push(Segment::Constant, 1)?;
                self.writer.write_arithmetic(Command::Neg)?;
            }
            TokenKind::Keyword(Keyword::False | Keyword::Null) => {
                self.writer.write_push(Segment::Constant, 0)?;
            }
            TokenKind::Keyword(Keyword::This) => self.writer.write_push(Segment::Pointer, 0)?,
            TokenKind::Symbol(Symbol::LParen) => {
                self.compile_expression()?;
                self.consume_symbol(Symbol::RParen)?;
            }
            TokenKind::Symbol(Symbol::Minus) => {
                self.compile_term()?;
                self.writer.write_arithmetic(Command::Neg)?;
            }
            TokenKind::Symbol(Symbol::Tilde) => {
                self.compile_term()?;
                self.writer.write_arithmetic(Command::Not)?;
            }
            TokenKind::Identifier(name) => {
                if self.is_symbol(Symbol::LParen) || self.is_symbol(Symbol::Dot) {
                    self.compile_subroutine_call(name, span)?;
                } else if self.take_symbol(Symbol::LBracket)? {
                    let (segment, index) = self.resolve_variable(&name, span)?;
                    self.writer.write_push(segment, index)?;
                    self.compile_expression()?;
                    self.consume_symbol(Symbol::RBracket)?;
                    self.writer.write_arithmetic(Command::Add)?;
                    self.writer.write_pop(Segment::Pointer, 1)?;
                    self.writer.write_push(Segment::That, 0)?;
                } else {
                    let (segment, index) = self.resolve_variable(&name, span)?;
                    self.writer.write_push(segment, index)?;
                }
            }
            found => {
                let error = Error::Unexpected {
                    expected: Expected::Term,
                    found,
                };
                return Err(span.wrap(error).into());
            }
        }
        Ok(())
    }

    /// Builds a string object by appending each character to a new string.
    fn compile_string(&mut self, string: &str, span: Span) -> Result<()> {
        let len = u16::try_from(string.len())
            .ok()
            .filter(|len| *len <= lexer::MAX_INT)
            .ok_or_else(|| span.wrap(Error::StringTooLong))?;
        self.writer.write_push(Segment::Constant, len)?;
        self.writer.write_call("String.new", 1)?;
        // The lexer only produces ASCII strings.
        for byte in string.bytes() {
            self.writer.write_push(Segment::Constant, u16::from(byte))?;
            self.writer.write_call("String.appendChar", 2)?;
        }
        Ok(())
    }

    /// Compiles a call whose first identifier (a subroutine, variable or
    /// class name) was already consumed.
    fn compile_subroutine_call(&mut self, first: String, span: Span) -> Result<()> {
        let (target, subroutine) = if self.take_symbol(Symbol::Dot)? {
            let (subroutine, _) = self.consume_ident()?;
            let target = match self.symbols.get(&first) {
                Some(symbol) => {
                    let (segment, index) = (symbol.kind.segment(), symbol.index);
                    let class = symbol.ty.clone();
                    self.writer.write_push(segment, index)?;
                    CallTarget::Method { class }
                }
                None => {
                    trace!("{span}: resolving `{first}` as a class name");
                    // Class names are capitalized, so this is most likely an
                    // undeclared variable.
                    if !first.starts_with(|c: char| c.is_ascii_uppercase()) {
                        self.warn(span.wrap(Warning::UnresolvedReceiver(first.clone())));
                    }
                    CallTarget::Function { class: first }
                }
            };
            (target, subroutine)
        } else {
            self.writer.write_push(Segment::Pointer, 0)?;
            let class = self.class_name.clone();
            (CallTarget::Method { class }, first)
        };

        self.consume_symbol(Symbol::LParen)?;
        let args = self.compile_expression_list()?;
        let close = self.consume_symbol(Symbol::RParen)?;

        let argc = args
            .checked_add(target.implicit_args())
            .ok_or_else(|| span.to(close.span()).wrap(Error::TooManyArguments))?;
        let name = format!("{}.{subroutine}", target.class());
        self.writer.write_call(&name, argc)?;
        Ok(())
    }

    /// Compiles a possibly empty list of comma separated expressions,
    /// returning how many were compiled.
    fn compile_expression_list(&mut self) -> Result<u16> {
        if self.is_symbol(Symbol::RParen) {
            return Ok(0);
        }
        let mut count: u16 = 0;
        loop {
            let lo = self.current.span();
            self.compile_expression()?;
            count = count
                .checked_add(1)
                .ok_or_else(|| lo.wrap(Error::TooManyArguments))?;
            if !self.take_symbol(Symbol::Comma)? {
                return Ok(count);
            }
        }
    }
}

impl<'src, W> Compiler<'src, W>
where
    W: io::Write,
{
    fn new(src: &'src str, writer: VmWriter<W>) -> Result<Compiler<'src, W>> {
        let mut lexer = Lexer::new(src);
        let current = lexer.advance()?;
        Ok(Compiler {
            lexer,
            current,
            symbols: SymbolTable::new(),
            writer,
            class_name: String::new(),
            returns: ReturnKind::Void,
            label_counter: 0,
            functions: Vec::with_capacity(8),
            warnings: Vec::new(),
        })
    }

    /// Ensures that nothing but trivia follows the current (last) token.
    fn finish(&mut self) -> Result<()> {
        if !self.lexer.has_more_tokens() {
            return Ok(());
        }
        let token = self.lexer.advance()?;
        let span = token.span();
        let error = Error::Unexpected {
            expected: Expected::Eof,
            found: token.kind,
        };
        Err(span.wrap(error).into())
    }

    fn into_report(self) -> Report {
        Report {
            class_name: self.class_name,
            functions: self.functions,
            instructions: self.writer.lines(),
            warnings: self.warnings,
        }
    }

    fn next_label_id(&mut self) -> u32 {
        let id = self.label_counter;
        self.label_counter += 1;
        id
    }

    fn define(&mut self, name: &str, ty: &str, kind: Kind, span: Span) -> Result<()> {
        match self.symbols.define(name, ty, kind) {
            Some(_) => Ok(()),
            None => Err(span.wrap(Error::TooManyVariables).into()),
        }
    }

    fn warn(&mut self, warning: Spanned<Warning>) {
        self.warnings.push(warning);
    }

    fn resolve_variable(&self, name: &str, span: Span) -> Result<(Segment, u16)> {
        match self.symbols.get(name) {
            Some(symbol) => Ok((symbol.kind.segment(), symbol.index)),
            None => Err(span.wrap(Error::UndefinedVariable(name.into())).into()),
        }
    }

    /// Returns the current token and advances.
    fn advance(&mut self) -> Result<Token> {
        let next = self.lexer.advance()?;
        Ok(std::mem::replace(&mut self.current, next))
    }

    fn is_keyword(&self, keyword: Keyword) -> bool {
        self.current.is_keyword(keyword)
    }

    fn is_symbol(&self, symbol: Symbol) -> bool {
        self.current.is_symbol(symbol)
    }

    /// Whether the current token may start a type.
    fn is_type(&self) -> bool {
        matches!(
            self.current.kind,
            TokenKind::Keyword(Keyword::Int | Keyword::Char | Keyword::Boolean)
                | TokenKind::Identifier(_)
        )
    }

    /// Advances if the current token is the provided keyword, returning true.
    /// If not, returns false and doesn't advance.
    fn take_keyword(&mut self, keyword: Keyword) -> Result<bool> {
        if self.is_keyword(keyword) {
            self.advance()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Advances if the current token is the provided symbol, returning true.
    /// If not, returns false and doesn't advance.
    fn take_symbol(&mut self, symbol: Symbol) -> Result<bool> {
        if self.is_symbol(symbol) {
            self.advance()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn consume_keyword(&mut self, keyword: Keyword) -> Result<Token> {
        if self.is_keyword(keyword) {
            self.advance()
        } else {
            Err(self.unexpected(Expected::Keyword(keyword)))
        }
    }

    fn consume_any_keyword(&mut self, expected: &'static [Keyword]) -> Result<Keyword> {
        match self.current.kind {
            TokenKind::Keyword(keyword) if expected.contains(&keyword) => {
                self.advance()?;
                Ok(keyword)
            }
            _ => Err(self.unexpected(Expected::AnyKeyword(expected))),
        }
    }

    fn consume_symbol(&mut self, symbol: Symbol) -> Result<Token> {
        if self.is_symbol(symbol) {
            self.advance()
        } else {
            Err(self.unexpected(Expected::Symbol(symbol)))
        }
    }

    fn consume_ident(&mut self) -> Result<(String, Span)> {
        if !matches!(self.current.kind, TokenKind::Identifier(_)) {
            return Err(self.unexpected(Expected::Identifier));
        }
        let token = self.advance()?;
        let span = token.span();
        match token.kind {
            TokenKind::Identifier(name) => Ok((name, span)),
            _ => unreachable!(),
        }
    }

    fn unexpected(&self, expected: Expected) -> CompileError {
        let error = Error::Unexpected {
            expected,
            found: self.current.kind.clone(),
        };
        self.current.span().wrap(error).into()
    }
}

/// What the compiler was looking for when it found something else.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Expected {
    Keyword(Keyword),
    AnyKeyword(&'static [Keyword]),
    Symbol(Symbol),
    Identifier,
    Type,
    Term,
    Eof,
}

impl fmt::Display for Expected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expected::Keyword(keyword) => write!(f, "keyword `{keyword}`"),
            Expected::AnyKeyword(keywords) => {
                f.write_str("one of ")?;
                for (i, keyword) in keywords.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "`{keyword}`")?;
                }
                Ok(())
            }
            Expected::Symbol(symbol) => write!(f, "`{symbol}`"),
            Expected::Identifier => f.write_str("identifier"),
            Expected::Type => f.write_str("type"),
            Expected::Term => f.write_str("term"),
            Expected::Eof => f.write_str("end of input"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Error {
    Lexer(lexer::Error),
    Unexpected {
        expected: Expected,
        found: TokenKind,
    },
    UndefinedVariable(String),
    TooManyVariables,
    TooManyArguments,
    StringTooLong,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Lexer(error) => write!(f, "{error}"),
            Error::Unexpected { expected, found } => {
                write!(f, "expected {expected}, but got {found}")
            }
            Error::UndefinedVariable(name) => write!(f, "variable {name} is not defined"),
            Error::TooManyVariables => f.write_str("too many variables of the same kind"),
            Error::TooManyArguments => f.write_str("too many arguments"),
            Error::StringTooLong => f.write_str("string constant is too long"),
        }
    }
}

/// Non-fatal diagnostics.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Warning {
    /// A bare `return` in a subroutine which declares a return type. Zero is
    /// returned.
    MissingReturnValue,
    /// A `void` subroutine returning a value.
    ReturnValueInVoid,
    /// A call receiver which is neither a variable nor looks like a class
    /// name. It is still called as a class.
    UnresolvedReceiver(String),
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::MissingReturnValue => f.write_str("missing return value, returning 0"),
            Warning::ReturnValueInVoid => f.write_str("returning a value from a void subroutine"),
            Warning::UnresolvedReceiver(name) => {
                write!(f, "{name} is not a variable, calling it as a class")
            }
        }
    }
}

/// A failed compilation. No partial output should be used.
#[derive(Debug)]
pub enum CompileError {
    Syntax(Spanned<Error>),
    Io(io::Error),
}

impl CompileError {
    pub fn as_syntax(&self) -> Option<&Spanned<Error>> {
        match self {
            CompileError::Syntax(error) => Some(error),
            CompileError::Io(_) => None,
        }
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileError::Syntax(Spanned { span, inner }) => write!(f, "{span}: {inner}"),
            CompileError::Io(error) => write!(f, "failed to write output: {error}"),
        }
    }
}

impl std::error::Error for CompileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CompileError::Syntax(_) => None,
            CompileError::Io(error) => Some(error),
        }
    }
}

impl From<io::Error> for CompileError {
    fn from(error: io::Error) -> Self {
        CompileError::Io(error)
    }
}

impl From<Spanned<Error>> for CompileError {
    fn from(error: Spanned<Error>) -> Self {
        CompileError::Syntax(error)
    }
}

impl From<Spanned<lexer::Error>> for CompileError {
    fn from(error: Spanned<lexer::Error>) -> Self {
        CompileError::Syntax(error.map(Error::Lexer))
    }
}

#[cfg(test)]
mod tests {
    use super::{compile, Error, Report};
    use crate::{
        lexer,
        token::{Keyword, TokenKind},
        util::test_utils::vm_tests,
    };
    use pretty_assertions::assert_eq;

    vm_tests! {
        fn empty_class() {
            let class = "class Empty {}";
            let vm_ok = "";
        }

        fn trailing_trivia_is_fine() {
            let class = "class Empty {} // bye\n/* really */\n";
            let vm_ok = "";
        }

        fn if_else() {
            let members = "
                function void f() {
                    var int x, y;
                    if (x > 0) { let y = 1; } else { let y = 0; }
                    return;
                }
            ";
            let vm_ok = "
                function Main.f 2
                push local 0
                push constant 0
                gt
                not
                if-goto IF0_ELSE
                push constant 1
                pop local 1
                goto IF0_OUT
                label IF0_ELSE
                push constant 0
                pop local 1
                label IF0_OUT
                push constant 0
                return
            ";
            let expected_warnings = &[];
        }

        fn method_call_on_field() {
            let class = "
                class Main {
                    field int a, b;
                    field Game game;

                    method void play() {
                        do game.run();
                        return;
                    }
                }
            ";
            let vm_ok = "
                function Main.play 0
                push argument 0
                pop pointer 0
                push this 2
                call Game.run 1
                pop temp 0
                push constant 0
                return
            ";
        }

        fn constructor_allocates_fields() {
            let members = "
                field int x, y;
                static int count;

                constructor Main new(int ax, int ay) {
                    let x = ax;
                    let y = ay;
                    let count = count + 1;
                    return this;
                }
            ";
            let vm_ok = "
                function Main.new 0
                push constant 2
                call Memory.alloc 1
                pop pointer 0
                push argument 0
                pop this 0
                push argument 1
                pop this 1
                push static 0
                push constant 1
                add
                pop static 0
                push pointer 0
                return
            ";
        }

        fn string_constant() {
            let members = r#"
                function void main() {
                    do Output.printString("Hi!");
                    return;
                }
            "#;
            let vm_ok = "
                function Main.main 0
                push constant 3
                call String.new 1
                push constant 72
                call String.appendChar 2
                push constant 105
                call String.appendChar 2
                push constant 33
                call String.appendChar 2
                call Output.printString 1
                pop temp 0
                push constant 0
                return
            ";
        }

        fn operators_without_precedence() {
            let members = "
                function int calc(int a, int b) {
                    return 1 + 2 * 3 - (a / b) & ~a | -b;
                }
            ";
            let vm_ok = "
                function Main.calc 0
                push constant 1
                push constant 2
                add
                push constant 3
                call Math.multiply 2
                push argument 0
                push argument 1
                call Math.divide 2
                sub
                push argument 0
                not
                and
                push argument 1
                neg
                or
                return
            ";
        }

        fn keyword_constants_and_comparisons() {
            let members = "
                function boolean k() {
                    var boolean t;
                    var Array n;
                    let t = true;
                    let t = false;
                    let n = null;
                    return (1 < 2) = (3 > 4);
                }
            ";
            let vm_ok = "
                function Main.k 2
                push constant 1
                neg
                pop local 0
                push constant 0
                pop local 0
                push constant 0
                pop local 1
                push constant 1
                push constant 2
                lt
                push constant 3
                push constant 4
                gt
                eq
                return
            ";
        }

        fn array_access() {
            let members = "
                function void arr(Array a, int i) {
                    var Array b;
                    let a[i] = b[i + 1];
                    let b[0] = a[b[1]];
                    return;
                }
            ";
            let vm_ok = "
                function Main.arr 1
                push argument 0
                push argument 1
                add
                push local 0
                push argument 1
                push constant 1
                add
                add
                pop pointer 1
                push that 0
                pop temp 0
                pop pointer 1
                push temp 0
                pop that 0
                push local 0
                push constant 0
                add
                push argument 0
                push local 0
                push constant 1
                add
                pop pointer 1
                push that 0
                add
                pop pointer 1
                push that 0
                pop temp 0
                pop pointer 1
                push temp 0
                pop that 0
                push constant 0
                return
            ";
        }

        fn nested_labels_share_one_counter() {
            let members = "
                function void loop() {
                    var int i;
                    while (i < 10) {
                        if (i = 5) { let i = i + 2; }
                        let i = i + 1;
                    }
                    if (i) { }
                    return;
                }
            ";
            let vm_ok = "
                function Main.loop 1
                label WHILE0_TOP
                push local 0
                push constant 10
                lt
                not
                if-goto WHILE0_END
                push local 0
                push constant 5
                eq
                not
                if-goto IF1_ELSE
                push local 0
                push constant 2
                add
                pop local 0
                goto IF1_OUT
                label IF1_ELSE
                label IF1_OUT
                push local 0
                push constant 1
                add
                pop local 0
                goto WHILE0_TOP
                label WHILE0_END
                push local 0
                not
                if-goto IF2_ELSE
                goto IF2_OUT
                label IF2_ELSE
                label IF2_OUT
                push constant 0
                return
            ";
        }

        fn call_targets() {
            let members = "
                method int size() { return 0; }

                method void draw(int x) {
                    var Square s;
                    do size();
                    do s.move(x, 2);
                    do Screen.drawPixel(x, size());
                    do lower.case();
                    return;
                }
            ";
            let vm_ok = "
                function Main.size 0
                push argument 0
                pop pointer 0
                push constant 0
                return
                function Main.draw 1
                push argument 0
                pop pointer 0
                push pointer 0
                call Main.size 1
                pop temp 0
                push local 0
                push argument 1
                push constant 2
                call Square.move 3
                pop temp 0
                push argument 1
                push pointer 0
                call Main.size 1
                call Screen.drawPixel 2
                pop temp 0
                call lower.case 0
                pop temp 0
                push constant 0
                return
            ";
            let expected_warnings = &[
                "10:24: warning: lower is not a variable, calling it as a class",
            ];
        }

        fn subroutine_scope_is_reset() {
            let class = "
                class Counter {
                    static int total;
                    field int x;

                    function void a(int x) { let total = x; return; }
                    method void b() { var int total; let total = x; return; }
                }
            ";
            let vm_ok = "
                function Counter.a 0
                push argument 0
                pop static 0
                push constant 0
                return
                function Counter.b 1
                push argument 0
                pop pointer 0
                push this 0
                pop local 0
                push constant 0
                return
            ";
        }

        fn return_warnings() {
            let members = "function int f() { return; }\nmethod void g() { return 1; }";
            let vm_ok = "
                function Main.f 0
                push constant 0
                return
                function Main.g 0
                push argument 0
                pop pointer 0
                push constant 1
                return
            ";
            let expected_warnings = &[
                "2:20: warning: missing return value, returning 0",
                "3:19: warning: returning a value from a void subroutine",
            ];
        }

        fn undefined_variable() {
            let members = "function void f() { let y = 1; return; }";
            let expected_error = "2:25: variable y is not defined";
        }

        fn undefined_array_base() {
            let members = "function int f() { return a[0]; }";
            let expected_error = "2:27: variable a is not defined";
        }

        fn expected_term() {
            let members = "function void f() { var int x; let x = ; return; }";
            let expected_error = "2:40: expected term, but got `;`";
        }

        fn expected_semicolon() {
            let members = "field int x";
            let expected_error = "3:1: expected `;`, but got `}`";
        }

        fn expected_type() {
            let members = "field 1 x;";
            let expected_error = "2:7: expected type, but got integer 1";
        }

        fn expected_class_keyword() {
            let class = "klass Main {}";
            let expected_error = "1:1: expected keyword `class`, but got identifier `klass`";
        }

        fn unexpected_class_member() {
            let members = "var int x;";
            let expected_error = "2:1: expected `}`, but got keyword `var`";
        }

        fn only_one_class_per_source() {
            let class = "class A {} class B {}";
            let expected_error = "1:12: expected end of input, but got keyword `class`";
        }

        fn unclosed_comment_after_class() {
            let class = "class A {} /* ";
            let expected_error = "1:12: unclosed comment";
        }

        fn lexer_error_aborts() {
            let members = r#"function void f() { do Output.printString("oops); return; }"#;
            let expected_error = "2:43: unterminated string constant";
        }

        fn nul_after_class_is_not_end_of_input() {
            let class = "class A {}\0 this is garbage";
            let expected_error = "1:11: unexpected character '\\0'";
        }

        fn capitalized_receivers_are_classes() {
            let members = "function void f() { do Sys.halt(); return; }";
            let expected_warnings = &[];
        }

        fn integer_out_of_range() {
            let members = "function int f() { return 32768; }";
            let expected_error = "2:27: integer constant out of range (maximum is 32767)";
        }
    }

    const DEMOS: [(&str, &str); 3] = [
        ("Main", include_str!("../demos/Main.jack")),
        ("Square", include_str!("../demos/Square.jack")),
        ("SquareGame", include_str!("../demos/SquareGame.jack")),
    ];

    fn compile_ok(src: &str) -> (String, Report) {
        let mut out = Vec::new();
        let report = compile(src, &mut out).expect("demo should compile");
        (String::from_utf8(out).unwrap(), report)
    }

    /// Finds the `(kind, name)` of every subroutine declaration by scanning the
    /// token stream for `constructor`, `function` and `method` keywords.
    fn subroutine_decls(src: &str) -> Vec<(Keyword, String)> {
        let tokens = lexer::lex_all(src).unwrap();
        let mut decls = Vec::new();
        for (i, token) in tokens.iter().enumerate() {
            let TokenKind::Keyword(kind @ (Keyword::Constructor | Keyword::Function | Keyword::Method)) =
                token.kind
            else {
                continue;
            };
            // Skips the return type.
            let TokenKind::Identifier(name) = &tokens[i + 2].kind else {
                panic!("expected subroutine name after {:?}", tokens[i + 1]);
            };
            decls.push((kind, name.clone()));
        }
        decls
    }

    fn lines_after<'a>(vm: &'a str, function: &str) -> Vec<&'a str> {
        vm.lines()
            .skip_while(|line| !line.starts_with(&format!("function {function} ")))
            .skip(1)
            .collect()
    }

    #[test]
    fn one_function_per_subroutine() {
        for (class, src) in DEMOS {
            let (vm, report) = compile_ok(src);
            let decls = subroutine_decls(src);
            let functions: Vec<_> = vm
                .lines()
                .filter_map(|line| line.strip_prefix("function "))
                .map(|rest| rest.split(' ').next().unwrap().to_string())
                .collect();

            let expected: Vec<_> = decls
                .iter()
                .map(|(_, name)| format!("{class}.{name}"))
                .collect();
            assert_eq!(functions, expected);
            assert_eq!(report.functions, expected);
            assert_eq!(report.class_name, class);
            assert_eq!(report.instructions, vm.lines().count());
            assert!(report.warnings.is_empty(), "{class}: {:?}", report.warnings);
        }
    }

    #[test]
    fn local_counts() {
        let (vm, _) = compile_ok(DEMOS[0].1);
        assert!(vm.contains("function Main.main 4\n"));
        assert!(vm.contains("function Main.abs 0\n"));

        let (vm, _) = compile_ok(DEMOS[2].1);
        assert!(vm.contains("function SquareGame.run 2\n"));
        assert!(vm.contains("function SquareGame.moveSquare 0\n"));
    }

    #[test]
    fn method_and_constructor_prologues() {
        let field_counts = [("Main", 0), ("Square", 3), ("SquareGame", 2)];
        for ((class, src), (_, fields)) in DEMOS.into_iter().zip(field_counts) {
            let (vm, _) = compile_ok(src);
            for (kind, name) in subroutine_decls(src) {
                let function = format!("{class}.{name}");
                let body = lines_after(&vm, &function);
                match kind {
                    Keyword::Method => {
                        assert_eq!(body[..2].to_vec(), ["push argument 0", "pop pointer 0"], "{function}");
                        let receivers = body
                            .iter()
                            .take_while(|line| !line.starts_with("function "))
                            .filter(|line| **line == "pop pointer 0")
                            .count();
                        assert_eq!(receivers, 1, "{function}");
                    }
                    Keyword::Constructor => {
                        let push = format!("push constant {fields}");
                        assert_eq!(
                            body[..3].to_vec(),
                            [push.as_str(), "call Memory.alloc 1", "pop pointer 0"],
                            "{function}"
                        );
                    }
                    _ => {}
                }
            }
        }
    }

    #[test]
    fn compilation_is_deterministic() {
        for (_, src) in DEMOS {
            let (first, _) = compile_ok(src);
            let (second, _) = compile_ok(src);
            assert_eq!(first, second);
        }
    }

    #[test]
    fn string_constants_expand_per_char() {
        let text = "The quick brown fox.";
        let src = format!(
            "class S {{ function void f() {{ do Output.printString(\"{text}\"); return; }} }}"
        );
        let (vm, _) = compile_ok(&src);
        let lines: Vec<_> = vm.lines().collect();

        let calls = lines.iter().filter(|line| line.starts_with("call ")).count();
        // One `String.new`, one `String.appendChar` per char, and the print call.
        assert_eq!(calls, 1 + text.len() + 1);

        let new = lines.iter().position(|line| *line == "call String.new 1").unwrap();
        assert_eq!(lines[new - 1], format!("push constant {}", text.len()));
        for (i, byte) in text.bytes().enumerate() {
            let at = new + 1 + 2 * i;
            assert_eq!(lines[at], format!("push constant {byte}"));
            assert_eq!(lines[at + 1], "call String.appendChar 2");
        }
    }

    #[test]
    fn labels_restart_per_file() {
        let src = "class L { function void f() { while (true) { } return; } }";
        let (first, _) = compile_ok(src);
        let (second, _) = compile_ok(src);
        assert!(first.contains("label WHILE0_TOP\n"));
        assert!(second.contains("label WHILE0_TOP\n"));
    }

    #[test]
    fn failures_report_syntax_errors() {
        let error = compile("class {", Vec::new()).unwrap_err();
        let syntax = error.as_syntax().expect("syntax error");
        assert_eq!(syntax.span.lo, 6);
        assert_eq!(
            error.to_string(),
            "6..7: expected identifier, but got `{`"
        );
    }

    #[test]
    fn running_out_of_field_indices() {
        let names: Vec<_> = (0..=u16::MAX).map(|i| format!("f{i}")).collect();
        let src = format!("class A {{ field int {}; }}", names.join(", "));
        let error = compile(&src, std::io::sink()).unwrap_err();
        let syntax = error.as_syntax().expect("syntax error");
        assert_eq!(syntax.inner, Error::TooManyVariables);
        assert_eq!(syntax.span.substr(&src), "f65535");
    }
}
