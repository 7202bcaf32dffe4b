use std::fmt::{self, Formatter};

use crate::{
    compiler::{self, CompileError},
    lexer,
    token::{Span, Spanned},
    util::fmt::{Context, Show},
};

/// With the alternate flag (`{:#}`), prefixes the diagnostic with its
/// `line:column` location.
fn location(f: &mut Formatter<'_>, span: Span, ctx: &Context<'_>) -> fmt::Result {
    if f.alternate() {
        let (line, col) = ctx.line_col(span);
        write!(f, "{line}:{col}: ")?;
    }
    Ok(())
}

impl Show for Spanned<lexer::Error> {
    fn show(&self, f: &mut Formatter<'_>, ctx: &Context<'_>) -> fmt::Result {
        location(f, self.span, ctx)?;
        write!(f, "{}", self.inner)
    }
}

impl Show for Spanned<compiler::Error> {
    fn show(&self, f: &mut Formatter<'_>, ctx: &Context<'_>) -> fmt::Result {
        let Spanned { span, inner: error } = self;
        location(f, *span, ctx)?;
        write!(f, "{error}")
    }
}

impl Show for Spanned<compiler::Warning> {
    fn show(&self, f: &mut Formatter<'_>, ctx: &Context<'_>) -> fmt::Result {
        location(f, self.span, ctx)?;
        write!(f, "warning: {}", self.inner)
    }
}

impl Show for CompileError {
    fn show(&self, f: &mut Formatter<'_>, ctx: &Context<'_>) -> fmt::Result {
        match self {
            CompileError::Syntax(error) => error.show(f, ctx),
            CompileError::Io(error) => write!(f, "failed to write output: {error}"),
        }
    }
}
