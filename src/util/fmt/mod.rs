pub mod error;

pub struct Context<'src> {
    /// The source text the spans refer to.
    pub src: &'src str,
}

impl Context<'_> {
    /// Returns the one-based `(line, column)` pair where the span starts.
    pub fn line_col(&self, span: crate::token::Span) -> (usize, usize) {
        span.line_col(self.src)
    }
}

/// Analogous to [`std::fmt::Display`], but also contains the program context,
/// such as the source text spans are resolved against.
pub trait Show {
    fn show(&self, f: &mut std::fmt::Formatter<'_>, ctx: &Context<'_>) -> std::fmt::Result;

    /// Returns a type which can be displayed.
    fn display<'a>(&'a self, ctx: &'a Context<'_>) -> impl std::fmt::Display + 'a
    where
        Self: Sized,
    {
        Display(self, ctx)
    }
}

struct Display<'this, 'ctx, 'src, T: Show>(pub &'this T, pub &'ctx Context<'src>);

impl<T> std::fmt::Display for Display<'_, '_, '_, T>
where
    T: Show,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let Display(this, ctx) = self;
        this.show(f, ctx)
    }
}
