/// The lexer takes the source input, mapping it into a sequence of tokens.
pub mod lexer;

/// The compiler pulls tokens from the lexer and emits VM code as it parses,
/// without building a syntax tree.
pub mod compiler;

/// Class and subroutine scoped bindings of identifiers to VM storage.
pub mod symbol_table;

pub mod token;
pub mod vm;

pub mod util {
    pub mod fmt;
    #[cfg(test)]
    pub(crate) mod test_utils;
}
