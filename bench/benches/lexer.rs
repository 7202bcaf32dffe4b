use criterion::{criterion_group, criterion_main, Criterion};
use jack::{
    lexer::{self, Lexer},
    token::TokenKind,
};
use std::hint::black_box;

static INPUTS: [&str; 3] = [
    include_str!("../../demos/Main.jack"),
    include_str!("../../demos/Square.jack"),
    include_str!("../../demos/SquareGame.jack"),
];

fn lexer_eager(input: &str) {
    let tokens = lexer::lex_all(input).map_or(0, |tokens| tokens.len());
    black_box(tokens);
}

fn lexer_incremental(input: &str) {
    let mut lexer = Lexer::new(input);
    let mut i = 0;
    while lexer.has_more_tokens() {
        match lexer.advance() {
            Ok(token) if token.kind == TokenKind::Eof => break,
            Ok(_) => i += 1,
            Err(_) => break,
        }
    }
    black_box(i);
}

fn criterion_benchmark(c: &mut Criterion) {
    c.bench_function("eager", |b| {
        b.iter(|| INPUTS.iter().for_each(|input| lexer_eager(black_box(input))));
    });
    c.bench_function("incremental", |b| {
        b.iter(|| {
            INPUTS
                .iter()
                .for_each(|input| lexer_incremental(black_box(input)));
        });
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
