// transpile_bench.rs - Transpilation throughput on grammar-shaped patterns.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use onig2es::{compile, to_regexp_details, Options};

// A TypeScript-grammar-flavored pattern: classes, lookarounds, POSIX
// brackets, the usual TextMate fare.
const GRAMMAR_PATTERN: &str = r"(?x)
  (?<!\+\+|--)(?<=[({\[,?=>:*]|&&|\|\||\?|^return|[^._$[:alnum:]]return|^default|[^._$[:alnum:]]default|^)\s*
  (?!<\s*[_$[:alpha:]][_$[:alnum:]]*((\s+extends\s+[^=>])|,))
  (?=(<)\s*(?:([_$[:alpha:]][-_$[:alnum:].]*)(?<!\.|-)(:))?((?:[a-z][a-z0-9]*|([_$[:alpha:]][-_$[:alnum:].]*))(?<!\.|-))(?=((<\s*)|(\s+))(?!\?)|\/?>))";

fn bench_simple(c: &mut Criterion) {
    c.bench_function("compile_date_pattern", |b| {
        b.iter(|| {
            compile(black_box(r"(\d{4})-(\d{2})-(\d{2})"), "", &Options::default()).unwrap()
        })
    });
}

fn bench_grammar(c: &mut Criterion) {
    c.bench_function("compile_grammar_pattern", |b| {
        b.iter(|| compile(black_box(GRAMMAR_PATTERN), "", &Options::default()).unwrap())
    });
}

fn bench_subroutine_expansion(c: &mut Criterion) {
    c.bench_function("details_subroutines", |b| {
        b.iter(|| {
            to_regexp_details(
                black_box(r"(?<pair>\((?:[^()]|\g<pair>)*\))"),
                &Options::default(),
            )
            .unwrap()
        })
    });
}

criterion_group!(benches, bench_simple, bench_grammar, bench_subroutine_expansion);
criterion_main!(benches);
