use std::hint::black_box;

use codspeed_criterion_compat::{Criterion, criterion_group, criterion_main};
use stratum_fixtures::{arithmetic, sum};
use stratum_inputs::ChangedRange;
use stratum_tree::{DEFAULT_MIN_GAP, Parser as _, TreeFragment};

fn benchmark_incremental(c: &mut Criterion) {
    let grammar = arithmetic::grammar();
    let old_text = sum(5000);
    let old = grammar.parse(&old_text).unwrap();

    let at = old_text.len() / 2;
    let at = at + old_text[at..].find('+').unwrap() + 1;
    let new_text = format!("{}42+{}", &old_text[..at], &old_text[at..]);
    let fragments = TreeFragment::apply_changes(
        &TreeFragment::add_tree(old, &[], false),
        &[ChangedRange::replace(at as u32, at as u32, 3)],
        DEFAULT_MIN_GAP,
    );

    let mut group = c.benchmark_group("Incremental Benchmark");
    group.bench_function("reparse_after_insert", |b| {
        b.iter(|| black_box(grammar.parse_incremental(&new_text, &fragments, &[]).unwrap()));
    });
    group.bench_function("full_parse_after_insert", |b| {
        b.iter(|| black_box(grammar.parse(&new_text).unwrap()));
    });
    group.finish();
}

criterion_group!(benches, benchmark_incremental);
criterion_main!(benches);
