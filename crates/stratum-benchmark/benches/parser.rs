use std::hint::black_box;

use codspeed_criterion_compat::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use stratum_fixtures::{arithmetic, list, sum};
use stratum_inputs::ChunkedInput;
use stratum_tree::Parser as _;

fn benchmark_parser(c: &mut Criterion) {
    let nested = format!("[{}]", vec!["[1 two [null 3] []]"; 200].join(" "));
    let cases = vec![
        ("sum", arithmetic::grammar(), sum(2000)),
        ("ambiguous_sum", arithmetic::ambiguous(), sum(500)),
        ("nested_lists", list::grammar(), nested),
        ("broken_lists", list::grammar(), "[1 [2 ] ]] [ 3 [".repeat(100)),
    ];

    let mut group = c.benchmark_group("Parser Benchmark");
    for (name, grammar, text) in cases {
        group.throughput(Throughput::Bytes(text.len() as u64));
        group.bench_with_input(BenchmarkId::new("parse", name), &text, |b, text| {
            b.iter(|| black_box(grammar.parse(text).unwrap()));
        });
    }

    let text = sum(2000);
    let chunked = ChunkedInput::split(&text, 512);
    let grammar = arithmetic::grammar();
    group.throughput(Throughput::Bytes(text.len() as u64));
    group.bench_function("parse_chunked", |b| {
        b.iter(|| black_box(grammar.parse(&chunked).unwrap()));
    });
    group.finish();
}

criterion_group!(benches, benchmark_parser);
criterion_main!(benches);
