use criterion::{criterion_group, criterion_main, Criterion};
use tally_core::evaluate;

fn bench_short_expression(c: &mut Criterion) {
    c.bench_function("evaluate_short_expression", |b| {
        b.iter(|| {
            let value = evaluate("2+3*4-5/2");
            if let Err(err) = value {
                panic!("short benchmark expression failed: {err}");
            }
        });
    });
}

fn bench_long_chain(c: &mut Criterion) {
    let mut rendered = String::from("1");
    for index in 0..1_000 {
        let operator = match index % 3 {
            0 => '+',
            1 => '-',
            _ => '*',
        };
        rendered.push(operator);
        rendered.push_str("1.5");
    }

    c.bench_function("evaluate_chain_1000_terms", |b| {
        b.iter(|| {
            let value = evaluate(&rendered);
            if let Err(err) = value {
                panic!("chain benchmark expression failed: {err}");
            }
        });
    });
}

criterion_group!(eval_benches, bench_short_expression, bench_long_chain);
criterion_main!(eval_benches);
