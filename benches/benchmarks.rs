use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::hint::black_box;
use ipfinder::{detect_ip_column, DetectionPolicy, InputTable};

// A flow-log style table with the IP column in the middle
fn generate_table(rows: usize, header: &str) -> InputTable {
    let headers = vec![
        "timestamp".to_string(),
        "proto".to_string(),
        header.to_string(),
        "bytes".to_string(),
    ];
    let body = (0..rows)
        .map(|i| {
            vec![
                format!("2024-01-01T00:00:{:02}Z", i % 60),
                if i % 2 == 0 { "tcp" } else { "udp" }.to_string(),
                if i % 3 == 0 {
                    format!("2001:db8:{:x}::{:x}", i % 65536, (i * 7) % 65536)
                } else {
                    format!("{}.{}.{}.{}", (i % 223) + 1, (i * 7) % 256, (i * 13) % 256, (i * 17) % 256)
                },
                (i * 31).to_string(),
            ]
        })
        .collect();
    InputTable::from_parts(headers, body)
}

fn bench_detection(c: &mut Criterion) {
    let policy = DetectionPolicy::default();
    let mut group = c.benchmark_group("detect_ip_column");

    for &rows in &[100usize, 10_000] {
        // header hit: only the sample is scanned
        let by_header = generate_table(rows, "dstAddr");
        group.bench_with_input(BenchmarkId::new("header", rows), &by_header, |b, t| {
            b.iter(|| detect_ip_column(black_box(t), &policy, None).unwrap())
        });

        // no useful header: every column gets sampled
        let by_values = generate_table(rows, "peer");
        group.bench_with_input(BenchmarkId::new("values", rows), &by_values, |b, t| {
            b.iter(|| detect_ip_column(black_box(t), &policy, None).unwrap())
        });
    }
    group.finish();
}

criterion_group!(benches, bench_detection);
criterion_main!(benches);
