//! Scrollback benchmarks for subshell
//! Measures the per-line cost paid by the supervisor loop: push, snapshot and framing

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;
use subshell::display::frame_rows;
use subshell::subprocess::BoundedLineBuffer;

fn sample_lines(count: usize) -> Vec<String> {
    (0..count)
        .map(|i| format!("[{:>6}] compiling crate number {} with some padding text", i, i))
        .collect()
}

fn bench_push(c: &mut Criterion) {
    let mut group = c.benchmark_group("buffer_push");
    let lines = sample_lines(10_000);
    group.throughput(Throughput::Elements(lines.len() as u64));

    for capacity in [1usize, 10, 100] {
        group.bench_with_input(
            BenchmarkId::from_parameter(capacity),
            &capacity,
            |b, &capacity| {
                b.iter(|| {
                    let mut buffer = BoundedLineBuffer::new(capacity);
                    for line in &lines {
                        buffer.push(line.as_str());
                    }
                    black_box(buffer.len())
                })
            },
        );
    }
    group.finish();
}

/// Push followed by a snapshot and framing, as done for every delivered line
fn bench_push_and_refresh(c: &mut Criterion) {
    let mut group = c.benchmark_group("buffer_refresh");
    let lines = sample_lines(1_000);
    group.throughput(Throughput::Elements(lines.len() as u64));

    for capacity in [10usize, 50] {
        group.bench_with_input(
            BenchmarkId::from_parameter(capacity),
            &capacity,
            |b, &capacity| {
                b.iter(|| {
                    let mut buffer = BoundedLineBuffer::new(capacity);
                    for line in &lines {
                        buffer.push(line.as_str());
                        black_box(frame_rows(&buffer.snapshot(), capacity));
                    }
                })
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_push, bench_push_and_refresh);
criterion_main!(benches);
