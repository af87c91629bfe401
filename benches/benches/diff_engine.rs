//! Benchmarks for the line diff engine
//!
//! Performance-critical paths:
//! - `compute_diff`: Myers alignment, pairing and hunk grouping
//! - Inline character diffs on modified lines
//! - `render_unified`: Text rendering of a computed diff

#![allow(missing_docs)]

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use redline_kernel::diff::{DiffOptions, compute_diff, render_unified};

/// Source-like text with `lines` lines.
fn source_text(lines: usize) -> String {
    (0..lines)
        .map(|i| match i % 5 {
            0 => format!("fn handler_{i}(input: &str) -> usize {{\n"),
            1 => format!("    let value = input.len() + {i};\n"),
            2 => "    // keep going\n".to_string(),
            3 => "    value\n".to_string(),
            _ => "}\n".to_string(),
        })
        .collect()
}

/// Same text with every `stride`-th line edited.
fn edited(text: &str, stride: usize) -> String {
    text.lines()
        .enumerate()
        .map(|(i, line)| {
            if i % stride == 0 {
                format!("{line} // edited\n")
            } else {
                format!("{line}\n")
            }
        })
        .collect()
}

fn bench_scattered_edits(c: &mut Criterion) {
    let mut group = c.benchmark_group("diff_engine/scattered_edits");

    for lines in [100usize, 1_000, 10_000] {
        let original = source_text(lines);
        let proposed = edited(&original, 50);
        let options = DiffOptions::default();

        group.throughput(Throughput::Bytes(original.len() as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{lines}_lines")),
            &lines,
            |b, _| b.iter(|| compute_diff(black_box(&original), black_box(&proposed), &options)),
        );
    }

    group.finish();
}

fn bench_inline_diffs(c: &mut Criterion) {
    let mut group = c.benchmark_group("diff_engine/inline");
    let original = source_text(1_000);
    let proposed = edited(&original, 3);

    let with_inline = DiffOptions::default();
    let without_inline = DiffOptions::builder()
        .compute_inline_diffs(false)
        .build()
        .unwrap();

    group.bench_function("enabled", |b| {
        b.iter(|| compute_diff(black_box(&original), black_box(&proposed), &with_inline));
    });
    group.bench_function("disabled", |b| {
        b.iter(|| compute_diff(black_box(&original), black_box(&proposed), &without_inline));
    });

    group.finish();
}

fn bench_rewrite(c: &mut Criterion) {
    let mut group = c.benchmark_group("diff_engine/full_rewrite");

    // Nothing in common: worst case for the alignment.
    for lines in [100usize, 1_000] {
        let original = source_text(lines);
        let proposed = original.replace("fn ", "pub fn ").replace("value", "result");
        let options = DiffOptions::default();

        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{lines}_lines")),
            &lines,
            |b, _| b.iter(|| compute_diff(black_box(&original), black_box(&proposed), &options)),
        );
    }

    group.finish();
}

fn bench_render_unified(c: &mut Criterion) {
    let original = source_text(5_000);
    let proposed = edited(&original, 20);
    let result = compute_diff(&original, &proposed, &DiffOptions::default());

    c.bench_function("diff_engine/render_unified", |b| {
        b.iter(|| render_unified(black_box(&result), "a/src/lib.rs", "b/src/lib.rs"));
    });
}

criterion_group!(
    benches,
    bench_scattered_edits,
    bench_inline_diffs,
    bench_rewrite,
    bench_render_unified
);
criterion_main!(benches);
