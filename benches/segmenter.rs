//! Benchmarks for transcript segmentation and lenient JSON parsing
//!
//! Segmentation runs once per stage per episode on inputs up to a few
//! hundred kilobytes; lenient parsing runs on every model reply.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rf_pipeline::hashing::hash_str;
use rf_pipeline::json_repair::parse_lenient;
use rf_pipeline::segment::segment_text;

/// Build a transcript of `paragraphs` paragraphs with varying sentence counts.
fn transcript(paragraphs: usize) -> String {
    let mut text = String::new();
    for p in 0..paragraphs {
        for s in 0..(p % 7 + 2) {
            text.push_str(&format!(
                "In part {p} the speaker explains point {s} \
                 about how rivers shaped early trade routes. "
            ));
        }
        text.push_str("\n\n");
    }
    text
}

/// Same size as `transcript`, but with no paragraph breaks at all.
fn run_on(len: usize) -> String {
    "and then the current carried the boats downstream ".repeat(len / 50 + 1)
}

const REPLY_CLEAN: &str = concat!(
    r#"{"corrected_text":"The river ran through the town.","#,
    r#""corrections":[{"original":"rivr","corrected":"river","reason":"spelling"}]}"#
);

const REPLY_FENCED: &str = "Here is the result:\n```json\n\
    {\"corrected_text\": \"The river ran.\", \"corrections\": [],}\n```\n\
    Let me know if you need more.";

fn bench_segment_paragraphs(c: &mut Criterion) {
    let mut group = c.benchmark_group("segment_paragraphs");

    for paragraphs in [10, 100, 1_000] {
        let text = transcript(paragraphs);
        group.throughput(Throughput::Bytes(text.len() as u64));
        group.bench_with_input(BenchmarkId::new("paragraphs", paragraphs), &text, |b, text| {
            b.iter(|| segment_text(black_box(text), 10_000));
        });
    }

    group.finish();
}

fn bench_segment_fallbacks(c: &mut Criterion) {
    let mut group = c.benchmark_group("segment_fallbacks");

    // Sentence splitting only
    let text = run_on(50_000).replace("downstream ", "downstream. ");
    group.throughput(Throughput::Bytes(text.len() as u64));
    group.bench_function("sentences", |b| {
        b.iter(|| segment_text(black_box(&text), 2_000));
    });

    // Hard character cuts
    let text = "x".repeat(50_000);
    group.throughput(Throughput::Bytes(text.len() as u64));
    group.bench_function("hard_split", |b| {
        b.iter(|| segment_text(black_box(&text), 2_000));
    });

    group.finish();
}

fn bench_parse_lenient(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_lenient");

    group.bench_function("clean", |b| {
        b.iter(|| parse_lenient(black_box(REPLY_CLEAN)));
    });
    group.bench_function("fenced_trailing_comma", |b| {
        b.iter(|| parse_lenient(black_box(REPLY_FENCED)));
    });

    group.finish();
}

fn bench_hash_transcript(c: &mut Criterion) {
    let text = transcript(1_000);
    let mut group = c.benchmark_group("hash");
    group.throughput(Throughput::Bytes(text.len() as u64));
    group.bench_function("transcript", |b| {
        b.iter(|| hash_str(black_box(&text)));
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_segment_paragraphs,
    bench_segment_fallbacks,
    bench_parse_lenient,
    bench_hash_transcript
);
criterion_main!(benches);
