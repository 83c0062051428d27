// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Criterion benchmarks for the dokwerk-engine facade: annotation throughput on
// one open document, and open/dispose churn through the handle table.

use criterion::{Criterion, black_box, criterion_group, criterion_main};

use dokwerk_core::{AnnotationType, DocumentFormat, Rect};
use dokwerk_document::formats::pdf::PdfWriter;
use dokwerk_engine::Engine;

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

fn sample_pdf() -> Vec<u8> {
    PdfWriter::new()
        .with_title("Bench")
        .create_from_pages(&["one", "two", "three"])
        .expect("build sample pdf")
}

// ---------------------------------------------------------------------------
// Benchmarks
// ---------------------------------------------------------------------------

/// Annotate page 2 of an open three-page PDF. The document is recreated every
/// 10k iterations so the annotation list stays bounded.
fn bench_annotate(c: &mut Criterion) {
    let engine = Engine::default();
    let pdf = sample_pdf();
    let mut handle = engine.open(pdf.clone(), DocumentFormat::Pdf).expect("open");
    let mut count = 0u32;

    c.bench_function("annotate (3-page pdf)", |b| {
        b.iter(|| {
            count += 1;
            if count % 10_000 == 0 {
                engine.dispose(handle);
                handle = engine.open(pdf.clone(), DocumentFormat::Pdf).expect("reopen");
            }
            let id = engine
                .annotate(
                    black_box(handle),
                    2,
                    Rect::new(10.0, 10.0, 50.0, 20.0),
                    "benchmark note",
                    AnnotationType::Highlight,
                )
                .expect("annotate");
            black_box(id);
        });
    });
}

/// Open and immediately dispose an opaque Office blob. Measures the handle
/// table and metadata fingerprinting without PDF parsing.
fn bench_open_dispose(c: &mut Criterion) {
    let engine = Engine::default();
    let blob = vec![0x50u8; 64 * 1024];

    c.bench_function("open_dispose (64 KiB docx)", |b| {
        b.iter(|| {
            let handle = engine
                .open(black_box(blob.clone()), DocumentFormat::Docx)
                .expect("open");
            black_box(engine.dispose(handle));
        });
    });
}

criterion_group!(benches, bench_annotate, bench_open_dispose);
criterion_main!(benches);
