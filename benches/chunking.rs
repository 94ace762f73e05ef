use criterion::{Criterion, criterion_group, criterion_main};
use docs_rag::embeddings::chunking::{ChunkingConfig, chunk_text};
use std::hint::black_box;

fn sample_document() -> String {
    let paragraph = "Ownership is a set of rules that govern how a Rust program manages memory. \
        Some languages have garbage collection that regularly looks for no-longer-used memory \
        as the program runs; in other languages, the programmer must explicitly allocate and \
        free the memory. Rust uses a third approach: memory is managed through a system of \
        ownership with a set of rules that the compiler checks.\r\n\r\n";
    paragraph.repeat(400)
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let document = sample_document();
    let config = ChunkingConfig::default();
    c.bench_function("chunk_text", |b| {
        b.iter(|| chunk_text(black_box(&document), black_box(&config)))
    });

    let unicode = "Größenänderung der Überschrift, ключевые слова 検索 ".repeat(4000);
    c.bench_function("chunk_text_multibyte", |b| {
        b.iter(|| chunk_text(black_box(&unicode), black_box(&config)))
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
