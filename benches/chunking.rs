use criterion::{Criterion, criterion_group, criterion_main};
use docs_rag::embeddings::chunking::{ChunkingConfig, chunk_text};
use docs_rag::extractor::markdown_to_text;
use std::hint::black_box;

fn sample_markdown() -> String {
    let section = "## Opening hours\n\nWe are open **Monday** to *Friday*, nine until five. \
                   Weekend hours vary with the season; see the [calendar](https://example.com).\n\n\
                   - Espresso\n- Filter coffee\n- Tea\n\n\
                   | Item | Price |\n|------|-------|\n| Latte | 4 |\n\n";
    section.repeat(400)
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let markdown = sample_markdown();
    let text = markdown_to_text(&markdown);
    let config = ChunkingConfig::default();

    c.bench_function("markdown_to_text", |b| {
        b.iter(|| markdown_to_text(black_box(&markdown)))
    });
    c.bench_function("chunking", |b| {
        b.iter(|| chunk_text(black_box(&text), black_box(&config)))
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
