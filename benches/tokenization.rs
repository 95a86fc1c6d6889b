use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use subwtok::bpe::{learn_bpe, BpeApplier, BpeConfig, EncodingConfig};
use subwtok::wpm::WordPieceEncoder;

fn corpus(sentences: usize) -> Vec<String> {
    (0..sentences)
        .map(|i| format!("the quick brown fox jumps over the lazy dog number {i}"))
        .collect()
}

fn bench_train(c: &mut Criterion) {
    let mut group = c.benchmark_group("bpe_train");
    for size in &[50, 200] {
        let sentences = corpus(*size);
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| learn_bpe(black_box(&sentences), 300, &BpeConfig::default()));
        });
    }
    group.finish();
}

fn bench_encode(c: &mut Criterion) {
    let sentences = corpus(200);
    let state = learn_bpe(&sentences, 300, &BpeConfig::default()).unwrap();
    let applier = BpeApplier::new(state, 1);
    let config = EncodingConfig::default();

    let mut group = c.benchmark_group("bpe_encode");
    for batch_size in &[10, 100, 1000] {
        let batch = corpus(*batch_size);
        group.bench_with_input(BenchmarkId::from_parameter(batch_size), batch_size, |b, _| {
            b.iter(|| applier.encode_as_ids(black_box(&batch), &config));
        });
    }
    group.finish();
}

fn bench_encode_parallel(c: &mut Criterion) {
    let sentences = corpus(200);
    let state = learn_bpe(&sentences, 300, &BpeConfig::default()).unwrap();
    let applier = BpeApplier::new(state, 4);
    let config = EncodingConfig::default();
    let batch = corpus(1000);

    c.bench_function("bpe_encode_4_threads", |b| {
        b.iter(|| applier.encode_as_ids(black_box(&batch), &config));
    });
}

fn wordpiece_vocab() -> Vec<String> {
    let mut vocab = vec!["[UNK]".to_string(), "[PAD]".to_string()];
    vocab.extend(
        ["the", "quick", "brown", "fox", "jump", "##s", "over", "lazy", "dog", "number"]
            .iter()
            .map(|s| s.to_string()),
    );
    for n in 0..50 {
        vocab.push(format!("##{n}"));
    }
    vocab
}

fn bench_wordpiece_encode(c: &mut Criterion) {
    let vocab = wordpiece_vocab();
    let encoder = WordPieceEncoder::new(&vocab, 1).unwrap();

    let mut group = c.benchmark_group("wordpiece_encode");
    for size in &[10, 100, 1000] {
        let text = "the quick brown fox jumps over the lazy dog ".repeat(*size);
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| encoder.encode_as_ids(black_box(&text)));
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_train,
    bench_encode,
    bench_encode_parallel,
    bench_wordpiece_encode
);
criterion_main!(benches);
