use criterion::{black_box, criterion_group, criterion_main, Criterion};
use crfkit::{Attribute, Tagger, Trainer};

fn weather() -> (Vec<Vec<Attribute>>, Vec<&'static str>) {
    let xseq = vec![
        vec![Attribute::new("walk", 1.0), Attribute::new("shop", 0.5)],
        vec![Attribute::new("walk", 1.0)],
        vec![Attribute::new("walk", 1.0), Attribute::new("clean", 0.5)],
        vec![Attribute::new("shop", 0.5), Attribute::new("clean", 0.5)],
        vec![Attribute::new("walk", 0.5), Attribute::new("clean", 1.0)],
        vec![Attribute::new("clean", 1.0), Attribute::new("shop", 0.1)],
        vec![Attribute::new("walk", 1.0), Attribute::new("shop", 0.5)],
        vec![],
        vec![Attribute::new("clean", 1.0)],
    ];
    let yseq = vec![
        "sunny", "sunny", "sunny", "rainy", "rainy", "rainy", "sunny", "sunny", "rainy",
    ];
    (xseq, yseq)
}

fn criterion_benchmark(c: &mut Criterion) {
    let (xseq, yseq) = weather();
    let model_file = tempfile::NamedTempFile::new().unwrap();
    let mut trainer = Trainer::new();
    trainer.append(&xseq, &yseq, 0).unwrap();
    trainer.set("max_iterations", 50).unwrap();
    trainer.train(model_file.path(), None).unwrap();

    let mut group = c.benchmark_group("tag");
    group.bench_function("viterbi", |b| {
        let mut tagger = Tagger::new();
        let mut tagger = tagger.open(model_file.path()).unwrap();
        b.iter(|| {
            let _res = tagger.tag(black_box(&xseq)).unwrap();
        })
    });
    group.bench_function("marginals", |b| {
        let mut tagger = Tagger::new();
        let mut tagger = tagger.open(model_file.path()).unwrap();
        tagger.set(&xseq).unwrap();
        b.iter(|| {
            let _p = tagger.probability(black_box(&yseq)).unwrap();
        })
    });
    group.finish();

    c.bench_function("train_lbfgs", |b| {
        b.iter(|| {
            let mut trainer = Trainer::new();
            trainer.append(black_box(&xseq), &yseq, 0).unwrap();
            trainer.set("max_iterations", 20).unwrap();
            trainer.train("", None).unwrap();
        })
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
