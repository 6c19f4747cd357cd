#![allow(dead_code)]

use crfkit::{Attribute, Tagger, Trainer};
use tempfile::NamedTempFile;

/// One weather sequence: activities observed over nine days
pub fn weather() -> (Vec<Vec<Attribute>>, Vec<&'static str>) {
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

/// Linearly separable alternation of `a -> X` and `b -> Y`
pub fn alternating() -> (Vec<Vec<&'static str>>, Vec<&'static str>) {
    (
        vec![vec!["a"], vec!["b"], vec!["a"], vec!["b"]],
        vec!["X", "Y", "X", "Y"],
    )
}

/// Train into a temporary model file
pub fn train(trainer: &mut Trainer) -> NamedTempFile {
    let model_file = NamedTempFile::new().unwrap();
    trainer.train(model_file.path(), None).unwrap();
    model_file
}

/// Tag `xseq` with the model stored in `model_file`
pub fn tag<X: crfkit::IntoItemSequence>(model_file: &NamedTempFile, xseq: X) -> Vec<String> {
    let mut tagger = Tagger::new();
    let mut tagger = tagger.open(model_file.path()).unwrap();
    tagger.tag(xseq).unwrap()
}

pub fn accuracy<S: AsRef<str>>(predicted: &[String], reference: &[S]) -> f64 {
    let correct = predicted
        .iter()
        .zip(reference)
        .filter(|(p, r)| p.as_str() == r.as_ref())
        .count();
    correct as f64 / reference.len() as f64
}
