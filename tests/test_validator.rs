mod common;

use std::io::Write;

use crfkit::{Error, ModelFileProblem, Tagger, Trainer};
use tempfile::NamedTempFile;

use common::{train, weather};

fn file_with(bytes: &[u8]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(bytes).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn test_open_missing_file() {
    let mut tagger = Tagger::new();
    let err = tagger.open("/nonexistent/model.crfsuite").unwrap_err();
    assert!(err.is_invalid_argument());
    assert!(matches!(
        err,
        Error::InvalidModelFile {
            problem: ModelFileProblem::Open(_),
            ..
        }
    ));
    assert!(err.to_string().contains("/nonexistent/model.crfsuite"));
    assert!(!tagger.is_open());
}

#[test]
fn test_open_bad_magic() {
    let file = file_with(&[b'x'; 64]);
    let mut tagger = Tagger::new();
    let err = tagger.open(file.path()).unwrap_err();
    assert!(matches!(
        err,
        Error::InvalidModelFile {
            problem: ModelFileProblem::BadMagic,
            ..
        }
    ));
    assert!(err.to_string().starts_with("Invalid model file (magic mismatch)"));
}

#[test]
fn test_open_truncated_header() {
    let mut bytes = b"lCRF".to_vec();
    bytes.resize(48, 0);
    let file = file_with(&bytes);
    let mut tagger = Tagger::new();
    let err = tagger.open(file.path()).unwrap_err();
    assert!(matches!(
        err,
        Error::InvalidModelFile {
            problem: ModelFileProblem::IncompleteHeader,
            ..
        }
    ));

    let err = tagger.open_in_memory(bytes).unwrap_err();
    assert_eq!(
        err.to_string(),
        "Model file doesn't have a complete header: <memory>"
    );
}

#[test]
fn test_close_is_idempotent() {
    let (xseq, yseq) = weather();
    let mut trainer = Trainer::new();
    trainer.append(&xseq, &yseq, 0).unwrap();
    trainer.set("max_iterations", 10).unwrap();
    let model_file = train(&mut trainer);

    let mut tagger = Tagger::new();
    tagger.open(model_file.path()).unwrap().detach();
    assert!(tagger.is_open());
    tagger.close();
    tagger.close();
    assert!(!tagger.is_open());
    let err = tagger.labels().unwrap_err();
    assert_eq!(err.to_string(), "The tagger is not opened");
}
