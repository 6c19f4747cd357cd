mod common;

use crfkit::{Algorithm, Trainer};

use common::{accuracy, alternating, tag, train, weather};

/// Test that AP algorithm can train and produce predictions
#[test]
fn test_ap_basic_training() {
    let (xseq, yseq) = weather();

    let mut trainer = Trainer::builder()
        .algorithm(Algorithm::AveragedPerceptron)
        .param("max_iterations", 50)
        .param("epsilon", 0.01)
        .seed(1)
        .build()
        .unwrap();
    trainer.append(&xseq, &yseq, 0).unwrap();
    let model_file = train(&mut trainer);

    let predicted = tag(&model_file, &xseq);
    let acc = accuracy(&predicted, &yseq);
    assert!(acc > 0.7, "AP accuracy too low: {:.2}%", acc * 100.0);
}

#[test]
fn test_ap_convergence() {
    let (xseq, yseq) = alternating();
    let mut trainer = Trainer::new();
    trainer.select("ap", "crf1d").unwrap();
    trainer.set_seed(Some(1));
    trainer.set("max_iterations", 100).unwrap();
    trainer.set("epsilon", 0.5).unwrap();
    trainer.append(&xseq, &yseq, 0).unwrap();
    let model_file = train(&mut trainer);

    assert_eq!(tag(&model_file, &xseq), yseq);
    // A separable set reaches zero errors and stops early
    let log = trainer.log_parser();
    assert!(log.iterations.len() < 100);
    assert_eq!(log.last_iteration().unwrap().loss, Some(0.0));
}

#[test]
fn test_ap_seed_is_reproducible() {
    let (xseq, yseq) = weather();
    let run = || {
        let mut trainer = Trainer::builder()
            .algorithm(Algorithm::AveragedPerceptron)
            .param("max_iterations", 10)
            .seed(42)
            .build()
            .unwrap();
        trainer.append(&xseq, &yseq, 0).unwrap();
        let model_file = train(&mut trainer);
        std::fs::read(model_file.path()).unwrap()
    };
    assert_eq!(run(), run());
}
