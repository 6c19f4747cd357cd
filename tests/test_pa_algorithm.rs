mod common;

use crfkit::{Algorithm, ParamValue, Trainer};

use common::{accuracy, alternating, tag, train, weather};

#[test]
fn test_pa_basic_training() {
    let (xseq, yseq) = weather();

    let mut trainer = Trainer::builder()
        .algorithm(Algorithm::PassiveAggressive)
        .param("max_iterations", 50)
        .seed(1)
        .build()
        .unwrap();
    trainer.append(&xseq, &yseq, 0).unwrap();
    let model_file = train(&mut trainer);

    let predicted = tag(&model_file, &xseq);
    let acc = accuracy(&predicted, &yseq);
    assert!(acc > 0.5, "PA accuracy too low: {:.2}%", acc * 100.0);
}

#[test]
fn test_pa_types() {
    let (xseq, yseq) = weather();
    for pa_type in 0..=2 {
        for averaging in [true, false] {
            let mut trainer = Trainer::new();
            trainer.select("pa", "crf1d").unwrap();
            trainer.set_seed(Some(1));
            trainer.set("type", pa_type).unwrap();
            trainer.set("averaging", averaging).unwrap();
            trainer.set("max_iterations", 20).unwrap();
            trainer.append(&xseq, &yseq, 0).unwrap();
            let model_file = train(&mut trainer);
            assert_eq!(tag(&model_file, &xseq).len(), yseq.len());
        }
    }
}

#[test]
fn test_pa_convergence() {
    let (xseq, yseq) = alternating();

    let mut trainer = Trainer::builder()
        .algorithm(Algorithm::PassiveAggressive)
        .param("max_iterations", 100)
        .param("epsilon", 0.000001)
        .seed(1)
        .build()
        .unwrap();
    trainer.append(&xseq, &yseq, 0).unwrap();
    let model_file = train(&mut trainer);

    assert_eq!(tag(&model_file, &xseq), yseq);
}

#[test]
fn test_pa_parameter_validation() {
    let mut trainer = Trainer::new();
    trainer.select("passive-aggressive", "crf1d").unwrap();
    assert_eq!(trainer.get("type").unwrap(), ParamValue::Int(1));
    assert_eq!(trainer.get("error_sensitive").unwrap().as_bool(), Some(true));

    assert!(trainer.set("type", 3).is_err());
    assert!(trainer.set("type", -1).is_err());
    assert_eq!(
        trainer.set("c", 0.0).unwrap_err().to_string(),
        "c must be positive"
    );
    assert_eq!(trainer.get("c").unwrap(), ParamValue::Float(1.0));
    // L-BFGS parameters are not part of this selection
    assert!(trainer.set("c1", 0.5).is_err());
}
