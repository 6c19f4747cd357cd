use crfkit::{Algorithm, ParamValue, Trainer};
use pretty_assertions::assert_eq;

#[test]
fn test_c1_negative_validation() {
    let mut trainer = Trainer::new();

    // c1 must be non-negative
    let result = trainer.set("c1", -1.0);
    assert!(result.is_err());
    assert_eq!(result.unwrap_err().to_string(), "c1 must be non-negative");

    assert!(trainer.set("c1", 0.0).is_ok());
    assert!(trainer.set("c1", 1.0).is_ok());
}

#[test]
fn test_c2_negative_validation() {
    let mut trainer = Trainer::new();

    let result = trainer.set("c2", -1.0);
    assert!(result.is_err());
    assert_eq!(result.unwrap_err().to_string(), "c2 must be non-negative");

    assert!(trainer.set("c2", 0.0).is_ok());
    assert!(trainer.set("c2", 1.0).is_ok());
}

#[test]
fn test_epsilon_validation() {
    let mut trainer = Trainer::new();

    assert!(trainer.set("epsilon", 0.0).is_ok());
    let result = trainer.set("epsilon", -0.001);
    assert_eq!(
        result.unwrap_err().to_string(),
        "epsilon must be non-negative"
    );
    assert!(trainer.set("epsilon", 0.001).is_ok());
    assert!(trainer.set("epsilon", "1e-5").is_ok());
    assert_eq!(trainer.get("epsilon").unwrap(), ParamValue::Float(1e-5));
}

#[test]
fn test_invalid_parameter_values() {
    let mut trainer = Trainer::new();

    // Invalid number format
    let err = trainer.set("c1", "not_a_number").unwrap_err();
    assert!(err.is_invalid_argument());
    assert_eq!(
        err.to_string(),
        "Invalid value for parameter c1: not_a_number"
    );
    assert!(trainer.set("max_iterations", 1.5).is_err());
    assert!(trainer.set("linesearch", "Bisection").is_err());
    assert!(trainer.set("linesearch", "StrongBacktracking").is_ok());
}

#[test]
fn test_unknown_parameter() {
    let mut trainer = Trainer::new();
    let err = trainer.set("unknown_param", 1.0).unwrap_err();
    assert_eq!(err.to_string(), "Parameter not found: unknown_param");
    assert!(trainer.get("unknown_param").is_err());
    assert!(trainer.help("unknown_param").is_err());
}

#[test]
fn test_params_follow_selection() {
    let mut trainer = Trainer::new();
    trainer.set("c2", 0.25).unwrap();
    let lbfgs = trainer.params();
    assert!(lbfgs.contains(&"num_memories".to_string()));

    trainer.select_algorithm(Algorithm::AveragedPerceptron);
    assert_eq!(
        trainer.params(),
        vec![
            "feature.minfreq",
            "feature.possible_states",
            "feature.possible_transitions",
            "max_iterations",
            "epsilon",
        ]
    );
    assert_eq!(trainer.get("max_iterations").unwrap(), ParamValue::Int(100));

    // Selecting again restores the defaults
    trainer.select("lbfgs", "crf1d").unwrap();
    assert_eq!(trainer.get("c2").unwrap(), ParamValue::Float(1.0));
}

#[test]
fn test_set_and_get_params() {
    let mut trainer = Trainer::new();
    trainer
        .set_params(vec![
            ("c1", ParamValue::Float(0.5)),
            ("feature.possible_transitions", ParamValue::Bool(true)),
            ("linesearch", ParamValue::from("Backtracking")),
        ])
        .unwrap();
    let params = trainer.get_params();
    assert_eq!(params["c1"], ParamValue::Float(0.5));
    assert_eq!(params["feature.possible_transitions"], ParamValue::Bool(true));
    assert_eq!(params["linesearch"].as_str(), Some("Backtracking"));
    assert_eq!(params["max_iterations"].as_i64(), Some(i64::from(i32::MAX)));

    // The first rejected value stops the batch
    let err = trainer.set_params([("c2", 0.5), ("c1", -1.0), ("epsilon", 0.1)]);
    assert!(err.is_err());
    assert_eq!(trainer.get("c2").unwrap(), ParamValue::Float(0.5));
    assert_eq!(trainer.get("epsilon").unwrap(), ParamValue::Float(1e-5));
}

#[test]
fn test_help_texts() {
    let trainer = Trainer::new();
    for name in trainer.params() {
        assert!(!trainer.help(&name).unwrap().is_empty(), "{}", name);
    }
    assert!(trainer.help("linesearch").unwrap().contains("MoreThuente"));
    assert!(trainer.help("num_memories").unwrap().contains("always uses 6"));
}
