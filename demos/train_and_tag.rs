use crfkit::{Algorithm, Attribute, LogHook, Tagger, Trainer};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    // Create training data
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
    let yseq = [
        "sunny", "sunny", "sunny", "rainy", "rainy", "rainy", "sunny", "sunny", "rainy",
    ];

    println!("Training data:");
    println!("  Sequence length: {}", xseq.len());
    println!("  Labels: {:?}\n", yseq);

    let mut trainer = Trainer::builder()
        .algorithm(Algorithm::Lbfgs)
        .param("c1", 0.0)
        .param("c2", 1.0)
        .param("max_iterations", 100)
        .build()?;
    trainer.set_hook(LogHook::new(true));
    trainer.append(&xseq, &yseq, 0)?;
    println!("  L1 regularization (c1): {}", trainer.get("c1")?);
    println!("  L2 regularization (c2): {}", trainer.get("c2")?);
    println!("  Max iterations: {}\n", trainer.get("max_iterations")?);

    let model_path = std::env::temp_dir().join("example_model.crfsuite");
    trainer.train(&model_path, None)?;

    let log = trainer.log_parser();
    if let Some(last) = log.last_iteration() {
        println!(
            "Finished after {} iterations, loss {:?}",
            last.num, last.loss
        );
    }

    let mut tagger = Tagger::new();
    let mut tagger = tagger.open(&model_path)?;
    let test_seq = vec![
        vec![Attribute::new("walk", 1.0)],
        vec![Attribute::new("shop", 1.0)],
        vec![Attribute::new("clean", 1.0)],
    ];
    let result = tagger.tag(&test_seq)?;
    println!("  Input: walk -> shop -> clean");
    println!("  Predicted labels: {:?}", result);
    println!("  Probability: {:.4}", tagger.probability(&result)?);
    for (t, label) in result.iter().enumerate() {
        println!("  P({} at {}) = {:.4}", label, t, tagger.marginal(label, t)?);
    }

    Ok(())
}
