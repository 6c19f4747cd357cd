use std::time::Instant;

use rand::seq::SliceRandom;

use super::super::params::ParamSet;
use super::{averaged, feature_diff, feature_norm, num_errors, predict, Reporter, TrainData};
use crate::error::{Error, Result};

/// Averaged Perceptron training parameters.
#[derive(Debug, Clone)]
pub(crate) struct AveragedPerceptronParams {
    max_iterations: usize,
    epsilon: f64,
}

impl AveragedPerceptronParams {
    pub(crate) fn from_params(params: &ParamSet) -> Result<Self> {
        let max_iterations = params.count("max_iterations")?;
        if max_iterations < 1 {
            return Err(Error::invalid("max_iterations must be at least 1"));
        }
        let epsilon = params.float("epsilon")?;
        if epsilon < 0.0 {
            return Err(Error::invalid("epsilon must be non-negative"));
        }
        Ok(Self {
            max_iterations,
            epsilon,
        })
    }
}

pub(crate) fn train(
    data: &TrainData<'_>,
    out: &mut Reporter<'_, '_>,
    params: &AveragedPerceptronParams,
) -> Result<Vec<f64>> {
    let num_features = data.num_features();
    let num_instances = data.train.len() as f64;
    out.message("Averaged perceptron\n");
    out.message(&format!("max_iterations: {}\n", params.max_iterations));
    out.message(&format!("epsilon: {:.6}\n", params.epsilon));
    out.message("\n");

    let mut weights = vec![0.0; num_features];
    let mut summed = vec![0.0; num_features];
    let mut diff = vec![0.0; num_features];
    // Update counter
    let mut c = 1.0;
    let mut ctx = data.context();
    let mut rng = data.rng();
    let mut order: Vec<usize> = (0..data.train.len()).collect();

    for epoch in 1..=params.max_iterations {
        let clock = Instant::now();
        order.shuffle(&mut rng);
        let mut loss = 0.0;

        for &idx in &order {
            let inst = data.train[idx];
            let (predicted, _) = predict(&mut ctx, &data.fset, inst, &weights);
            let errors = num_errors(&inst.labels, &predicted);
            if errors > 0 {
                feature_diff(&data.fset, inst, &predicted, &mut diff);
                for ((w, ws), &d) in weights.iter_mut().zip(&mut summed).zip(&diff) {
                    *w += d;
                    *ws += c * d;
                }
                loss += errors as f64;
            }
            c += 1.0;
        }

        let average = averaged(&weights, &summed, c);
        out.message(&format!("***** Iteration #{} *****\n", epoch));
        out.message(&format!("Loss: {:.6}\n", loss));
        out.message(&format!("Feature norm: {:.6}\n", feature_norm(&average)));
        out.message(&format!(
            "Seconds required for this iteration: {:.3}\n",
            clock.elapsed().as_secs_f64()
        ));
        out.holdout(data, &average);
        out.message("\n");

        if loss / num_instances < params.epsilon {
            out.message("Terminated with the stopping criterion\n");
            break;
        }
    }

    Ok(averaged(&weights, &summed, c))
}
