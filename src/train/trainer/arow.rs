use std::time::Instant;

use rand::seq::SliceRandom;

use super::super::params::ParamSet;
use super::{feature_diff, feature_norm, num_errors, predict, Reporter, TrainData};
use crate::error::{Error, Result};

/// AROW training parameters.
#[derive(Debug, Clone)]
pub(crate) struct ArowParams {
    variance: f64,
    gamma: f64,
    max_iterations: usize,
    epsilon: f64,
}

impl ArowParams {
    pub(crate) fn from_params(params: &ParamSet) -> Result<Self> {
        let variance = params.float("variance")?;
        if variance <= 0.0 {
            return Err(Error::invalid("variance must be positive"));
        }
        let gamma = params.float("gamma")?;
        if gamma <= 0.0 {
            return Err(Error::invalid("gamma must be positive"));
        }
        let max_iterations = params.count("max_iterations")?;
        if max_iterations < 1 {
            return Err(Error::invalid("max_iterations must be at least 1"));
        }
        let epsilon = params.float("epsilon")?;
        if epsilon < 0.0 {
            return Err(Error::invalid("epsilon must be non-negative"));
        }
        Ok(Self {
            variance,
            gamma,
            max_iterations,
            epsilon,
        })
    }
}

pub(crate) fn train(
    data: &TrainData<'_>,
    out: &mut Reporter<'_, '_>,
    params: &ArowParams,
) -> Result<Vec<f64>> {
    let num_features = data.num_features();
    let num_instances = data.train.len() as f64;
    out.message("Adaptive Regularization of Weights (AROW)\n");
    out.message(&format!("variance: {:.6}\n", params.variance));
    out.message(&format!("gamma: {:.6}\n", params.gamma));
    out.message(&format!("max_iterations: {}\n", params.max_iterations));
    out.message(&format!("epsilon: {:.6}\n", params.epsilon));
    out.message("\n");

    let gamma = params.gamma;
    let mut weights = vec![0.0; num_features];
    // Diagonal covariance
    let mut covariance = vec![params.variance; num_features];
    let mut diff = vec![0.0; num_features];
    let mut ctx = data.context();
    let mut rng = data.rng();
    let mut order: Vec<usize> = (0..data.train.len()).collect();

    for epoch in 1..=params.max_iterations {
        let clock = Instant::now();
        order.shuffle(&mut rng);
        let mut sum_loss = 0.0;

        for &idx in &order {
            let inst = data.train[idx];
            let (predicted, margin) = predict(&mut ctx, &data.fset, inst, &weights);
            let errors = num_errors(&inst.labels, &predicted);
            if errors == 0 {
                continue;
            }
            let cost = margin + errors as f64;
            feature_diff(&data.fset, inst, &predicted, &mut diff);
            let confidence: f64 = diff
                .iter()
                .zip(&covariance)
                .map(|(d, sigma)| d * d * sigma)
                .sum();
            let alpha = cost / (confidence + gamma);

            for ((w, sigma), &d) in weights.iter_mut().zip(&mut covariance).zip(&diff) {
                if d == 0.0 {
                    continue;
                }
                *w += alpha * *sigma * d;
                *sigma = 1.0 / (1.0 / *sigma + d * d / gamma);
            }
            sum_loss += cost;
        }

        out.message(&format!("***** Iteration #{} *****\n", epoch));
        out.message(&format!("Loss: {:.6}\n", sum_loss));
        out.message(&format!("Feature norm: {:.6}\n", feature_norm(&weights)));
        out.message(&format!(
            "Seconds required for this iteration: {:.3}\n",
            clock.elapsed().as_secs_f64()
        ));
        out.holdout(data, &weights);
        out.message("\n");

        if sum_loss / num_instances <= params.epsilon {
            out.message("Terminated with the stopping criterion\n");
            break;
        }
    }

    Ok(weights)
}
