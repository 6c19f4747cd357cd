use std::time::Instant;

use rand::seq::SliceRandom;

use super::super::params::ParamSet;
use super::{averaged, feature_diff, feature_norm, num_errors, predict, Reporter, TrainData};
use crate::error::{Error, Result};

/// Strategy for updating feature weights
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PaType {
    /// PA without slack variables
    Pa,
    /// PA type I
    PaI,
    /// PA type II
    PaII,
}

impl PaType {
    fn code(self) -> u8 {
        match self {
            PaType::Pa => 0,
            PaType::PaI => 1,
            PaType::PaII => 2,
        }
    }

    /// Step size for a violation of `cost` along a difference of squared norm `norm_sq`
    fn tau(self, cost: f64, norm_sq: f64, c: f64) -> f64 {
        match self {
            PaType::Pa => cost / norm_sq,
            PaType::PaI => (cost / norm_sq).min(c),
            PaType::PaII => cost / (norm_sq + 1.0 / (2.0 * c)),
        }
    }
}

/// Passive Aggressive training parameters.
#[derive(Debug, Clone)]
pub(crate) struct PassiveAggressiveParams {
    pa_type: PaType,
    c: f64,
    error_sensitive: bool,
    averaging: bool,
    max_iterations: usize,
    epsilon: f64,
}

impl PassiveAggressiveParams {
    pub(crate) fn from_params(params: &ParamSet) -> Result<Self> {
        let pa_type = match params.int("type")? {
            0 => PaType::Pa,
            1 => PaType::PaI,
            2 => PaType::PaII,
            other => {
                return Err(Error::invalid(format!(
                    "type must be 0, 1 or 2, got {}",
                    other
                )))
            }
        };
        let c = params.float("c")?;
        if c <= 0.0 {
            return Err(Error::invalid("c must be positive"));
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
            pa_type,
            c,
            error_sensitive: params.flag("error_sensitive")?,
            averaging: params.flag("averaging")?,
            max_iterations,
            epsilon,
        })
    }
}

pub(crate) fn train(
    data: &TrainData<'_>,
    out: &mut Reporter<'_, '_>,
    params: &PassiveAggressiveParams,
) -> Result<Vec<f64>> {
    let num_features = data.num_features();
    let num_instances = data.train.len() as f64;
    out.message("Passive Aggressive\n");
    out.message(&format!("type: {}\n", params.pa_type.code()));
    out.message(&format!("c: {:.6}\n", params.c));
    out.message(&format!(
        "error_sensitive: {}\n",
        u8::from(params.error_sensitive)
    ));
    out.message(&format!("averaging: {}\n", u8::from(params.averaging)));
    out.message(&format!("max_iterations: {}\n", params.max_iterations));
    out.message(&format!("epsilon: {:.6}\n", params.epsilon));
    out.message("\n");

    let mut weights = vec![0.0; num_features];
    let mut summed = vec![0.0; num_features];
    let mut diff = vec![0.0; num_features];
    let mut c = 1.0;
    let mut ctx = data.context();
    let mut rng = data.rng();
    let mut order: Vec<usize> = (0..data.train.len()).collect();

    let current = |weights: &[f64], summed: &[f64], c: f64| {
        if params.averaging {
            averaged(weights, summed, c)
        } else {
            weights.to_vec()
        }
    };

    for epoch in 1..=params.max_iterations {
        let clock = Instant::now();
        order.shuffle(&mut rng);
        let mut sum_loss = 0.0;

        for &idx in &order {
            let inst = data.train[idx];
            let (predicted, margin) = predict(&mut ctx, &data.fset, inst, &weights);
            let errors = num_errors(&inst.labels, &predicted);
            if errors > 0 {
                let cost = if params.error_sensitive {
                    margin + (errors as f64).sqrt()
                } else {
                    margin + 1.0
                };
                let norm_sq = feature_diff(&data.fset, inst, &predicted, &mut diff);
                let tau = if norm_sq > 0.0 {
                    params.pa_type.tau(cost, norm_sq, params.c)
                } else {
                    0.0
                };
                for ((w, ws), &d) in weights.iter_mut().zip(&mut summed).zip(&diff) {
                    *w += tau * d;
                    *ws += tau * c * d;
                }
                sum_loss += cost;
            }
            c += 1.0;
        }

        let snapshot = current(&weights, &summed, c);
        out.message(&format!("***** Iteration #{} *****\n", epoch));
        out.message(&format!("Loss: {:.6}\n", sum_loss));
        out.message(&format!("Feature norm: {:.6}\n", feature_norm(&snapshot)));
        out.message(&format!(
            "Seconds required for this iteration: {:.3}\n",
            clock.elapsed().as_secs_f64()
        ));
        out.holdout(data, &snapshot);
        out.message("\n");

        if sum_loss / num_instances < params.epsilon {
            out.message("Terminated with the stopping criterion\n");
            break;
        }
    }

    Ok(current(&weights, &summed, c))
}
