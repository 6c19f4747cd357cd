use std::time::Instant;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use super::super::crf_context::CrfContext;
use super::super::params::ParamSet;
use super::{feature_norm, Reporter, TrainData};
use crate::error::{Error, Result, Status};

/// L2SGD training parameters.
#[derive(Debug, Clone)]
pub(crate) struct L2SgdParams {
    c2: f64,
    max_iterations: usize,
    period: usize,
    delta: f64,
    calibration_eta: f64,
    calibration_rate: f64,
    calibration_samples: usize,
    calibration_candidates: usize,
    calibration_max_trials: usize,
}

impl L2SgdParams {
    pub(crate) fn from_params(params: &ParamSet) -> Result<Self> {
        let c2 = params.float("c2")?;
        if c2 < 0.0 {
            return Err(Error::invalid("c2 must be non-negative"));
        }
        let max_iterations = params.count("max_iterations")?;
        if max_iterations < 1 {
            return Err(Error::invalid("max_iterations must be at least 1"));
        }
        let period = params.count("period")?;
        if period == 0 {
            return Err(Error::invalid("period must be positive"));
        }
        let delta = params.float("delta")?;
        if delta <= 0.0 {
            return Err(Error::invalid("delta must be positive"));
        }
        let calibration_eta = params.float("calibration.eta")?;
        if calibration_eta <= 0.0 {
            return Err(Error::invalid("calibration.eta must be positive"));
        }
        let calibration_rate = params.float("calibration.rate")?;
        if calibration_rate <= 1.0 {
            return Err(Error::invalid("calibration.rate must be greater than 1.0"));
        }
        let calibration_samples = params.count("calibration.samples")?;
        if calibration_samples == 0 {
            return Err(Error::invalid("calibration.samples must be positive"));
        }
        let calibration_candidates = params.count("calibration.candidates")?;
        if calibration_candidates == 0 {
            return Err(Error::invalid("calibration.candidates must be positive"));
        }
        let calibration_max_trials = params.count("calibration.max_trials")?;
        if calibration_max_trials == 0 {
            return Err(Error::invalid("calibration.max_trials must be positive"));
        }
        Ok(Self {
            c2,
            max_iterations,
            period,
            delta,
            calibration_eta,
            calibration_rate,
            calibration_samples,
            calibration_candidates,
            calibration_max_trials,
        })
    }
}

/// Scratch state of the SGD updates
struct Sgd<'d, 'a> {
    data: &'d TrainData<'a>,
    ctx: CrfContext,
    lambda: f64,
}

impl Sgd<'_, '_> {
    /// Loss of the instances in `order` under `weights`, without regularization
    fn loss(&mut self, order: &[usize], weights: &[f64]) -> f64 {
        self.ctx.set_transitions(&self.data.fset, weights);
        let mut loss = 0.0;
        for &idx in order {
            let inst = self.data.train[idx];
            self.ctx.set_instance(inst, &self.data.fset, weights);
            self.ctx.forward_backward();
            loss -= self.ctx.log_likelihood(&inst.labels);
        }
        loss
    }

    /// One pass over `order` starting at update count `t`; returns the objective.
    fn epoch(&mut self, order: &[usize], weights: &mut [f64], t0: f64, t: &mut f64) -> f64 {
        let fset = &self.data.fset;
        let mut sum_loss = 0.0;
        for &idx in order {
            let inst = self.data.train[idx];

            // Learning rate with decay
            let eta = 1.0 / (self.lambda * (t0 + *t));
            let decay = 1.0 - eta * self.lambda;
            for w in weights.iter_mut() {
                *w *= decay;
            }

            self.ctx.set_transitions(fset, weights);
            self.ctx.set_instance(inst, fset, weights);
            self.ctx.forward_backward();
            sum_loss -= self.ctx.log_likelihood(&inst.labels);

            // w += eta * (observed - expected)
            self.ctx.accumulate_expectation(inst, fset, -eta, weights);
            fset.accumulate(inst, &inst.labels, eta, weights);
            *t += 1.0;
        }
        let norm2: f64 = weights.iter().map(|w| w * w).sum();
        sum_loss + 0.5 * self.lambda * norm2 * order.len() as f64
    }
}

/// Search the initial learning rate on a sample of the instances; returns `t0`.
fn calibrate(
    sgd: &mut Sgd<'_, '_>,
    out: &mut Reporter<'_, '_>,
    params: &L2SgdParams,
    rng: &mut StdRng,
) -> f64 {
    let started = Instant::now();
    let num_features = sgd.data.num_features();
    let mut samples: Vec<usize> = (0..sgd.data.train.len()).collect();
    samples.shuffle(rng);
    samples.truncate(params.calibration_samples);

    out.message("Calibrating the learning rate (eta)\n");
    out.message(&format!("calibration.eta: {:.6}\n", params.calibration_eta));
    out.message(&format!("calibration.rate: {:.6}\n", params.calibration_rate));
    out.message(&format!("calibration.samples: {}\n", params.calibration_samples));
    out.message(&format!(
        "calibration.candidates: {}\n",
        params.calibration_candidates
    ));
    out.message(&format!(
        "calibration.max_trials: {}\n",
        params.calibration_max_trials
    ));

    let mut weights = vec![0.0; num_features];
    let initial_loss = sgd.loss(&samples, &weights);
    out.message(&format!("Initial loss: {:.6}\n", initial_loss));

    let mut eta = params.calibration_eta;
    let mut best_eta = eta;
    let mut best_loss = f64::INFINITY;
    let mut dec = false;
    let mut num = params.calibration_candidates;
    let mut trials = 1;

    while num > 0 || !dec {
        weights.fill(0.0);
        let mut t = 0.0;
        let loss = sgd.epoch(&samples, &mut weights, 1.0 / (sgd.lambda * eta), &mut t);

        let ok = loss.is_finite() && loss < initial_loss;
        if ok {
            num = num.saturating_sub(1);
            out.message(&format!("Trial #{} (eta = {:.6}): {:.6}\n", trials, eta, loss));
        } else {
            out.message(&format!(
                "Trial #{} (eta = {:.6}): {:.6} (worse)\n",
                trials, eta, loss
            ));
        }
        if ok && loss < best_loss {
            best_loss = loss;
            best_eta = eta;
        }

        if !dec {
            if ok && num > 0 {
                eta *= params.calibration_rate;
            } else {
                dec = true;
                num = params.calibration_candidates;
                eta = params.calibration_eta / params.calibration_rate;
            }
        } else {
            eta /= params.calibration_rate;
        }

        trials += 1;
        if params.calibration_max_trials <= trials {
            break;
        }
    }

    out.message(&format!("Best learning rate (eta): {:.6}\n", best_eta));
    out.message(&format!(
        "Seconds required: {:.3}\n",
        started.elapsed().as_secs_f64()
    ));
    out.message("\n");
    1.0 / (sgd.lambda * best_eta)
}

pub(crate) fn train(
    data: &TrainData<'_>,
    out: &mut Reporter<'_, '_>,
    params: &L2SgdParams,
) -> Result<Vec<f64>> {
    let num_features = data.num_features();
    let num_instances = data.train.len();
    out.message("Stochastic Gradient Descent (SGD)\n");
    out.message(&format!("c2: {:.6}\n", params.c2));
    out.message(&format!("max_iterations: {}\n", params.max_iterations));
    out.message(&format!("period: {}\n", params.period));
    out.message(&format!("delta: {:.6}\n", params.delta));
    out.message("\n");

    let mut sgd = Sgd {
        data,
        ctx: data.context(),
        lambda: 2.0 * params.c2 / num_instances as f64,
    };
    let mut rng = data.rng();
    let t0 = calibrate(&mut sgd, out, params, &mut rng);

    let mut weights = vec![0.0; num_features];
    let mut best_weights = weights.clone();
    let mut best_objective = f64::INFINITY;
    let mut history = vec![0.0; params.period];
    let mut order: Vec<usize> = (0..num_instances).collect();
    let mut t = 0.0;
    let mut converged = false;

    for epoch in 1..=params.max_iterations {
        let clock = Instant::now();
        order.shuffle(&mut rng);
        let loss = sgd.epoch(&order, &mut weights, t0, &mut t);

        out.message(&format!("***** Epoch #{} *****\n", epoch));
        out.message(&format!("Loss: {:.6}\n", loss));
        if !loss.is_finite() {
            out.message("ERROR: overflow loss\n");
            return Err(Status::Overflow.into());
        }
        if loss < best_objective {
            best_objective = loss;
            best_weights.copy_from_slice(&weights);
        }

        let slot = (epoch - 1) % params.period;
        let improvement = if epoch > params.period {
            (history[slot] - loss) / loss
        } else {
            params.delta
        };
        history[slot] = loss;
        if epoch > params.period {
            out.message(&format!("Improvement ratio: {:.6}\n", improvement));
        }
        out.message(&format!("Feature norm: {:.6}\n", feature_norm(&weights)));
        out.message(&format!(
            "Learning rate (eta): {:.6}\n",
            1.0 / (sgd.lambda * (t0 + t))
        ));
        out.message(&format!("Total number of feature updates: {:.0}\n", t));
        out.message(&format!(
            "Seconds required for this iteration: {:.3}\n",
            clock.elapsed().as_secs_f64()
        ));
        out.holdout(data, &weights);
        out.message("\n");

        if epoch > params.period && improvement < params.delta {
            converged = true;
            break;
        }
    }

    if converged {
        out.message("SGD terminated with the stopping criteria\n");
    } else {
        out.message("SGD terminated with the maximum number of iterations\n");
    }
    Ok(best_weights)
}
