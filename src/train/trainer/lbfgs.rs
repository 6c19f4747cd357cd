use std::cell::Cell;
use std::time::Instant;

use tracing::{debug, warn};

use super::super::crf_context::CrfContext;
use super::super::params::ParamSet;
use super::{active_features, Reporter, TrainData};
use crate::error::{Error, Result};

/// Number of limited memories liblbfgs runs with
const DEFAULT_NUM_MEMORIES: usize = 6;

/// Line search algorithm for L-BFGS optimization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum LineSearch {
    /// More and Thuente's method
    #[default]
    MoreThuente,
    /// Backtracking with the regular Wolfe condition
    Backtracking,
    /// Backtracking with the strong Wolfe condition
    StrongBacktracking,
}

impl LineSearch {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "MoreThuente" => Some(Self::MoreThuente),
            "Backtracking" => Some(Self::Backtracking),
            "StrongBacktracking" => Some(Self::StrongBacktracking),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::MoreThuente => "MoreThuente",
            Self::Backtracking => "Backtracking",
            Self::StrongBacktracking => "StrongBacktracking",
        }
    }

    fn to_liblbfgs_str(self) -> &'static str {
        match self {
            Self::MoreThuente => "MoreThuente",
            Self::Backtracking => "BacktrackingWolfe",
            Self::StrongBacktracking => "BacktrackingStrongWolfe",
        }
    }
}

/// L-BFGS training parameters.
#[derive(Debug, Clone)]
pub(crate) struct LbfgsParams {
    c1: f64,
    c2: f64,
    num_memories: usize,
    max_iterations: usize,
    epsilon: f64,
    period: usize,
    delta: f64,
    linesearch: LineSearch,
    max_linesearch: usize,
}

impl LbfgsParams {
    pub(crate) fn from_params(params: &ParamSet) -> Result<Self> {
        let c1 = params.float("c1")?;
        if c1 < 0.0 {
            return Err(Error::invalid("c1 must be non-negative"));
        }
        let c2 = params.float("c2")?;
        if c2 < 0.0 {
            return Err(Error::invalid("c2 must be non-negative"));
        }
        let num_memories = params.count("num_memories")?;
        if num_memories < 1 {
            return Err(Error::invalid("num_memories must be at least 1"));
        }
        let max_iterations = params.count("max_iterations")?;
        if max_iterations < 1 {
            return Err(Error::invalid("max_iterations must be at least 1"));
        }
        let epsilon = params.float("epsilon")?;
        if epsilon < 0.0 {
            return Err(Error::invalid("epsilon must be non-negative"));
        }
        // Zero disables the delta-based convergence test
        let period = params.count("period")?;
        let delta = params.float("delta")?;
        if delta < 0.0 {
            return Err(Error::invalid("delta must be non-negative"));
        }
        let linesearch = params.text("linesearch")?;
        let linesearch = LineSearch::parse(linesearch).ok_or_else(|| {
            Error::invalid(format!("Unknown line search algorithm: {}", linesearch))
        })?;
        let max_linesearch = params.count("max_linesearch")?;
        if max_linesearch == 0 {
            return Err(Error::invalid("max_linesearch must be positive"));
        }
        Ok(Self {
            c1,
            c2,
            num_memories,
            max_iterations,
            epsilon,
            period,
            delta,
            linesearch,
            max_linesearch,
        })
    }
}

/// Negative log-likelihood of the training instances and its gradient
fn objective(data: &TrainData<'_>, ctx: &mut CrfContext, x: &[f64], g: &mut [f64]) -> f64 {
    g.fill(0.0);
    ctx.set_transitions(&data.fset, x);
    let mut loss = 0.0;
    for inst in &data.train {
        ctx.set_instance(inst, &data.fset, x);
        ctx.forward_backward();
        loss -= ctx.log_likelihood(&inst.labels);
        // Gradient = expected - observed
        data.fset.accumulate(inst, &inst.labels, -1.0, g);
        ctx.accumulate_expectation(inst, &data.fset, 1.0, g);
    }
    loss
}

pub(crate) fn train(
    data: &TrainData<'_>,
    out: &mut Reporter<'_, '_>,
    params: &LbfgsParams,
) -> Result<Vec<f64>> {
    let num_features = data.num_features();
    out.message("L-BFGS optimization\n");
    out.message(&format!("c1: {:.6}\n", params.c1));
    out.message(&format!("c2: {:.6}\n", params.c2));
    out.message(&format!("num_memories: {}\n", params.num_memories));
    out.message(&format!("max_iterations: {}\n", params.max_iterations));
    out.message(&format!("epsilon: {:.6}\n", params.epsilon));
    out.message(&format!("stop: {}\n", params.period));
    out.message(&format!("delta: {:.6}\n", params.delta));
    out.message(&format!("linesearch: {}\n", params.linesearch.name()));
    out.message(&format!("linesearch.max_iterations: {}\n", params.max_linesearch));
    out.message("\n");

    let mut weights = vec![0.0; num_features];
    let mut best = weights.clone();
    let mut ctx = data.context();
    let c2 = params.c2;
    let trials = Cell::new(0u32);
    let mut iterations = 0usize;
    let mut clock = Instant::now();

    // Objective function: negative log-likelihood + L2 regularization
    let evaluate = |x: &[f64], gx: &mut [f64]| -> Result<f64, anyhow::Error> {
        trials.set(trials.get() + 1);
        let mut loss = objective(data, &mut ctx, x, gx);
        if c2 > 0.0 {
            let two_c2 = c2 * 2.0;
            for (g, &w) in gx.iter_mut().zip(x) {
                *g += two_c2 * w;
                loss += c2 * w * w;
            }
        }
        Ok(loss)
    };

    let progress = |prgr: &liblbfgs::Progress| -> bool {
        iterations += 1;
        best.copy_from_slice(prgr.x);
        out.message(&format!("***** Iteration #{} *****\n", iterations));
        out.message(&format!("Loss: {:.6}\n", prgr.fx));
        out.message(&format!("Feature norm: {:.6}\n", prgr.xnorm));
        out.message(&format!("Error norm: {:.6}\n", prgr.gnorm));
        out.message(&format!("Active features: {}\n", active_features(prgr.x)));
        out.message(&format!("Line search trials: {}\n", trials.replace(0)));
        out.message(&format!("Line search step: {:.6}\n", prgr.step));
        out.message(&format!(
            "Seconds required for this iteration: {:.3}\n",
            clock.elapsed().as_secs_f64()
        ));
        out.holdout(data, prgr.x);
        out.message("\n");
        clock = Instant::now();
        iterations >= params.max_iterations
    };

    // The optimizer keeps its default number of limited memories
    if params.num_memories != DEFAULT_NUM_MEMORIES {
        debug!(
            num_memories = params.num_memories,
            "num_memories is not configurable, using {}", DEFAULT_NUM_MEMORIES
        );
    }
    let mut lbfgs = liblbfgs::lbfgs()
        .with_max_iterations(params.max_iterations)
        .with_epsilon(params.epsilon)
        .with_fx_delta(params.delta, params.period)
        .with_max_linesearch(params.max_linesearch);

    // OWL-QN only supports backtracking line search
    if params.c1 > 0.0 {
        lbfgs = lbfgs
            .with_linesearch_algorithm("BacktrackingStrongWolfe")
            .with_orthantwise(params.c1, 0, num_features);
    } else {
        lbfgs = lbfgs.with_linesearch_algorithm(params.linesearch.to_liblbfgs_str());
    }

    let result = lbfgs.minimize(&mut weights, evaluate, progress);
    match result {
        Ok(_) if iterations >= params.max_iterations => {
            out.message("L-BFGS terminated with the maximum number of iterations\n");
        }
        Ok(_) => out.message("L-BFGS resulted in convergence\n"),
        Err(err) => {
            warn!("L-BFGS stopped early: {}", err);
            if iterations >= params.max_iterations {
                out.message("L-BFGS terminated with the maximum number of iterations\n");
            } else {
                out.message(&format!("L-BFGS terminated with error: {}\n", err));
            }
        }
    }
    Ok(best)
}
