use super::feature_gen::FeatureSet;
use crate::context::{Context, Flag, Reset};
use crate::dataset::Instance;

/// Lattice of one training instance under the current weights
pub(crate) struct CrfContext {
    ctx: Context,
}

impl CrfContext {
    pub fn new(num_labels: usize, max_items: usize) -> Self {
        Self {
            ctx: Context::new(Flag::VITERBI | Flag::MARGINALS, num_labels as u32, max_items as u32),
        }
    }

    /// Load the transition scores of `weights`
    pub fn set_transitions(&mut self, fset: &FeatureSet, weights: &[f64]) {
        self.ctx.reset(Reset::TRANS);
        for (i, fids) in fset.label_refs.iter().enumerate() {
            for &fid in fids {
                let j = fset.features[fid as usize].dst as usize;
                self.ctx.trans[[i, j]] = weights[fid as usize];
            }
        }
        self.ctx.exp_transition();
    }

    /// Load the state scores of `inst` under `weights`
    pub fn set_instance(&mut self, inst: &Instance, fset: &FeatureSet, weights: &[f64]) {
        self.ctx.set_num_items(inst.num_items() as u32);
        self.ctx.reset(Reset::STATE);
        for (t, item) in inst.items.iter().enumerate() {
            for attr in item {
                let Some(fids) = fset.attr_refs.get(attr.id as usize) else {
                    continue;
                };
                for &fid in fids {
                    let l = fset.features[fid as usize].dst as usize;
                    self.ctx.state[[t, l]] += weights[fid as usize] * attr.value;
                }
            }
        }
    }

    /// Run forward-backward and return the log of the partition function
    pub fn forward_backward(&mut self) -> f64 {
        self.ctx.exp_state();
        self.ctx.alpha_score();
        self.ctx.beta_score();
        self.ctx.marginals();
        self.ctx.log_norm()
    }

    /// Log-likelihood of `labels`; valid after [`forward_backward`](Self::forward_backward)
    pub fn log_likelihood(&self, labels: &[u32]) -> f64 {
        self.ctx.score(labels) - self.ctx.log_norm()
    }

    pub fn score(&self, labels: &[u32]) -> f64 {
        self.ctx.score(labels)
    }

    /// Add `scale` times the model expectation of every feature to `out`
    pub fn accumulate_expectation(
        &self,
        inst: &Instance,
        fset: &FeatureSet,
        scale: f64,
        out: &mut [f64],
    ) {
        for (t, item) in inst.items.iter().enumerate() {
            for attr in item {
                let Some(fids) = fset.attr_refs.get(attr.id as usize) else {
                    continue;
                };
                for &fid in fids {
                    let l = fset.features[fid as usize].dst;
                    out[fid as usize] += scale * attr.value * self.ctx.marginal_point(l, t as u32);
                }
            }
        }
        for t in 1..inst.num_items() as u32 {
            for (i, fids) in fset.label_refs.iter().enumerate() {
                for &fid in fids {
                    let j = fset.features[fid as usize].dst;
                    out[fid as usize] += scale * self.ctx.transition_marginal(i as u32, j, t);
                }
            }
        }
    }

    /// Best label path under the loaded scores
    pub fn viterbi(&mut self) -> (Vec<u32>, f64) {
        self.ctx.viterbi()
    }
}
