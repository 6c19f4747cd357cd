use bitflags::bitflags;
use ndarray::{s, Array1, Array2};

bitflags! {
    /// Functionality flags for contexts
    #[derive(Default)]
    pub struct Flag: u32 {
        const VITERBI = 0x01;
        const MARGINALS = 0x02;
        const ALL = 0xFF;
    }
}

bitflags! {
    /// Reset flags
    pub struct Reset: u32 {
        /// Reset state scores
        const STATE = 0x01;
        /// Reset transition scores
        const TRANS = 0x02;
        /// Reset all
        const ALL = 0xFF;
    }
}

/// Context maintains internal data for an instance
#[derive(Debug, Clone)]
pub struct Context {
    /// Flag specifying the functionality
    flag: Flag,
    /// The total number of distinct labels
    pub num_labels: u32,
    /// The number of items in the instance
    pub num_items: u32,
    /// The number of items the buffers can hold
    cap_items: u32,
    /// Logarithm of the normalization factor for the instance.
    ///
    /// This is equivalent to the total scores of all paths in the lattice.
    log_norm: f64,
    /// State scores
    ///
    /// This is a `[T][L]` matrix whose element `[t][l]` presents total score
    /// of state features associating label #l at #t.
    pub state: Array2<f64>,
    /// Transition scores
    ///
    /// This is a `[L][L]` matrix whose element `[i][j]` represents the total
    /// score of transition features associating labels #i and #j.
    pub trans: Array2<f64>,
    /// Alpha score matrix, scaled per position
    alpha_score: Array2<f64>,
    /// Beta score matrix, scaled per position
    beta_score: Array2<f64>,
    /// Scale factor vector
    ///
    /// This is a `[T]` vector whose element `[t]` presents the scaling
    /// coefficient for the alpha_score and beta_score.
    scale_factor: Array1<f64>,
    /// Work space of `[L]` elements
    row: Array1<f64>,
    /// Backward edges
    ///
    /// This is a `[T][L]` matrix whose element `[t][j]` represents the label #i
    /// that yields the maximum score to arrive at (t, j).
    backward_edge: Array2<u32>,
    /// Exponents of state scores, available with `Flag::MARGINALS`
    exp_state: Array2<f64>,
    /// Exponents of transition scores, available with `Flag::MARGINALS`
    exp_trans: Array2<f64>,
    /// Model expectations (marginal probabilities) of states
    mexp_state: Array2<f64>,
}

impl Default for Context {
    fn default() -> Self {
        Self {
            flag: Flag::default(),
            num_labels: 0,
            num_items: 0,
            cap_items: 0,
            log_norm: 0.0,
            state: Array2::zeros((0, 0)),
            trans: Array2::zeros((0, 0)),
            alpha_score: Array2::zeros((0, 0)),
            beta_score: Array2::zeros((0, 0)),
            scale_factor: Array1::zeros(0),
            row: Array1::zeros(0),
            backward_edge: Array2::zeros((0, 0)),
            exp_state: Array2::zeros((0, 0)),
            exp_trans: Array2::zeros((0, 0)),
            mexp_state: Array2::zeros((0, 0)),
        }
    }
}

impl Context {
    pub fn new(flag: Flag, l: u32, t: u32) -> Self {
        let size = l as usize;
        let exp_trans = if flag.contains(Flag::MARGINALS) {
            Array2::zeros((size, size))
        } else {
            Array2::zeros((0, 0))
        };
        let mut ctx = Self {
            flag,
            num_labels: l,
            trans: Array2::zeros((size, size)),
            exp_trans,
            row: Array1::zeros(size),
            ..Default::default()
        };
        ctx.set_num_items(t);
        // t gives the 'hint' for maximum length of items.
        ctx.num_items = 0;
        ctx
    }

    pub fn set_num_items(&mut self, t: u32) {
        self.num_items = t;
        if self.cap_items < t {
            let l = self.num_labels as usize;
            let t = t as usize;

            self.alpha_score = Array2::zeros((t, l));
            self.beta_score = Array2::zeros((t, l));
            self.scale_factor = Array1::zeros(t);
            self.state = Array2::zeros((t, l));

            if self.flag.contains(Flag::VITERBI) {
                self.backward_edge = Array2::zeros((t, l));
            }
            if self.flag.contains(Flag::MARGINALS) {
                self.exp_state = Array2::zeros((t, l));
                self.mexp_state = Array2::zeros((t, l));
            }

            self.cap_items = t as u32;
        }
    }

    pub fn reset(&mut self, flag: Reset) {
        let t = self.num_items as usize;
        let l = self.num_labels as usize;

        if flag.contains(Reset::STATE) && t > 0 {
            self.state.slice_mut(s![..t, ..l]).fill(0.0);
        }
        if flag.contains(Reset::TRANS) {
            self.trans.fill(0.0);
        }
        if self.flag.contains(Flag::MARGINALS) {
            if t > 0 {
                self.mexp_state.slice_mut(s![..t, ..l]).fill(0.0);
            }
            self.log_norm = 0.0;
        }
    }

    pub fn exp_transition(&mut self) {
        self.exp_trans.assign(&self.trans);
        self.exp_trans.mapv_inplace(f64::exp);
    }

    pub fn exp_state(&mut self) {
        let t = self.num_items as usize;
        let mut exp_state = self.exp_state.slice_mut(s![..t, ..]);
        exp_state.assign(&self.state.slice(s![..t, ..]));
        exp_state.mapv_inplace(f64::exp);
    }

    /// Logarithm of the partition function computed by [`alpha_score`](Self::alpha_score)
    pub fn log_norm(&self) -> f64 {
        self.log_norm
    }

    fn normalize_alpha(&mut self, t: usize) {
        let sum: f64 = self.alpha_score.row(t).sum();
        let scale = if sum != 0.0 { 1.0 / sum } else { 1.0 };
        self.scale_factor[t] = scale;
        self.alpha_score.row_mut(t).mapv_inplace(|x| x * scale);
    }

    /// Forward pass over the exponentiated scores
    pub fn alpha_score(&mut self) {
        let t_len = self.num_items as usize;
        let l = self.num_labels as usize;
        if t_len == 0 {
            self.log_norm = 0.0;
            return;
        }

        // Compute the alpha scores on nodes (0, *).
        let first = self.exp_state.row(0).to_owned();
        self.alpha_score.row_mut(0).assign(&first);
        self.normalize_alpha(0);

        // Compute the alpha scores on nodes (t, *).
        for t in 1..t_len {
            for j in 0..l {
                let mut sum = 0.0;
                for i in 0..l {
                    sum += self.alpha_score[[t - 1, i]] * self.exp_trans[[i, j]];
                }
                self.alpha_score[[t, j]] = sum * self.exp_state[[t, j]];
            }
            self.normalize_alpha(t);
        }

        // The scale factors are the reciprocals of the per-position sums.
        self.log_norm = -self.scale_factor.slice(s![..t_len]).mapv(f64::ln).sum();
    }

    /// Backward pass over the exponentiated scores
    pub fn beta_score(&mut self) {
        let t_len = self.num_items as usize;
        let l = self.num_labels as usize;
        if t_len == 0 {
            return;
        }

        // Compute the beta scores at (T-1, *).
        let last = self.scale_factor[t_len - 1];
        self.beta_score.row_mut(t_len - 1).fill(last);

        // Compute the beta scores at (t, *).
        for t in (0..t_len - 1).rev() {
            for j in 0..l {
                self.row[j] = self.beta_score[[t + 1, j]] * self.exp_state[[t + 1, j]];
            }
            let scale = self.scale_factor[t];
            for i in 0..l {
                let mut sum = 0.0;
                for j in 0..l {
                    sum += self.exp_trans[[i, j]] * self.row[j];
                }
                self.beta_score[[t, i]] = sum * scale;
            }
        }
    }

    /// Compute the marginal probabilities of every state
    pub fn marginals(&mut self) {
        let t_len = self.num_items as usize;
        let l = self.num_labels as usize;
        for t in 0..t_len {
            let scale = self.scale_factor[t];
            for i in 0..l {
                self.mexp_state[[t, i]] =
                    self.alpha_score[[t, i]] * self.beta_score[[t, i]] / scale;
            }
        }
    }

    /// Marginal probability of label `l` at position `t`; valid after [`marginals`](Self::marginals)
    pub fn marginal_point(&self, l: u32, t: u32) -> f64 {
        self.mexp_state[[t as usize, l as usize]]
    }

    /// Marginal probability of the transition `i -> j` between positions `t - 1` and `t`
    pub fn transition_marginal(&self, i: u32, j: u32, t: u32) -> f64 {
        let (i, j, t) = (i as usize, j as usize, t as usize);
        self.alpha_score[[t - 1, i]]
            * self.exp_trans[[i, j]]
            * self.exp_state[[t, j]]
            * self.beta_score[[t, j]]
    }

    /// Unnormalized score of a label path
    pub fn score(&self, labels: &[u32]) -> f64 {
        let mut prev = None;
        let mut score = 0.0;
        for (t, &label) in labels.iter().enumerate() {
            let j = label as usize;
            score += self.state[[t, j]];
            if let Some(i) = prev {
                score += self.trans[[i, j]];
            }
            prev = Some(j);
        }
        score
    }

    pub fn viterbi(&mut self) -> (Vec<u32>, f64) {
        let l = self.num_labels as usize;
        let t = self.num_items as usize;
        if t == 0 || l == 0 {
            return (Vec::new(), 0.0);
        }

        // Compute the scores at (0, *)
        for j in 0..l {
            self.alpha_score[[0, j]] = self.state[[0, j]];
        }

        // Compute the scores at (t, *)
        for time in 1..t {
            for j in 0..l {
                let mut max_score = f64::MIN;
                let mut argmax_score = 0;

                for i in 0..l {
                    // Transit from (t-1, i) to (t, j)
                    let score = self.alpha_score[[time - 1, i]] + self.trans[[i, j]];
                    if max_score < score {
                        max_score = score;
                        argmax_score = i;
                    }
                }

                // Backward link (#t, #j) -> (#t-1, #i)
                self.backward_edge[[time, j]] = argmax_score as u32;
                self.alpha_score[[time, j]] = max_score + self.state[[time, j]];
            }
        }

        // Find the node (#T, Ei) that reaches EOS with the maximum score
        let mut max_score = f64::MIN;
        let mut labels = vec![0u32; t];
        for (i, &score) in self.alpha_score.row(t - 1).iter().enumerate() {
            if max_score < score {
                max_score = score;
                labels[t - 1] = i as u32;
            }
        }

        // Tag labels by tracing the backward links
        for time in (0..t - 1).rev() {
            let next_label = labels[time + 1] as usize;
            labels[time] = self.backward_edge[[time + 1, next_label]];
        }

        (labels, max_score)
    }
}
