use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::time::Instant;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::debug;

use super::algorithm::{Algorithm, ModelType};
use super::crf_context::CrfContext;
use super::dictionary::Dictionary;
use super::evaluation::Evaluation;
use super::feature_gen::FeatureSet;
use super::model_writer;
use super::params::ParamSet;
use crate::dataset::Instance;
use crate::error::{Error, Result, Status};
use crate::log_parser::TrainLogParser;
use crate::message::{LogHook, Logger, MessageHook};
use crate::params::ParamValue;
use crate::sequence::IntoItemSequence;

pub(crate) mod arow;
pub(crate) mod averaged_perceptron;
pub(crate) mod l2sgd;
pub(crate) mod lbfgs;
pub(crate) mod passive_aggressive;

/// Instances and features of one training run
pub(crate) struct TrainData<'a> {
    pub train: Vec<&'a Instance>,
    pub holdout: Vec<&'a Instance>,
    pub fset: FeatureSet,
    pub labels: &'a Dictionary,
    pub num_labels: usize,
    pub max_items: usize,
    seed: Option<u64>,
}

impl TrainData<'_> {
    pub fn num_features(&self) -> usize {
        self.fset.num_features()
    }

    pub fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }

    pub fn context(&self) -> CrfContext {
        CrfContext::new(self.num_labels, self.max_items)
    }
}

/// Progress output of a training run
pub(crate) struct Reporter<'a, 'l> {
    logger: &'a mut Logger<'l>,
}

impl Reporter<'_, '_> {
    pub fn message(&mut self, text: &str) {
        self.logger.message(text);
    }

    /// Tag the holdout instances with `weights` and report the accuracy.
    pub fn holdout(&mut self, data: &TrainData<'_>, weights: &[f64]) {
        if data.holdout.is_empty() {
            return;
        }
        let mut ctx = data.context();
        ctx.set_transitions(&data.fset, weights);
        let mut eval = Evaluation::new(data.num_labels);
        for inst in &data.holdout {
            ctx.set_instance(inst, &data.fset, weights);
            let (path, _) = ctx.viterbi();
            eval.accumulate(&inst.labels, &path);
        }
        eval.finalize();
        for line in eval.report(data.labels) {
            self.message(&line);
        }
    }
}

pub(crate) fn feature_norm(weights: &[f64]) -> f64 {
    weights.iter().map(|w| w * w).sum::<f64>().sqrt()
}

pub(crate) fn active_features(weights: &[f64]) -> usize {
    weights.iter().filter(|&&w| w != 0.0).count()
}

/// Number of positions where `predicted` differs from the reference labels
pub(crate) fn num_errors(reference: &[u32], predicted: &[u32]) -> usize {
    reference
        .iter()
        .zip(predicted)
        .filter(|(r, p)| r != p)
        .count()
}

/// Viterbi path of `inst` under `weights`, with its score minus the score of the reference path
pub(crate) fn predict(
    ctx: &mut CrfContext,
    fset: &FeatureSet,
    inst: &Instance,
    weights: &[f64],
) -> (Vec<u32>, f64) {
    ctx.set_transitions(fset, weights);
    ctx.set_instance(inst, fset, weights);
    let (path, score) = ctx.viterbi();
    let margin = score - ctx.score(&inst.labels);
    (path, margin)
}

/// Feature counts of the reference path minus those of `predicted`; returns the squared norm.
pub(crate) fn feature_diff(
    fset: &FeatureSet,
    inst: &Instance,
    predicted: &[u32],
    diff: &mut [f64],
) -> f64 {
    diff.fill(0.0);
    fset.accumulate(inst, &inst.labels, 1.0, diff);
    fset.accumulate(inst, predicted, -1.0, diff);
    diff.iter().map(|d| d * d).sum()
}

/// Averaged weights `w - ws / c` of the online learners
pub(crate) fn averaged(weights: &[f64], summed: &[f64], c: f64) -> Vec<f64> {
    weights
        .iter()
        .zip(summed)
        .map(|(w, ws)| w - ws / c)
        .collect()
}

/// The trainer accumulates labeled sequences and estimates the parameters of a CRF model
///
/// ```no_run
/// use crfkit::Trainer;
///
/// let mut trainer = Trainer::new();
/// trainer.append(&[vec!["walk"], vec!["shop"]][..], &["sunny", "sunny"], 0)?;
/// trainer.set("c2", 0.1)?;
/// trainer.train("weather.crfsuite", None)?;
/// # Ok::<(), crfkit::Error>(())
/// ```
pub struct Trainer {
    instances: Vec<Instance>,
    attrs: Dictionary,
    labels: Dictionary,
    model_type: ModelType,
    params: ParamSet,
    hook: Box<dyn MessageHook>,
    log_parser: TrainLogParser,
    seed: Option<u64>,
}

impl fmt::Debug for Trainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Trainer")
            .field("instances", &self.instances.len())
            .field("attrs", &self.attrs.len())
            .field("labels", &self.labels.len())
            .field("algorithm", &self.params.algorithm())
            .field("model_type", &self.model_type)
            .field("seed", &self.seed)
            .finish()
    }
}

impl Default for Trainer {
    fn default() -> Self {
        Self::new()
    }
}

impl Trainer {
    /// Create a trainer with the `lbfgs` algorithm and the `crf1d` model selected
    pub fn new() -> Self {
        Self {
            instances: Vec::new(),
            attrs: Dictionary::new(),
            labels: Dictionary::new(),
            // Safe default selection; always valid
            model_type: ModelType::Crf1d,
            params: ParamSet::for_selection(Algorithm::Lbfgs),
            hook: Box::new(LogHook::new(false)),
            log_parser: TrainLogParser::new(),
            seed: None,
        }
    }

    pub fn builder() -> TrainerBuilder {
        TrainerBuilder::default()
    }

    /// Select the training algorithm and the model type by name.
    ///
    /// Names are case-insensitive; `ap` and `pa` are short for
    /// `averaged-perceptron` and `passive-aggressive`. Parameters are reset to
    /// the defaults of the new selection; appended instances are kept.
    pub fn select(&mut self, algorithm: &str, model_type: &str) -> Result<()> {
        let bad = || {
            Error::invalid(format!(
                "Bad arguments: algorithm={}, type={}",
                algorithm, model_type
            ))
        };
        let algorithm: Algorithm = algorithm.parse().map_err(|_| bad())?;
        let model_type: ModelType = model_type.parse().map_err(|_| bad())?;
        self.model_type = model_type;
        self.select_algorithm(algorithm);
        Ok(())
    }

    /// Select the training algorithm for the current model type.
    pub fn select_algorithm(&mut self, algorithm: Algorithm) {
        debug!(%algorithm, model_type = %self.model_type, "selected training algorithm");
        self.params = ParamSet::for_selection(algorithm);
    }

    pub fn algorithm(&self) -> Algorithm {
        self.params.algorithm()
    }

    pub fn model_type(&self) -> ModelType {
        self.model_type
    }

    /// Append an instance (item sequence, label sequence) to the training data.
    ///
    /// `group` tags the instance; instances of the group passed as `holdout`
    /// to [`Trainer::train`] are evaluated instead of trained on.
    pub fn append<X, S>(&mut self, xseq: X, yseq: &[S], group: u32) -> Result<()>
    where
        X: IntoItemSequence,
        S: AsRef<str>,
    {
        let xseq = xseq.into_item_sequence()?;
        if xseq.len() != yseq.len() {
            return Err(Error::invalid(format!(
                "The numbers of items and labels differ: |x| = {}, |y| = {}",
                xseq.len(),
                yseq.len()
            )));
        }
        if xseq.is_empty() {
            return Err(Error::invalid("Empty sequences are not allowed"));
        }

        let instance = Instance::encode(&xseq, yseq, group, &mut self.attrs, &mut self.labels);
        self.instances.push(instance);
        Ok(())
    }

    /// Number of appended instances
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Remove all instances and forget all attribute and label names
    pub fn clear(&mut self) {
        self.instances.clear();
        self.attrs.clear();
        self.labels.clear();
    }

    /// Names of the parameters of the current selection
    pub fn params(&self) -> Vec<String> {
        self.params.names()
    }

    /// Set a parameter.
    ///
    /// Booleans are sent as `1`/`0`, numbers in their shortest form.
    pub fn set<V: Into<ParamValue>>(&mut self, name: &str, value: V) -> Result<()> {
        let value = value.into().to_param_string();
        self.params.set(name, &value)
    }

    /// Get a parameter, decoded according to its declared kind
    pub fn get(&self, name: &str) -> Result<ParamValue> {
        let raw = self.params.get(name)?;
        Ok(ParamValue::decode(name, &raw))
    }

    /// Help text of a parameter of the current selection
    pub fn help(&self, name: &str) -> Result<String> {
        if !self.params().iter().any(|p| p == name) {
            return Err(Error::invalid(format!("Parameter not found: {}", name)));
        }
        self.params.help(name)
    }

    /// Set several parameters; stops at the first rejected value.
    pub fn set_params<I, K, V>(&mut self, params: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<ParamValue>,
    {
        for (name, value) in params {
            self.set(name.as_ref(), value)?;
        }
        Ok(())
    }

    /// All parameters of the current selection with their values
    pub fn get_params(&self) -> BTreeMap<String, ParamValue> {
        self.params
            .names()
            .into_iter()
            .filter_map(|name| {
                let value = self.get(&name).ok()?;
                Some((name, value))
            })
            .collect()
    }

    /// Install the receiver of the progress messages
    pub fn set_hook<H: MessageHook + 'static>(&mut self, hook: H) {
        self.hook = Box::new(hook);
    }

    /// Fix the seed used to shuffle instances, for reproducible training.
    pub fn set_seed(&mut self, seed: Option<u64>) {
        self.seed = seed;
    }

    /// Parsed progress messages of the last training run
    pub fn log_parser(&self) -> &TrainLogParser {
        &self.log_parser
    }

    /// Train a model and store it at `path`.
    ///
    /// An empty `path` trains without writing a file. Instances of the
    /// `holdout` group are excluded from training and evaluated after every
    /// iteration.
    pub fn train<P: AsRef<Path>>(&mut self, path: P, holdout: Option<u32>) -> Result<()> {
        let path = path.as_ref();
        let params = self.params.clone();
        let options = params.feature_options()?;

        let (train, held): (Vec<&Instance>, Vec<&Instance>) = self
            .instances
            .iter()
            .partition(|inst| holdout != Some(inst.group));
        if train.is_empty() {
            return Err(Status::Incompatible.into());
        }
        let max_items = self
            .instances
            .iter()
            .map(Instance::num_items)
            .max()
            .unwrap_or(0);
        debug!(
            instances = train.len(),
            holdout = held.len(),
            algorithm = %params.algorithm(),
            "training started"
        );

        self.log_parser = TrainLogParser::new();
        let mut logger = Logger::new(&mut *self.hook, &mut self.log_parser);
        let started = Instant::now();

        logger.message("Feature generation\n");
        logger.message("type: CRF1d\n");
        logger.message(&format!("feature.minfreq: {:.6}\n", options.minfreq));
        logger.message(&format!(
            "feature.possible_states: {}\n",
            u8::from(options.possible_states)
        ));
        logger.message(&format!(
            "feature.possible_transitions: {}\n",
            u8::from(options.possible_transitions)
        ));
        logger.progress_start();
        let fset = FeatureSet::generate(
            &train,
            self.attrs.len(),
            self.labels.len(),
            options,
            |percent| logger.progress(percent),
        )?;
        logger.progress_end();
        logger.message(&format!("Number of features: {}\n", fset.num_features()));
        logger.message(&format!(
            "Seconds required: {:.3}\n",
            started.elapsed().as_secs_f64()
        ));
        logger.message("\n");

        let data = TrainData {
            train,
            holdout: held,
            fset,
            labels: &self.labels,
            num_labels: self.labels.len(),
            max_items,
            seed: self.seed,
        };
        let mut out = Reporter {
            logger: &mut logger,
        };
        let started = Instant::now();
        let weights = match params.algorithm() {
            Algorithm::Lbfgs => {
                lbfgs::train(&data, &mut out, &lbfgs::LbfgsParams::from_params(&params)?)
            }
            Algorithm::L2Sgd => {
                l2sgd::train(&data, &mut out, &l2sgd::L2SgdParams::from_params(&params)?)
            }
            Algorithm::AveragedPerceptron => averaged_perceptron::train(
                &data,
                &mut out,
                &averaged_perceptron::AveragedPerceptronParams::from_params(&params)?,
            ),
            Algorithm::PassiveAggressive => passive_aggressive::train(
                &data,
                &mut out,
                &passive_aggressive::PassiveAggressiveParams::from_params(&params)?,
            ),
            Algorithm::Arow => {
                arow::train(&data, &mut out, &arow::ArowParams::from_params(&params)?)
            }
        }?;
        out.message(&format!(
            "Total seconds required for training: {:.3}\n",
            started.elapsed().as_secs_f64()
        ));
        out.message("\n");

        if path.as_os_str().is_empty() {
            debug!("training finished without storing a model");
            return Ok(());
        }

        let started = Instant::now();
        out.message("Storing the model\n");
        let summary = model_writer::write(path, &data.fset, &weights, data.labels, &self.attrs)?;
        out.message(&format!(
            "Number of active features: {} ({})\n",
            summary.active_features, summary.num_features
        ));
        out.message(&format!(
            "Number of active attributes: {} ({})\n",
            summary.active_attrs, summary.num_attrs
        ));
        out.message(&format!(
            "Number of active labels: {} ({})\n",
            summary.active_labels, summary.num_labels
        ));
        out.message("Writing labels\n");
        out.message("Writing attributes\n");
        out.message("Writing feature references for transitions\n");
        out.message("Writing feature references for attributes\n");
        out.message(&format!(
            "Seconds required: {:.3}\n",
            started.elapsed().as_secs_f64()
        ));
        out.message("\n");
        debug!(path = %path.display(), "stored model");
        Ok(())
    }
}

/// Builder for a configured [`Trainer`]
#[derive(Default)]
pub struct TrainerBuilder {
    algorithm: Algorithm,
    model_type: ModelType,
    params: Vec<(String, ParamValue)>,
    hook: Option<Box<dyn MessageHook>>,
    verbose: bool,
    seed: Option<u64>,
}

impl TrainerBuilder {
    pub fn algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn model_type(mut self, model_type: ModelType) -> Self {
        self.model_type = model_type;
        self
    }

    /// Parameter applied after the algorithm has been selected
    pub fn param<V: Into<ParamValue>>(mut self, name: &str, value: V) -> Self {
        self.params.push((name.to_string(), value.into()));
        self
    }

    pub fn hook<H: MessageHook + 'static>(mut self, hook: H) -> Self {
        self.hook = Some(Box::new(hook));
        self
    }

    /// Log every progress line through `tracing` when no hook is installed
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn build(self) -> Result<Trainer> {
        let mut trainer = Trainer::new();
        trainer.select_algorithm(self.algorithm);
        trainer.model_type = self.model_type;
        trainer.set_params(self.params)?;
        trainer.hook = match self.hook {
            Some(hook) => hook,
            None => Box::new(LogHook::new(self.verbose)),
        };
        trainer.seed = self.seed;
        Ok(trainer)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn weather(trainer: &mut Trainer) {
        let data: [(&[&str], &[&str]); 3] = [
            (&["walk", "shop", "clean"], &["sunny", "sunny", "rainy"]),
            (&["walk", "walk", "clean"], &["sunny", "sunny", "rainy"]),
            (&["clean", "shop"], &["rainy", "rainy"]),
        ];
        for (group, (xs, ys)) in data.iter().enumerate() {
            let xseq: Vec<Vec<&str>> = xs.iter().map(|x| vec![*x]).collect();
            trainer.append(&xseq[..], ys, group as u32).unwrap();
        }
    }

    #[test]
    fn test_default_selection() {
        let trainer = Trainer::new();
        assert_eq!(trainer.algorithm(), Algorithm::Lbfgs);
        assert_eq!(trainer.model_type(), ModelType::Crf1d);
        assert!(trainer.params().contains(&"c1".to_string()));
    }

    #[test]
    fn test_select_by_name() {
        let mut trainer = Trainer::new();
        trainer.select("AP", "CRF1d").unwrap();
        assert_eq!(trainer.algorithm(), Algorithm::AveragedPerceptron);
        let err = trainer.select("sgd", "crf1d").unwrap_err();
        assert_eq!(err.to_string(), "Bad arguments: algorithm=sgd, type=crf1d");
        assert_eq!(trainer.algorithm(), Algorithm::AveragedPerceptron);
    }

    #[test]
    fn test_append_validates_lengths() {
        let mut trainer = Trainer::new();
        let err = trainer
            .append(&[vec!["walk"], vec!["shop"]][..], &["sunny"], 0)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "The numbers of items and labels differ: |x| = 2, |y| = 1"
        );
        let empty: &[Vec<&str>] = &[];
        let no_labels: &[&str] = &[];
        assert!(trainer.append(empty, no_labels, 0).is_err());
        assert!(trainer.is_empty());

        weather(&mut trainer);
        assert_eq!(trainer.len(), 3);
        assert_eq!(trainer.attrs.len(), 3);
        assert_eq!(trainer.labels.len(), 2);
        trainer.clear();
        assert!(trainer.is_empty());
        assert!(trainer.labels.is_empty());
    }

    #[test]
    fn test_typed_parameters() {
        let mut trainer = Trainer::new();
        trainer.set("c2", 0.5).unwrap();
        trainer.set("feature.possible_states", true).unwrap();
        trainer.set("max_iterations", 20).unwrap();
        assert_eq!(trainer.get("c2").unwrap(), ParamValue::Float(0.5));
        assert_eq!(trainer.get("feature.possible_states").unwrap(), ParamValue::Int(1));
        assert_eq!(trainer.get("max_iterations").unwrap(), ParamValue::Int(20));
        assert!(trainer.set("c2", -0.5).is_err());
        assert_eq!(trainer.get("c2").unwrap().as_f64(), Some(0.5));

        let params = trainer.get_params();
        assert_eq!(params.len(), trainer.params().len());
        assert_eq!(params["linesearch"], ParamValue::Text("MoreThuente".into()));
    }

    #[test]
    fn test_help_requires_known_name() {
        let mut trainer = Trainer::new();
        assert!(trainer.help("c1").unwrap().contains("L1"));
        trainer.select_algorithm(Algorithm::Arow);
        let err = trainer.help("c1").unwrap_err();
        assert!(err.is_invalid_argument());
    }

    #[test]
    fn test_train_without_instances() {
        let mut trainer = Trainer::new();
        let err = trainer.train("", None).unwrap_err();
        assert_eq!(err.status(), Some(Status::Incompatible));

        // Every instance in the holdout group leaves nothing to train on
        trainer.append(&[vec!["walk"]][..], &["sunny"], 7).unwrap();
        let err = trainer.train("", Some(7)).unwrap_err();
        assert_eq!(err.status(), Some(Status::Incompatible));
    }

    #[test]
    fn test_builder() {
        let trainer = Trainer::builder()
            .algorithm(Algorithm::PassiveAggressive)
            .param("type", 2)
            .param("averaging", false)
            .seed(7)
            .build()
            .unwrap();
        assert_eq!(trainer.algorithm(), Algorithm::PassiveAggressive);
        assert_eq!(trainer.get("type").unwrap(), ParamValue::Int(2));
        assert_eq!(trainer.get("averaging").unwrap().as_bool(), Some(false));

        let err = Trainer::builder().param("c1", 1.0).algorithm(Algorithm::Arow).build();
        assert!(err.is_err());
    }

    #[test]
    fn test_train_logs_iterations() {
        let mut trainer = Trainer::builder().param("max_iterations", 3).build().unwrap();
        weather(&mut trainer);
        trainer.train("", Some(2)).unwrap();
        let log = trainer.log_parser();
        assert_eq!(log.featgen_percent, 100);
        assert!(!log.iterations.is_empty());
        assert!(log.iterations.len() <= 3);
        let last = log.last_iteration().unwrap();
        assert!(last.loss.is_some());
        assert_eq!(last.item_accuracy.map(|(_, total)| total), Some(2));
    }
}
