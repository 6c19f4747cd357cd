//! String-keyed parameter table of a trainer selection.
//!
//! Every (model type, algorithm) selection owns one table. Values are
//! exchanged as text; each entry has an engine type used to parse it, a
//! default and a help text. Range checks are delegated to the typed
//! parameter structs of the algorithms, so a rejected value never stays in
//! the table.

use std::fmt;

use super::algorithm::Algorithm;
use super::feature_gen::FeatureOptions;
use super::trainer::{
    arow::ArowParams, averaged_perceptron::AveragedPerceptronParams, l2sgd::L2SgdParams,
    lbfgs::LbfgsParams, passive_aggressive::PassiveAggressiveParams,
};
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum EngineValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl EngineValue {
    fn parse_like(&self, raw: &str) -> Option<EngineValue> {
        let raw = raw.trim();
        match self {
            EngineValue::Int(_) => raw
                .parse()
                .ok()
                .or_else(|| {
                    raw.parse::<f64>()
                        .ok()
                        .filter(|v| v.fract() == 0.0)
                        .map(|v| v as i64)
                })
                .map(EngineValue::Int),
            EngineValue::Float(_) => raw.parse().ok().map(EngineValue::Float),
            EngineValue::Text(_) => Some(EngineValue::Text(raw.to_string())),
        }
    }
}

impl fmt::Display for EngineValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineValue::Int(v) => write!(f, "{}", v),
            EngineValue::Float(v) => write!(f, "{}", v),
            EngineValue::Text(v) => f.write_str(v),
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    name: &'static str,
    value: EngineValue,
    help: &'static str,
}

fn int(name: &'static str, value: i64, help: &'static str) -> Entry {
    Entry {
        name,
        value: EngineValue::Int(value),
        help,
    }
}

fn float(name: &'static str, value: f64, help: &'static str) -> Entry {
    Entry {
        name,
        value: EngineValue::Float(value),
        help,
    }
}

fn text(name: &'static str, value: &str, help: &'static str) -> Entry {
    Entry {
        name,
        value: EngineValue::Text(value.to_string()),
        help,
    }
}

fn crf1d_entries() -> Vec<Entry> {
    vec![
        float(
            "feature.minfreq",
            0.0,
            "The minimum frequency of features.",
        ),
        int(
            "feature.possible_states",
            0,
            "Force to generate possible state features.",
        ),
        int(
            "feature.possible_transitions",
            0,
            "Force to generate possible transition features.",
        ),
    ]
}

fn algorithm_entries(algorithm: Algorithm) -> Vec<Entry> {
    match algorithm {
        Algorithm::Lbfgs => vec![
            float("c1", 0.0, "Coefficient for L1 regularization."),
            float("c2", 1.0, "Coefficient for L2 regularization."),
            int(
                "num_memories",
                6,
                "The number of limited memories for approximating the inverse hessian matrix. \
                 Stored for reference only; the optimizer always uses 6.",
            ),
            int(
                "max_iterations",
                i64::from(i32::MAX),
                "The maximum number of iterations for L-BFGS optimization.",
            ),
            float(
                "epsilon",
                1e-5,
                "Epsilon for testing the convergence of the objective.",
            ),
            int(
                "period",
                10,
                "The duration of iterations to test the stopping criterion.",
            ),
            float(
                "delta",
                1e-5,
                "The threshold for the stopping criterion; an L-BFGS iteration stops when the \
                 improvement of the log likelihood over the last ${period} iterations is no \
                 greater than this threshold.",
            ),
            text(
                "linesearch",
                "MoreThuente",
                "The line search algorithm used in L-BFGS updates:\n\
                 {   'MoreThuente': More and Thuente's method,\n\
                 \x20   'Backtracking': Backtracking method with regular Wolfe condition,\n\
                 \x20   'StrongBacktracking': Backtracking method with strong Wolfe condition\n\
                 }\n",
            ),
            int(
                "max_linesearch",
                20,
                "The maximum number of trials for the line search algorithm.",
            ),
        ],
        Algorithm::L2Sgd => vec![
            float("c2", 1.0, "Coefficient for L2 regularization."),
            int(
                "max_iterations",
                1000,
                "The maximum number of iterations (epochs) for SGD optimization.",
            ),
            int(
                "period",
                10,
                "The duration of iterations to test the stopping criterion.",
            ),
            float(
                "delta",
                1e-6,
                "The threshold for the stopping criterion; an optimization process stops when \
                 the improvement of the log likelihood over the last ${period} iterations is no \
                 greater than this threshold.",
            ),
            float(
                "calibration.eta",
                0.1,
                "The initial value of learning rate (eta) used for calibration.",
            ),
            float(
                "calibration.rate",
                2.0,
                "The rate of increase/decrease of learning rate for calibration.",
            ),
            int(
                "calibration.samples",
                1000,
                "The number of instances used for calibration.",
            ),
            int(
                "calibration.candidates",
                10,
                "The number of candidates of learning rate.",
            ),
            int(
                "calibration.max_trials",
                20,
                "The maximum number of trials of learning rates for calibration.",
            ),
        ],
        Algorithm::AveragedPerceptron => vec![
            int("max_iterations", 100, "The maximum number of iterations."),
            float(
                "epsilon",
                0.0,
                "The stopping criterion (the average number of errors).",
            ),
        ],
        Algorithm::PassiveAggressive => vec![
            int(
                "type",
                1,
                "The strategy for updating feature weights: {\n\
                 \x20   0: PA without slack variables,\n\
                 \x20   1: PA type I,\n\
                 \x20   2: PA type II\n\
                 }.\n",
            ),
            float("c", 1.0, "The aggressiveness parameter."),
            int(
                "error_sensitive",
                1,
                "Consider the number of incorrect labels to the cost function.",
            ),
            int(
                "averaging",
                1,
                "Compute the average of feature weights (similarly to Averaged Perceptron).",
            ),
            int("max_iterations", 100, "The maximum number of iterations."),
            float("epsilon", 0.0, "The stopping criterion (the mean loss)."),
        ],
        Algorithm::Arow => vec![
            float(
                "variance",
                1.0,
                "The initial variance of every feature weight.",
            ),
            float("gamma", 1.0, "Tradeoff parameter."),
            int("max_iterations", 100, "The maximum number of iterations."),
            float("epsilon", 0.0, "The stopping criterion (the mean loss)."),
        ],
    }
}

fn not_found(name: &str) -> Error {
    Error::invalid(format!("Parameter not found: {}", name))
}

/// Parameter table of one trainer selection
#[derive(Debug, Clone)]
pub(crate) struct ParamSet {
    algorithm: Algorithm,
    entries: Vec<Entry>,
}

impl ParamSet {
    /// Defaults of the crf1d model with `algorithm`
    pub fn for_selection(algorithm: Algorithm) -> Self {
        let mut entries = crf1d_entries();
        entries.extend(algorithm_entries(algorithm));
        Self { algorithm, entries }
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.name.to_string()).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entry(name).is_some()
    }

    fn entry(&self, name: &str) -> Option<&Entry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Set `name` from its text form.
    ///
    /// The value must parse for the parameter's type and pass the range checks
    /// of the selection; otherwise the previous value is kept.
    pub fn set(&mut self, name: &str, raw: &str) -> Result<()> {
        let index = self
            .entries
            .iter()
            .position(|e| e.name == name)
            .ok_or_else(|| not_found(name))?;
        let value = self.entries[index].value.parse_like(raw).ok_or_else(|| {
            Error::invalid(format!("Invalid value for parameter {}: {}", name, raw))
        })?;
        let previous = std::mem::replace(&mut self.entries[index].value, value);
        if let Err(err) = self.validate() {
            self.entries[index].value = previous;
            return Err(err);
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<String> {
        self.entry(name)
            .map(|e| e.value.to_string())
            .ok_or_else(|| not_found(name))
    }

    pub fn help(&self, name: &str) -> Result<String> {
        self.entry(name)
            .map(|e| e.help.to_string())
            .ok_or_else(|| not_found(name))
    }

    pub fn int(&self, name: &str) -> Result<i64> {
        match self.entry(name).map(|e| &e.value) {
            Some(EngineValue::Int(v)) => Ok(*v),
            _ => Err(not_found(name)),
        }
    }

    pub fn float(&self, name: &str) -> Result<f64> {
        match self.entry(name).map(|e| &e.value) {
            Some(EngineValue::Float(v)) => Ok(*v),
            _ => Err(not_found(name)),
        }
    }

    pub fn text(&self, name: &str) -> Result<&str> {
        match self.entry(name).map(|e| &e.value) {
            Some(EngineValue::Text(v)) => Ok(v),
            _ => Err(not_found(name)),
        }
    }

    /// Non-negative integer parameter as `usize`
    pub fn count(&self, name: &str) -> Result<usize> {
        let value = self.int(name)?;
        usize::try_from(value)
            .map_err(|_| Error::invalid(format!("{} must be non-negative", name)))
    }

    pub fn flag(&self, name: &str) -> Result<bool> {
        Ok(self.int(name)? != 0)
    }

    pub fn feature_options(&self) -> Result<FeatureOptions> {
        let minfreq = self.float("feature.minfreq")?;
        if minfreq < 0.0 {
            return Err(Error::invalid("feature.minfreq must be non-negative"));
        }
        Ok(FeatureOptions {
            minfreq,
            possible_states: self.flag("feature.possible_states")?,
            possible_transitions: self.flag("feature.possible_transitions")?,
        })
    }

    fn validate(&self) -> Result<()> {
        self.feature_options()?;
        match self.algorithm {
            Algorithm::Lbfgs => LbfgsParams::from_params(self).map(drop),
            Algorithm::L2Sgd => L2SgdParams::from_params(self).map(drop),
            Algorithm::AveragedPerceptron => AveragedPerceptronParams::from_params(self).map(drop),
            Algorithm::PassiveAggressive => PassiveAggressiveParams::from_params(self).map(drop),
            Algorithm::Arow => ArowParams::from_params(self).map(drop),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_defaults_per_selection() {
        let params = ParamSet::for_selection(Algorithm::Lbfgs);
        assert_eq!(params.get("c2").unwrap(), "1");
        assert_eq!(params.get("max_iterations").unwrap(), "2147483647");
        assert_eq!(params.get("linesearch").unwrap(), "MoreThuente");
        assert_eq!(params.get("feature.possible_states").unwrap(), "0");
        assert!(params.names().starts_with(&[
            "feature.minfreq".to_string(),
            "feature.possible_states".to_string(),
            "feature.possible_transitions".to_string(),
        ]));

        let params = ParamSet::for_selection(Algorithm::PassiveAggressive);
        assert_eq!(params.get("type").unwrap(), "1");
        assert!(params.get("c2").is_err());

        for algorithm in Algorithm::ALL {
            assert!(ParamSet::for_selection(algorithm).validate().is_ok());
        }
    }

    #[test]
    fn test_set_parses_by_type() {
        let mut params = ParamSet::for_selection(Algorithm::Lbfgs);
        params.set("c1", "0.25").unwrap();
        assert_eq!(params.float("c1").unwrap(), 0.25);
        params.set("max_iterations", "50").unwrap();
        assert_eq!(params.int("max_iterations").unwrap(), 50);
        params.set("max_iterations", "60.0").unwrap();
        assert_eq!(params.get("max_iterations").unwrap(), "60");
        params.set("linesearch", "Backtracking").unwrap();
        assert_eq!(params.text("linesearch").unwrap(), "Backtracking");
        assert!(params.set("c1", "much").is_err());
        assert_eq!(params.get("c1").unwrap(), "0.25");
    }

    #[test]
    fn test_rejected_values_are_reverted() {
        let mut params = ParamSet::for_selection(Algorithm::Lbfgs);
        let err = params.set("c2", "-1").unwrap_err();
        assert_eq!(err.to_string(), "c2 must be non-negative");
        assert_eq!(params.get("c2").unwrap(), "1");
        assert!(params.set("linesearch", "Bisection").is_err());
        assert!(params.set("feature.minfreq", "-2").is_err());

        let mut params = ParamSet::for_selection(Algorithm::PassiveAggressive);
        assert!(params.set("type", "3").is_err());
        assert_eq!(params.get("type").unwrap(), "1");
    }

    #[test]
    fn test_unknown_parameter() {
        let mut params = ParamSet::for_selection(Algorithm::Arow);
        let err = params.set("c1", "1").unwrap_err();
        assert_eq!(err.to_string(), "Parameter not found: c1");
        assert!(params.help("c1").is_err());
        assert!(params.help("gamma").unwrap().contains("Tradeoff"));
    }
}
