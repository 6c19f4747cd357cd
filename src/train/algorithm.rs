use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Training algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Algorithm {
    /// Gradient descent using the L-BFGS method
    #[default]
    Lbfgs,
    /// Stochastic Gradient Descent with L2 regularization term
    L2Sgd,
    /// Averaged Perceptron
    AveragedPerceptron,
    /// Passive Aggressive
    PassiveAggressive,
    /// Adaptive Regularization Of Weight Vector
    Arow,
}

impl Algorithm {
    pub const ALL: [Algorithm; 5] = [
        Algorithm::Lbfgs,
        Algorithm::L2Sgd,
        Algorithm::AveragedPerceptron,
        Algorithm::PassiveAggressive,
        Algorithm::Arow,
    ];

    /// Canonical name used when selecting the algorithm by text
    pub fn name(self) -> &'static str {
        match self {
            Algorithm::Lbfgs => "lbfgs",
            Algorithm::L2Sgd => "l2sgd",
            Algorithm::AveragedPerceptron => "averaged-perceptron",
            Algorithm::PassiveAggressive => "passive-aggressive",
            Algorithm::Arow => "arow",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Algorithm {
    type Err = Error;

    /// Case-insensitive; `ap` and `pa` are accepted as short names.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "lbfgs" => Ok(Algorithm::Lbfgs),
            "l2sgd" => Ok(Algorithm::L2Sgd),
            "ap" | "averaged-perceptron" => Ok(Algorithm::AveragedPerceptron),
            "pa" | "passive-aggressive" => Ok(Algorithm::PassiveAggressive),
            "arow" => Ok(Algorithm::Arow),
            _ => Err(Error::invalid(format!("Unknown algorithm: {}", s))),
        }
    }
}

/// Graphical model type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ModelType {
    /// First-order linear-chain CRF
    #[default]
    Crf1d,
}

impl ModelType {
    pub fn name(self) -> &'static str {
        match self {
            ModelType::Crf1d => "crf1d",
        }
    }
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ModelType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "crf1d" | "1d" => Ok(ModelType::Crf1d),
            _ => Err(Error::invalid(format!("Unknown model type: {}", s))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_algorithm() {
        assert_eq!("LBFGS".parse::<Algorithm>().unwrap(), Algorithm::Lbfgs);
        assert_eq!("ap".parse::<Algorithm>().unwrap(), Algorithm::AveragedPerceptron);
        assert_eq!("PA".parse::<Algorithm>().unwrap(), Algorithm::PassiveAggressive);
        assert!("sgd".parse::<Algorithm>().is_err());
        for algorithm in Algorithm::ALL {
            assert_eq!(algorithm.name().parse::<Algorithm>().unwrap(), algorithm);
        }
    }

    #[test]
    fn test_parse_model_type() {
        assert_eq!("CRF1d".parse::<ModelType>().unwrap(), ModelType::Crf1d);
        assert!("crf2d".parse::<ModelType>().is_err());
        assert_eq!(ModelType::default().to_string(), "crf1d");
    }
}
