//! Training of linear-chain CRF models
//!
//! This module contains all the components needed to train CRF models,
//! including feature generation, optimization, holdout evaluation and model
//! serialization.

mod algorithm;
mod crf_context;
mod dictionary;
mod evaluation;
mod feature_gen;
pub(crate) mod model_writer;
mod params;
mod trainer;

pub use self::algorithm::{Algorithm, ModelType};
pub(crate) use self::dictionary::Dictionary;
pub use self::trainer::{Trainer, TrainerBuilder};
