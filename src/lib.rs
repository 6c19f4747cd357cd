//! Trainer and tagger for linear-chain Conditional Random Fields
//!
//! Models are stored in the CRFsuite binary format. The [`Trainer`]
//! accumulates labeled sequences and writes a model file; the [`Tagger`]
//! opens a model file and labels new sequences.
//!
//! # Examples
//!
//! ## Training
//!
//! ```no_run
//! use crfkit::{Attribute, Trainer};
//!
//! let mut trainer = Trainer::new();
//! trainer.select("lbfgs", "crf1d")?;
//!
//! let xseq = vec![
//!     vec![Attribute::new("walk", 1.0)],
//!     vec![Attribute::new("shop", 1.0)],
//! ];
//! trainer.append(&xseq, &["sunny", "rainy"], 0)?;
//!
//! trainer.set("c2", 1.0)?;
//! trainer.train("model.crfsuite", None)?;
//! # Ok::<(), crfkit::Error>(())
//! ```
//!
//! ## Prediction
//!
//! ```no_run
//! use crfkit::Tagger;
//!
//! let mut tagger = Tagger::new();
//! let mut tagger = tagger.open("model.crfsuite")?;
//! let labels = tagger.tag(&[vec!["walk"], vec!["shop"]])?;
//! let p = tagger.probability(&labels)?;
//! println!("{:?} ({:.4})", labels, p);
//! # Ok::<(), crfkit::Error>(())
//! ```

mod context;
mod dataset;
mod dump_parser;
mod error;
mod feature;
mod handle;
mod log_parser;
mod message;
mod model;
mod params;
mod sequence;
mod tagger;
mod validate;

/// Training of CRF models
pub mod train;

pub use self::dump_parser::{DumpParser, ParsedDump};
pub use self::error::{status_message, Error, ModelFileProblem, Result, Status};
pub use self::log_parser::{Iteration, LabelScore, TrainEvent, TrainLogParser};
pub use self::message::{LogHook, MessageHook};
pub use self::params::{ParamKind, ParamValue, PARAMETER_TYPES};
pub use self::sequence::{Attribute, AttributeKey, IntoItemSequence, Item, ItemSequence, Observation};
pub use self::tagger::{Closing, Tagger};
pub use self::train::{Algorithm, ModelType, Trainer, TrainerBuilder};
pub use self::validate::{validate_model_bytes, validate_model_file};
