use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::ops::{Deref, DerefMut};
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::debug;

use crate::dump_parser::{DumpParser, ParsedDump};
use crate::error::{Error, ModelFileProblem, Result};
use crate::handle::ModelHandle;
use crate::sequence::IntoItemSequence;
use crate::validate::{validate_model_bytes, validate_model_file, MEMORY_PATH};

/// The tagger provides the functionality for predicting label sequences for input sequences using a model
///
/// A tagger starts closed. [`Tagger::open`] loads a model file and returns a
/// [`Closing`] guard that closes the tagger again when it goes out of scope.
///
/// ```no_run
/// use crfkit::Tagger;
///
/// let mut tagger = Tagger::new();
/// let tagger = tagger.open("weather.crfsuite")?;
/// let labels = tagger.labels()?;
/// # Ok::<(), crfkit::Error>(())
/// ```
#[derive(Debug, Default)]
pub struct Tagger {
    handle: Option<ModelHandle>,
}

/// Scoped guard returned by [`Tagger::open`]
///
/// Dropping the guard closes the tagger. Call [`Closing::detach`] to keep the
/// model open past the guard's scope.
#[must_use = "dropping the guard closes the tagger immediately"]
#[derive(Debug)]
pub struct Closing<'t> {
    tagger: &'t mut Tagger,
    armed: bool,
}

impl<'t> Closing<'t> {
    /// Keep the model open after the guard is gone.
    pub fn detach(mut self) {
        self.armed = false;
    }
}

impl Deref for Closing<'_> {
    type Target = Tagger;

    fn deref(&self) -> &Tagger {
        self.tagger
    }
}

impl DerefMut for Closing<'_> {
    fn deref_mut(&mut self) -> &mut Tagger {
        self.tagger
    }
}

impl Drop for Closing<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.tagger.close();
        }
    }
}

impl Tagger {
    /// Create a closed tagger
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a model file.
    ///
    /// The file is validated before it reaches the model loader. Any previously
    /// opened model is released first.
    pub fn open<P: AsRef<Path>>(&mut self, path: P) -> Result<Closing<'_>> {
        let path = path.as_ref();
        self.close();
        validate_model_file(path)?;
        let data = fs::read(path).map_err(|e| Error::model_file(path, ModelFileProblem::Open(e)))?;
        let handle =
            ModelHandle::load(data).map_err(|e| Error::model_file(path, ModelFileProblem::Load(e)))?;
        debug!(path = %path.display(), "opened model");
        Ok(self.install(handle))
    }

    /// Open a model held in memory.
    pub fn open_in_memory(&mut self, data: Vec<u8>) -> Result<Closing<'_>> {
        self.close();
        validate_model_bytes(&data)?;
        let handle = ModelHandle::load(data)
            .map_err(|e| Error::model_file(MEMORY_PATH, ModelFileProblem::Load(e)))?;
        debug!("opened in-memory model");
        Ok(self.install(handle))
    }

    fn install(&mut self, handle: ModelHandle) -> Closing<'_> {
        self.handle = Some(handle);
        Closing {
            tagger: self,
            armed: true,
        }
    }

    /// Release the model. Closing a closed tagger does nothing.
    pub fn close(&mut self) {
        if self.handle.take().is_some() {
            debug!("closed model");
        }
    }

    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    fn handle(&self) -> Result<&ModelHandle> {
        self.handle
            .as_ref()
            .ok_or_else(|| Error::invalid("The tagger is not opened"))
    }

    fn handle_mut(&mut self) -> Result<&mut ModelHandle> {
        self.handle
            .as_mut()
            .ok_or_else(|| Error::invalid("The tagger is not opened"))
    }

    /// Obtain the list of labels
    pub fn labels(&self) -> Result<Vec<String>> {
        self.handle()?.labels()
    }

    /// Set an item sequence as the current sequence
    pub fn set<X: IntoItemSequence>(&mut self, xseq: X) -> Result<()> {
        let handle = self.handle_mut()?;
        let xseq = xseq.into_item_sequence()?;
        handle.set(&xseq)
    }

    /// Predict the label sequence for the item sequence.
    pub fn tag<X: IntoItemSequence>(&mut self, xseq: X) -> Result<Vec<String>> {
        self.set(xseq)?;
        self.tag_current()
    }

    /// Predict the label sequence for the current sequence.
    pub fn tag_current(&mut self) -> Result<Vec<String>> {
        let (labels, score) = self.handle_mut()?.viterbi()?;
        debug!(num_items = labels.len(), score, "tagged sequence");
        Ok(labels)
    }

    /// Compute the probability of the label sequence given the current sequence
    pub fn probability<S: AsRef<str>>(&self, yseq: &[S]) -> Result<f64> {
        self.handle()?.probability(yseq)
    }

    /// Compute the marginal probability of `label` at `position` of the current sequence
    pub fn marginal(&self, label: &str, position: usize) -> Result<f64> {
        self.handle()?.marginal(label, position)
    }

    /// Dump the model in text format to `destination`, or to stdout for `None`
    pub fn dump(&self, destination: Option<&Path>) -> Result<()> {
        let handle = self.handle()?;
        match destination {
            Some(path) => {
                let mut w = BufWriter::new(File::create(path)?);
                handle.dump(&mut w)?;
                w.flush()?;
            }
            None => {
                let stdout = io::stdout();
                let mut w = stdout.lock();
                handle.dump(&mut w)?;
                w.flush()?;
            }
        }
        Ok(())
    }

    /// Dump the model in text format to a writer
    pub fn dump_to<W: Write>(&self, w: &mut W) -> Result<()> {
        self.handle()?.dump(w)?;
        Ok(())
    }

    /// Structured view of the model, parsed back from its text dump
    pub fn info(&self) -> Result<ParsedDump> {
        let handle = self.handle()?;
        let mut file = NamedTempFile::new()?;
        {
            let mut w = BufWriter::new(file.as_file_mut());
            handle.dump(&mut w)?;
            w.flush()?;
        }
        let mut parser = DumpParser::new();
        for line in BufReader::new(file.reopen()?).lines() {
            parser.feed(&line?)?;
        }
        Ok(parser.finish())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use pretty_assertions::assert_eq;
    use tempfile::NamedTempFile;

    use super::*;
    use crate::model::set_feature_target;
    use crate::train::model_writer::sample_model;

    fn model_file() -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&sample_model()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_closed_tagger_rejects_operations() {
        let mut tagger = Tagger::new();
        assert!(!tagger.is_open());
        let err = tagger.labels().unwrap_err();
        assert_eq!(err.to_string(), "The tagger is not opened");
        assert!(tagger.tag(vec![vec!["walk"]]).is_err());
        assert!(tagger.probability(&["sunny"]).is_err());
        assert!(tagger.marginal("sunny", 0).is_err());
        assert!(tagger.info().is_err());
        // Closing twice is a no-op
        tagger.close();
        tagger.close();
    }

    #[test]
    fn test_guard_closes_on_drop() {
        let file = model_file();
        let mut tagger = Tagger::new();
        {
            let guard = tagger.open(file.path()).unwrap();
            assert!(guard.is_open());
        }
        assert!(!tagger.is_open());

        tagger.open(file.path()).unwrap().detach();
        assert!(tagger.is_open());
    }

    #[test]
    fn test_tag_and_probability() {
        let mut tagger = Tagger::new();
        let mut tagger = tagger.open_in_memory(sample_model()).unwrap();
        let labels = tagger.tag(vec![vec!["walk"], vec!["clean"]]).unwrap();
        assert_eq!(labels, vec!["sunny", "rainy"]);
        let best = tagger.probability(&labels[..]).unwrap();
        for other in [["sunny", "sunny"], ["rainy", "rainy"], ["rainy", "sunny"]] {
            assert!(tagger.probability(&other).unwrap() <= best);
        }
        let m: f64 = ["sunny", "rainy"]
            .iter()
            .map(|l| tagger.marginal(l, 1).unwrap())
            .sum();
        assert!((m - 1.0).abs() < 1e-9);
        assert_eq!(tagger.tag_current().unwrap(), labels);
    }

    #[test]
    fn test_loader_failure_names_path() {
        let mut bytes = sample_model();
        // Point the label dictionary past the end of the file
        bytes[32..36].copy_from_slice(&u32::MAX.to_le_bytes());
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&bytes).unwrap();
        file.flush().unwrap();

        let mut tagger = Tagger::new();
        let err = tagger.open(file.path()).unwrap_err();
        assert!(err.is_invalid_argument());
        assert!(err.to_string().contains(&file.path().display().to_string()));
        assert!(matches!(
            err,
            Error::InvalidModelFile {
                problem: ModelFileProblem::Load(_),
                ..
            }
        ));
        assert!(!tagger.is_open());
    }

    #[test]
    fn test_dump_to_file_and_info() {
        let mut tagger = Tagger::new();
        let tagger = tagger.open_in_memory(sample_model()).unwrap();
        let out = NamedTempFile::new().unwrap();
        tagger.dump(Some(out.path())).unwrap();
        let text = fs::read_to_string(out.path()).unwrap();
        assert!(text.starts_with("FILEHEADER = {"));

        let info = tagger.info().unwrap();
        assert_eq!(info.labels.len(), 2);
        assert_eq!(info.labels["rainy"], 1);
        assert_eq!(info.attributes.len(), 3);
        assert_eq!(info.header["magic"], "lCRF");
        assert_eq!(
            info.transitions[&("sunny".to_string(), "rainy".to_string())],
            -0.25
        );
    }

    #[test]
    fn test_open_rejects_feature_outside_vocabulary() {
        let mut bytes = sample_model();
        set_feature_target(&mut bytes, 1, 99);
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&bytes).unwrap();
        file.flush().unwrap();

        let mut tagger = Tagger::new();
        let err = tagger.open(file.path()).unwrap_err();
        assert!(err.is_invalid_argument());
        assert!(matches!(
            err,
            Error::InvalidModelFile {
                problem: ModelFileProblem::Load(_),
                ..
            }
        ));

        let mut bytes = sample_model();
        set_feature_target(&mut bytes, 0, 99);
        assert!(tagger.open_in_memory(bytes).is_err());
        assert!(!tagger.is_open());
    }
}
