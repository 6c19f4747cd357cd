//! Checks applied to a model file before it is handed to the loader.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::error::{Error, ModelFileProblem, Result};
use crate::model::{HEADER_SIZE, MAGIC};

/// Pseudo-path reported for models validated from memory
pub const MEMORY_PATH: &str = "<memory>";

/// Validate the model file at `path`.
///
/// The checks run in order: the file opens, its first four bytes are the
/// `lCRF` magic, and its size is strictly greater than the 48 byte header.
pub fn validate_model_file<P: AsRef<Path>>(path: P) -> Result<()> {
    let path = path.as_ref();
    let fail = |problem| Error::model_file(path, problem);

    let file = File::open(path).map_err(|e| fail(ModelFileProblem::Open(e)))?;
    let mut magic = Vec::with_capacity(MAGIC.len());
    (&file)
        .take(MAGIC.len() as u64)
        .read_to_end(&mut magic)
        .map_err(|e| fail(ModelFileProblem::Open(e)))?;
    if magic != MAGIC {
        return Err(fail(ModelFileProblem::BadMagic));
    }
    let size = file
        .metadata()
        .map_err(|e| fail(ModelFileProblem::Open(e)))?
        .len();
    if size <= HEADER_SIZE as u64 {
        return Err(fail(ModelFileProblem::IncompleteHeader));
    }
    Ok(())
}

/// Validate a model held in memory with the same rules as [`validate_model_file`].
pub fn validate_model_bytes(buf: &[u8]) -> Result<()> {
    let fail = |problem| Error::model_file(MEMORY_PATH, problem);
    if buf.get(..4) != Some(&MAGIC[..]) {
        return Err(fail(ModelFileProblem::BadMagic));
    }
    if buf.len() <= HEADER_SIZE {
        return Err(fail(ModelFileProblem::IncompleteHeader));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    fn temp_file_with(bytes: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(bytes).unwrap();
        file.flush().unwrap();
        file
    }

    fn problem(err: Error) -> ModelFileProblem {
        match err {
            Error::InvalidModelFile { problem, .. } => problem,
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_missing_file() {
        let err = validate_model_file("/nonexistent/dir/model.crfsuite").unwrap_err();
        assert!(err.is_invalid_argument());
        assert!(err.to_string().contains("/nonexistent/dir/model.crfsuite"));
        assert!(matches!(problem(err), ModelFileProblem::Open(_)));
    }

    #[test]
    fn test_bad_magic() {
        let file = temp_file_with(&[b'x'; 100]);
        let err = validate_model_file(file.path()).unwrap_err();
        assert!(matches!(problem(err), ModelFileProblem::BadMagic));

        let file = temp_file_with(b"lC");
        let err = validate_model_file(file.path()).unwrap_err();
        assert!(matches!(problem(err), ModelFileProblem::BadMagic));
    }

    #[test]
    fn test_incomplete_header() {
        let mut bytes = b"lCRF".to_vec();
        bytes.resize(48, 0);
        let file = temp_file_with(&bytes);
        let err = validate_model_file(file.path()).unwrap_err();
        assert!(matches!(problem(err), ModelFileProblem::IncompleteHeader));

        bytes.push(0);
        let file = temp_file_with(&bytes);
        validate_model_file(file.path()).unwrap();
    }

    #[test]
    fn test_memory_buffer() {
        let err = validate_model_bytes(b"nope").unwrap_err();
        assert!(err.to_string().contains(MEMORY_PATH));
        let mut bytes = b"lCRF".to_vec();
        bytes.resize(48, 0);
        assert!(matches!(
            problem(validate_model_bytes(&bytes).unwrap_err()),
            ModelFileProblem::IncompleteHeader
        ));
        bytes.resize(49, 0);
        validate_model_bytes(&bytes).unwrap();
    }
}
