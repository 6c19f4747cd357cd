use std::fs::File;
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::path::Path;

use cqdb::CQDBWriter;

use super::dictionary::Dictionary;
use super::feature_gen::{FeatureSet, FeatureType};
use crate::model::MAGIC;

const MODEL_TYPE: &[u8; 4] = b"FOMC";
const VERSION: u32 = 100;

/// Counts reported after a model has been stored
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct ModelSummary {
    pub num_features: usize,
    pub active_features: usize,
    pub num_attrs: usize,
    pub active_attrs: usize,
    pub num_labels: usize,
    pub active_labels: usize,
}

/// A feature that survived pruning
struct Record {
    ftype: FeatureType,
    src: u32,
    dst: u32,
    weight: f64,
}

/// Trained model with zero-weight features and unused attributes removed
struct Pruned {
    features: Vec<Record>,
    attrs: Dictionary,
    attr_refs: Vec<Vec<u32>>,
    label_refs: Vec<Vec<u32>>,
    active_labels: usize,
}

impl Pruned {
    fn new(fset: &FeatureSet, weights: &[f64], attrs: &Dictionary, num_labels: usize) -> Self {
        // Old feature id to new feature id
        let mut fmap = vec![None; fset.num_features()];
        let mut features = Vec::new();
        for (fid, (feature, &weight)) in fset.features.iter().zip(weights).enumerate() {
            if weight != 0.0 {
                fmap[fid] = Some(features.len() as u32);
                features.push(Record {
                    ftype: feature.ftype,
                    src: feature.src,
                    dst: feature.dst,
                    weight,
                });
            }
        }

        let remap = |fids: &[u32]| -> Vec<u32> {
            fids.iter().filter_map(|&fid| fmap[fid as usize]).collect()
        };

        let mut pruned_attrs = Dictionary::new();
        let mut amap = vec![None; fset.attr_refs.len()];
        let mut attr_refs = Vec::new();
        for (aid, fids) in fset.attr_refs.iter().enumerate() {
            let kept = remap(fids);
            if kept.is_empty() {
                continue;
            }
            if let Some(name) = attrs.get_name(aid as u32) {
                amap[aid] = Some(pruned_attrs.get_or_insert(name));
                attr_refs.push(kept);
            }
        }
        for record in &mut features {
            if record.ftype == FeatureType::State {
                if let Some(Some(aid)) = amap.get(record.src as usize) {
                    record.src = *aid;
                }
            }
        }

        let mut label_refs: Vec<Vec<u32>> = fset.label_refs.iter().map(|fids| remap(fids)).collect();
        label_refs.resize(num_labels, Vec::new());

        let mut used = vec![false; num_labels];
        for record in &features {
            used[record.dst as usize] = true;
            if record.ftype == FeatureType::Transition {
                used[record.src as usize] = true;
            }
        }

        Self {
            features,
            attrs: pruned_attrs,
            attr_refs,
            label_refs,
            active_labels: used.into_iter().filter(|&u| u).count(),
        }
    }
}

fn to_u32<T: TryInto<u32>>(value: T, what: &str) -> io::Result<u32> {
    value.try_into().map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("{} exceeds u32::MAX", what),
        )
    })
}

fn position<W: Seek>(w: &mut W) -> io::Result<u32> {
    to_u32(w.stream_position()?, "file position")
}

fn align_to_u32<W: Write + Seek>(w: &mut W) -> io::Result<()> {
    let pos = w.stream_position()?;
    let padding = (4 - pos % 4) % 4;
    w.write_all(&[0u8; 3][..padding as usize])
}

fn write_u32<W: Write>(w: &mut W, value: u32) -> io::Result<()> {
    w.write_all(&value.to_le_bytes())
}

fn write_cqdb<W: Write + Seek>(w: &mut W, dict: &Dictionary) -> io::Result<()> {
    // The database is flushed when the writer is dropped
    let mut writer = CQDBWriter::new(&mut *w)?;
    for (name, id) in dict.iter() {
        writer.put(name, id)?;
    }
    Ok(())
}

/// Write a feature-reference chunk (`LFRF` or `AFRF`) with `padding` empty trailing entries.
fn write_refs<W: Write + Seek>(
    w: &mut W,
    chunk: &[u8; 4],
    refs: &[Vec<u32>],
    padding: usize,
) -> io::Result<()> {
    let start = position(w)?;
    let count = to_u32(refs.len() + padding, "number of references")?;
    w.write_all(chunk)?;
    // Chunk size, patched below
    write_u32(w, 0)?;
    write_u32(w, count)?;

    let mut offset = start + 12 + 4 * count;
    for fids in refs {
        write_u32(w, offset)?;
        let len = to_u32(fids.len(), "number of feature references")?;
        offset = offset
            .checked_add(4 + 4 * len)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "offset overflow"))?;
    }
    for _ in 0..padding {
        write_u32(w, 0)?;
    }
    for fids in refs {
        write_u32(w, fids.len() as u32)?;
        for &fid in fids {
            write_u32(w, fid)?;
        }
    }

    let end = position(w)?;
    w.seek(SeekFrom::Start(u64::from(start) + 4))?;
    write_u32(w, end - start)?;
    w.seek(SeekFrom::Start(u64::from(end)))?;
    Ok(())
}

/// Header fields other than the magic, type and version
#[derive(Default)]
struct Header {
    size: u32,
    num_features: u32,
    num_labels: u32,
    num_attrs: u32,
    off_features: u32,
    off_labels: u32,
    off_attrs: u32,
    off_label_refs: u32,
    off_attr_refs: u32,
}

impl Header {
    fn write<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(MAGIC)?;
        write_u32(w, self.size)?;
        w.write_all(MODEL_TYPE)?;
        write_u32(w, VERSION)?;
        for value in [
            self.num_features,
            self.num_labels,
            self.num_attrs,
            self.off_features,
            self.off_labels,
            self.off_attrs,
            self.off_label_refs,
            self.off_attr_refs,
        ] {
            write_u32(w, value)?;
        }
        Ok(())
    }
}

/// Serialize a trained crf1d model in the CRFsuite file layout.
pub(crate) fn write_to<W: Write + Seek>(
    w: &mut W,
    fset: &FeatureSet,
    weights: &[f64],
    labels: &Dictionary,
    attrs: &Dictionary,
) -> io::Result<ModelSummary> {
    let pruned = Pruned::new(fset, weights, attrs, labels.len());
    let base = w.stream_position()?;
    let mut header = Header {
        num_features: to_u32(pruned.features.len(), "number of features")?,
        num_labels: to_u32(labels.len(), "number of labels")?,
        num_attrs: to_u32(pruned.attrs.len(), "number of attributes")?,
        ..Default::default()
    };
    // Placeholder, rewritten once the offsets are known
    header.write(w)?;

    header.off_features = position(w)?;
    w.write_all(b"FEAT")?;
    write_u32(w, to_u32(12 + 20 * pruned.features.len(), "feature chunk size")?)?;
    write_u32(w, header.num_features)?;
    for record in &pruned.features {
        write_u32(w, record.ftype as u32)?;
        write_u32(w, record.src)?;
        write_u32(w, record.dst)?;
        w.write_all(&record.weight.to_le_bytes())?;
    }

    header.off_labels = position(w)?;
    write_cqdb(w, labels)?;
    header.off_attrs = position(w)?;
    write_cqdb(w, &pruned.attrs)?;

    align_to_u32(w)?;
    header.off_label_refs = position(w)?;
    // Two extra slots for the BOS/EOS labels of the file layout
    write_refs(w, b"LFRF", &pruned.label_refs, 2)?;
    align_to_u32(w)?;
    header.off_attr_refs = position(w)?;
    write_refs(w, b"AFRF", &pruned.attr_refs, 0)?;

    header.size = position(w)?;
    w.seek(SeekFrom::Start(base))?;
    header.write(w)?;
    w.seek(SeekFrom::Start(u64::from(header.size)))?;
    w.flush()?;

    Ok(ModelSummary {
        num_features: fset.num_features(),
        active_features: pruned.features.len(),
        num_attrs: attrs.len(),
        active_attrs: pruned.attrs.len(),
        num_labels: labels.len(),
        active_labels: pruned.active_labels,
    })
}

/// Write a model file at `path`.
pub(crate) fn write(
    path: &Path,
    fset: &FeatureSet,
    weights: &[f64],
    labels: &Dictionary,
    attrs: &Dictionary,
) -> io::Result<ModelSummary> {
    let mut w = BufWriter::new(File::create(path)?);
    let summary = write_to(&mut w, fset, weights, labels, attrs)?;
    w.into_inner().map_err(|e| e.into_error())?.sync_all()?;
    Ok(summary)
}

/// A two-label weather model used across the test suite.
///
/// Labels `sunny`, `rainy`; attributes `walk`, `shop`, `clean`; state
/// features `walk -> sunny` (0.5), `shop -> rainy` (0.25),
/// `clean -> rainy` (0.75) and the transition `sunny -> rainy` (-0.25).
#[cfg(test)]
pub(crate) fn sample_model() -> Vec<u8> {
    use super::feature_gen::FeatureDef;

    let mut labels = Dictionary::new();
    for name in ["sunny", "rainy"] {
        labels.get_or_insert(name);
    }
    let mut attrs = Dictionary::new();
    for name in ["walk", "shop", "clean"] {
        attrs.get_or_insert(name);
    }
    let feature = |ftype, src, dst| FeatureDef {
        ftype,
        src,
        dst,
        freq: 1.0,
    };
    let fset = FeatureSet {
        features: vec![
            feature(FeatureType::State, 0, 0),
            feature(FeatureType::State, 1, 1),
            feature(FeatureType::State, 2, 1),
            feature(FeatureType::Transition, 0, 1),
        ],
        attr_refs: vec![vec![0], vec![1], vec![2]],
        label_refs: vec![vec![3], vec![]],
    };
    let weights = [0.5, 0.25, 0.75, -0.25];
    let mut buf = io::Cursor::new(Vec::new());
    write_to(&mut buf, &fset, &weights, &labels, &attrs).expect("in-memory model write");
    buf.into_inner()
}
