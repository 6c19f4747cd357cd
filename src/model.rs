use std::{
    fmt,
    io::{self, Write},
    mem,
};

use bstr::ByteSlice;
use cqdb::CQDB;

use crate::feature::{Feature, FeatureRefs};

/// Magic bytes at the start of every model file
pub const MAGIC: &[u8; 4] = b"lCRF";
/// Size of the fixed model file header in bytes
pub const HEADER_SIZE: usize = mem::size_of::<Header>();

const CHUNK_SIZE: usize = 12;
const FEATURE_SIZE: usize = 20;

#[inline]
pub(crate) fn unpack_u32(buf: &[u8]) -> io::Result<u32> {
    if buf.len() < 4 {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "not enough data for unpacking u32",
        ));
    }
    Ok(u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]))
}

#[inline]
fn unpack_f64(buf: &[u8]) -> io::Result<f64> {
    if buf.len() < 8 {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "not enough data for unpacking f64",
        ));
    }
    Ok(f64::from_le_bytes([
        buf[0], buf[1], buf[2], buf[3], buf[4], buf[5], buf[6], buf[7],
    ]))
}

fn out_of_bounds(what: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidData,
        format!("{} offset is out of bounds", what),
    )
}

#[derive(Debug, Clone)]
#[repr(C)]
struct Header {
    magic: [u8; 4],
    size: u32,
    r#type: [u8; 4],
    version: u32,
    num_features: u32,
    num_labels: u32,
    num_attrs: u32,
    off_features: u32,
    off_labels: u32,
    off_attrs: u32,
    off_label_refs: u32,
    off_attr_refs: u32,
}

/// The CRF model
#[derive(Clone)]
pub struct Model<'a> {
    buffer: &'a [u8],
    header: Header,
    labels: CQDB<'a>,
    attrs: CQDB<'a>,
}

impl<'a> fmt::Debug for Model<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("size", &self.buffer.len())
            .field("header", &self.header)
            .field("labels", &self.labels)
            .field("attrs", &self.attrs)
            .finish()
    }
}

impl<'a> Model<'a> {
    /// Create an instance of a model object from a model in memory
    pub fn new(buf: &'a [u8]) -> io::Result<Self> {
        let size = buf.len();
        if size <= HEADER_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "invalid model format",
            ));
        }
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&buf[0..4]);
        if &magic != MAGIC {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "invalid file format, magic mismatch",
            ));
        }
        let mut r#type = [0u8; 4];
        r#type.copy_from_slice(&buf[8..12]);
        let field = |index: usize| unpack_u32(&buf[index..]);
        let header = Header {
            magic,
            size: field(4)?,
            r#type,
            version: field(12)?,
            num_features: field(16)?,
            num_labels: field(20)?,
            num_attrs: field(24)?,
            off_features: field(28)?,
            off_labels: field(32)?,
            off_attrs: field(36)?,
            off_label_refs: field(40)?,
            off_attr_refs: field(44)?,
        };
        let labels = buf
            .get(header.off_labels as usize..)
            .ok_or_else(|| out_of_bounds("label dictionary"))?;
        let labels = CQDB::new(labels)?;
        let attrs = buf
            .get(header.off_attrs as usize..)
            .ok_or_else(|| out_of_bounds("attribute dictionary"))?;
        let attrs = CQDB::new(attrs)?;
        Ok(Self {
            buffer: buf,
            header,
            labels,
            attrs,
        })
    }

    /// Number of attributes
    pub fn num_attrs(&self) -> u32 {
        self.header.num_attrs
    }

    /// Number of labels
    pub fn num_labels(&self) -> u32 {
        self.header.num_labels
    }

    /// Convert a label ID to label string
    pub fn to_label(&self, lid: u32) -> Option<&str> {
        self.labels.to_str(lid).and_then(|s| s.to_str().ok())
    }

    /// Convert a label string to label ID
    pub fn to_label_id(&self, value: &str) -> Option<u32> {
        self.labels.to_id(value)
    }

    /// Convert a attribute ID to attribute string
    pub fn to_attr(&self, aid: u32) -> Option<&str> {
        self.attrs.to_str(aid).and_then(|s| s.to_str().ok())
    }

    /// Convert a attribute string to attribute ID
    pub fn to_attr_id(&self, value: &str) -> Option<u32> {
        self.attrs.to_id(value)
    }

    fn bytes_from(&self, index: usize, what: &str) -> io::Result<&'a [u8]> {
        self.buffer.get(index..).ok_or_else(|| out_of_bounds(what))
    }

    fn refs(&self, chunk_offset: u32, id: u32, what: &str) -> io::Result<FeatureRefs<'a>> {
        let index = chunk_offset as usize + CHUNK_SIZE + 4 * id as usize;
        let offset = unpack_u32(self.bytes_from(index, what)?)? as usize;
        let num_features = unpack_u32(self.bytes_from(offset, what)?)?;
        let feature_ids = self.bytes_from(offset + 4, what)?;
        Ok(FeatureRefs {
            num_features,
            feature_ids,
        })
    }

    pub(crate) fn label_ref(&self, lid: u32) -> io::Result<FeatureRefs<'a>> {
        self.refs(self.header.off_label_refs, lid, "label reference")
    }

    pub(crate) fn attr_ref(&self, aid: u32) -> io::Result<FeatureRefs<'a>> {
        self.refs(self.header.off_attr_refs, aid, "attribute reference")
    }

    pub(crate) fn feature(&self, fid: u32) -> io::Result<Feature> {
        let index = self.header.off_features as usize + CHUNK_SIZE + FEATURE_SIZE * fid as usize;
        let buf = self.bytes_from(index, "feature")?;
        if buf.len() < FEATURE_SIZE {
            return Err(out_of_bounds("feature"));
        }
        let feature = Feature {
            r#type: unpack_u32(buf)?,
            source: unpack_u32(&buf[4..])?,
            target: unpack_u32(&buf[8..])?,
            weight: unpack_f64(&buf[12..])?,
        };
        let num_sources = match feature.r#type {
            0 => self.header.num_attrs,
            1 => self.header.num_labels,
            other => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("feature #{} has unknown type {}", fid, other),
                ))
            }
        };
        if feature.source >= num_sources || feature.target >= self.header.num_labels {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "feature #{} links {} --> {} outside the model vocabulary",
                    fid, feature.source, feature.target
                ),
            ));
        }
        Ok(feature)
    }

    /// Read every feature referenced by a label or an attribute.
    pub(crate) fn check_features(&self) -> io::Result<()> {
        for lid in 0..self.num_labels() {
            for fid in self.label_ref(lid)?.iter() {
                self.feature(fid?)?;
            }
        }
        for aid in 0..self.num_attrs() {
            for fid in self.attr_ref(aid)?.iter() {
                self.feature(fid?)?;
            }
        }
        Ok(())
    }

    /// Print the model in human-readable format
    pub fn dump<W: Write>(&self, w: &mut W) -> io::Result<()> {
        const UNKNOWN: &str = "[UNKNOWN]";
        // Dump the file header
        writeln!(w, "FILEHEADER = {{")?;
        let header = &self.header;
        writeln!(w, "  magic: {}", header.magic.as_bstr())?;
        writeln!(w, "  size: {}", header.size)?;
        writeln!(w, "  type: {}", header.r#type.as_bstr())?;
        writeln!(w, "  version: {}", header.version)?;
        writeln!(w, "  num_features: {}", header.num_features)?;
        writeln!(w, "  num_labels: {}", header.num_labels)?;
        writeln!(w, "  num_attrs: {}", header.num_attrs)?;
        writeln!(w, "  off_features: {:#X}", header.off_features)?;
        writeln!(w, "  off_labels: {:#X}", header.off_labels)?;
        writeln!(w, "  off_attrs: {:#X}", header.off_attrs)?;
        writeln!(w, "  off_labelrefs: {:#X}", header.off_label_refs)?;
        writeln!(w, "  off_attrrefs: {:#X}", header.off_attr_refs)?;
        writeln!(w, "}}\n")?;
        // Dump the labels
        writeln!(w, "LABELS = {{")?;
        for i in 0..header.num_labels {
            let label = self.to_label(i).unwrap_or(UNKNOWN);
            writeln!(w, "  {:>5}: {}", i, label)?;
        }
        writeln!(w, "}}\n")?;
        // Dump the attributes
        writeln!(w, "ATTRIBUTES = {{")?;
        for i in 0..header.num_attrs {
            let attr = self.to_attr(i).unwrap_or(UNKNOWN);
            writeln!(w, "  {:>5}: {}", i, attr)?;
        }
        writeln!(w, "}}\n")?;
        // Dump the transition features
        writeln!(w, "TRANSITIONS = {{")?;
        for i in 0..header.num_labels {
            let label_refs = self.label_ref(i)?;
            for fid in label_refs.iter() {
                let feature = self.feature(fid?)?;
                let source = self.to_label(feature.source).unwrap_or(UNKNOWN);
                let target = self.to_label(feature.target).unwrap_or(UNKNOWN);
                writeln!(
                    w,
                    "  ({}) {} --> {}: {:.6}",
                    feature.r#type, source, target, feature.weight
                )?;
            }
        }
        writeln!(w, "}}\n")?;
        // Dump the state features
        writeln!(w, "STATE_FEATURES = {{")?;
        for i in 0..header.num_attrs {
            let attr_refs = self.attr_ref(i)?;
            for fid in attr_refs.iter() {
                let feature = self.feature(fid?)?;
                let attr = self.to_attr(feature.source).unwrap_or(UNKNOWN);
                let target = self.to_label(feature.target).unwrap_or(UNKNOWN);
                writeln!(
                    w,
                    "  ({}) {} --> {}: {:.6}",
                    feature.r#type, attr, target, feature.weight
                )?;
            }
        }
        writeln!(w, "}}\n")?;
        Ok(())
    }
}

/// Overwrite the target label of the first feature of `ftype` in `buf`.
#[cfg(test)]
pub(crate) fn set_feature_target(buf: &mut [u8], ftype: u32, target: u32) {
    let index = {
        let model = Model::new(buf).unwrap();
        let fid = (0..model.header.num_features)
            .find(|&fid| model.feature(fid).unwrap().r#type == ftype)
            .unwrap();
        model.header.off_features as usize + CHUNK_SIZE + FEATURE_SIZE * fid as usize + 8
    };
    buf[index..index + 4].copy_from_slice(&target.to_le_bytes());
}

#[cfg(test)]
mod tests {
    use super::{set_feature_target, Model};
    use crate::train::model_writer::sample_model;

    #[test]
    fn test_model_new() {
        let buf = sample_model();
        let model = Model::new(&buf).unwrap();
        assert_eq!(100, model.header.version);
        assert_eq!(&model.header.magic, super::MAGIC);
        assert_eq!(2, model.num_labels());
        assert_eq!(3, model.num_attrs());
        assert_eq!(model.header.size as usize, buf.len());

        let _debug = format!("{:?}", model);
    }

    #[test]
    fn test_header_size() {
        assert_eq!(super::HEADER_SIZE, 48);
    }

    #[test]
    fn test_invalid_model() {
        let buf = b"";
        assert!(Model::new(buf).is_err());

        let mut buf = sample_model();
        buf[0] = b'L'; // change magic from lCRF to LCRF
        assert!(Model::new(&buf).is_err());
    }

    #[test]
    fn test_truncated_model_does_not_panic() {
        let buf = sample_model();
        for len in [49, 64, 128, buf.len() / 2] {
            let truncated = &buf[..len];
            if let Ok(model) = Model::new(truncated) {
                let mut out = Vec::new();
                let _ = model.dump(&mut out);
            }
        }
    }

    #[test]
    fn test_model_lookups() {
        let buf = sample_model();
        let model = Model::new(&buf).unwrap();
        assert_eq!(model.to_label(0), Some("sunny"));
        assert_eq!(model.to_label_id("rainy"), Some(1));
        assert_eq!(model.to_attr_id("walk"), Some(0));
        assert_eq!(model.to_attr(2), Some("clean"));
        assert_eq!(model.to_attr_id("missing"), None);
    }

    #[test]
    fn test_model_dump() {
        let buf = sample_model();
        let model = Model::new(&buf).unwrap();
        let mut out = Vec::new();
        model.dump(&mut out).unwrap();
        let out_str = std::str::from_utf8(&out).unwrap();
        let labels = "LABELS = {\n      0: sunny\n      1: rainy\n}\n";
        assert!(out_str.contains(labels), "{}", out_str);
        let attrs = "ATTRIBUTES = {\n      0: walk\n      1: shop\n      2: clean\n}\n";
        assert!(out_str.contains(attrs), "{}", out_str);
        assert!(out_str.contains("  (1) sunny --> rainy: -0.250000\n"));
        assert!(out_str.contains("  (0) walk --> sunny: 0.500000\n"));
        assert!(out_str.contains("  (0) clean --> rainy: 0.750000\n"));
    }

    #[test]
    fn test_feature_outside_vocabulary() {
        let mut buf = sample_model();
        set_feature_target(&mut buf, 1, 99);
        let model = Model::new(&buf).unwrap();
        let err = model.check_features().unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
        assert!(err.to_string().contains("outside the model vocabulary"));

        let mut buf = sample_model();
        set_feature_target(&mut buf, 0, 2);
        assert!(Model::new(&buf).unwrap().check_features().is_err());

        let buf = sample_model();
        Model::new(&buf).unwrap().check_features().unwrap();
    }
}
