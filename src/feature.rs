use std::io;

use crate::model::unpack_u32;

/// A feature record as stored in a model file
#[derive(Debug, Clone)]
pub struct Feature {
    /// 0 for state features, 1 for transition features
    pub r#type: u32,
    /// Attribute id (state) or previous label id (transition)
    pub source: u32,
    /// Label id
    pub target: u32,
    pub weight: f64,
}

/// Feature references
///
/// This is a view over the feature ids attached to one label or attribute.
#[derive(Debug, Clone)]
pub struct FeatureRefs<'a> {
    pub num_features: u32,
    pub feature_ids: &'a [u8],
}

impl<'a> FeatureRefs<'a> {
    pub fn get(&self, index: usize) -> io::Result<u32> {
        let start = index * 4;
        let bytes = self.feature_ids.get(start..).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                "feature reference out of bounds",
            )
        })?;
        unpack_u32(bytes)
    }

    /// Iterate over the referenced feature ids.
    pub fn iter(&self) -> impl Iterator<Item = io::Result<u32>> + '_ {
        (0..self.num_features as usize).map(move |i| self.get(i))
    }
}
