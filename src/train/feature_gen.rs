use std::collections::BTreeMap;

use crate::dataset::Instance;
use crate::error::{Result, Status};

/// Feature type
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum FeatureType {
    /// (attribute, label)
    State = 0,
    /// (previous label, label)
    Transition = 1,
}

/// A generated feature, before it has a weight
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct FeatureDef {
    pub ftype: FeatureType,
    /// Attribute id for state features, previous label id for transitions
    pub src: u32,
    pub dst: u32,
    /// Observed frequency in the training data
    pub freq: f64,
}

/// Options of the crf1d feature generator
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct FeatureOptions {
    pub minfreq: f64,
    /// Generate state features for every (attribute, label) pair seen
    pub possible_states: bool,
    /// Generate every (label, label) transition
    pub possible_transitions: bool,
}

/// Feature set with lookup tables from attributes and labels to feature ids
#[derive(Debug, Clone, Default)]
pub(crate) struct FeatureSet {
    pub features: Vec<FeatureDef>,
    /// State feature ids by attribute id
    pub attr_refs: Vec<Vec<u32>>,
    /// Transition feature ids by source label id
    pub label_refs: Vec<Vec<u32>>,
}

impl FeatureSet {
    /// Collect the features of `instances`.
    ///
    /// `progress` receives the percentage of instances scanned so far.
    pub fn generate<P>(
        instances: &[&Instance],
        num_attrs: usize,
        num_labels: usize,
        options: FeatureOptions,
        mut progress: P,
    ) -> Result<Self>
    where
        P: FnMut(u32),
    {
        let mut counts: BTreeMap<(FeatureType, u32, u32), f64> = BTreeMap::new();
        let total = instances.len().max(1);

        for (n, inst) in instances.iter().enumerate() {
            let mut prev = None;
            for (item, &label) in inst.items.iter().zip(&inst.labels) {
                if let Some(prev) = prev {
                    *counts
                        .entry((FeatureType::Transition, prev, label))
                        .or_insert(0.0) += 1.0;
                }
                for attr in item {
                    if options.possible_states {
                        for l in 0..num_labels as u32 {
                            counts.entry((FeatureType::State, attr.id, l)).or_insert(0.0);
                        }
                    }
                    *counts
                        .entry((FeatureType::State, attr.id, label))
                        .or_insert(0.0) += attr.value;
                }
                prev = Some(label);
            }
            progress(((n + 1) * 100 / total) as u32);
        }

        if options.possible_transitions {
            for i in 0..num_labels as u32 {
                for j in 0..num_labels as u32 {
                    counts.entry((FeatureType::Transition, i, j)).or_insert(0.0);
                }
            }
        }

        let mut set = FeatureSet {
            features: Vec::new(),
            attr_refs: vec![Vec::new(); num_attrs],
            label_refs: vec![Vec::new(); num_labels],
        };
        for ((ftype, src, dst), freq) in counts {
            if freq < options.minfreq {
                continue;
            }
            let fid = u32::try_from(set.features.len()).map_err(|_| Status::Overflow)?;
            let refs = match ftype {
                FeatureType::State => &mut set.attr_refs,
                FeatureType::Transition => &mut set.label_refs,
            };
            refs[src as usize].push(fid);
            set.features.push(FeatureDef {
                ftype,
                src,
                dst,
                freq,
            });
        }
        Ok(set)
    }

    pub fn num_features(&self) -> usize {
        self.features.len()
    }

    /// Add `scale` times the feature counts of the path `labels` over `inst` to `out`
    pub fn accumulate(&self, inst: &Instance, labels: &[u32], scale: f64, out: &mut [f64]) {
        let mut prev: Option<u32> = None;
        for (item, &label) in inst.items.iter().zip(labels) {
            for attr in item {
                let Some(fids) = self.attr_refs.get(attr.id as usize) else {
                    continue;
                };
                for &fid in fids {
                    if self.features[fid as usize].dst == label {
                        out[fid as usize] += scale * attr.value;
                    }
                }
            }
            if let Some(prev) = prev {
                for &fid in &self.label_refs[prev as usize] {
                    if self.features[fid as usize].dst == label {
                        out[fid as usize] += scale;
                    }
                }
            }
            prev = Some(label);
        }
    }
}
