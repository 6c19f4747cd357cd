//! Owned model resource used by the tagger.

use std::io::{self, Write};

use ouroboros::self_referencing;
use tracing::debug;

use crate::context::{Context, Flag, Reset};
use crate::dataset::{self, Instance};
use crate::error::{Error, Result};
use crate::model::Model;
use crate::sequence::ItemSequence;

#[self_referencing]
struct OwnedModel {
    data: Vec<u8>,
    #[borrows(data)]
    #[covariant]
    model: Model<'this>,
}

/// A loaded model together with its inference context.
///
/// The handle owns the model bytes. It can be moved but never cloned, so at
/// most one owner releases it.
pub struct ModelHandle {
    model: OwnedModel,
    context: Context,
    /// Attribute-id form of the current sequence
    current: Option<Instance>,
}

impl std::fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelHandle")
            .field("model", self.model.borrow_model())
            .field("num_items", &self.context.num_items)
            .finish()
    }
}

impl ModelHandle {
    /// Parse `data` and prepare the transition scores of the model.
    pub(crate) fn load(data: Vec<u8>) -> io::Result<Self> {
        let model = OwnedModel::try_new(data, |data| Model::new(data))?;
        model.borrow_model().check_features()?;
        let num_labels = model.borrow_model().num_labels();
        let mut context = Context::new(Flag::VITERBI | Flag::MARGINALS, num_labels, 0);
        context.reset(Reset::TRANS);
        transition_score(model.borrow_model(), &mut context)?;
        context.exp_transition();
        debug!(num_labels, "loaded model");
        Ok(Self {
            model,
            context,
            current: None,
        })
    }

    fn model(&self) -> &Model<'_> {
        self.model.borrow_model()
    }

    /// Label vocabulary, ordered by label id
    pub(crate) fn labels(&self) -> Result<Vec<String>> {
        let model = self.model();
        (0..model.num_labels())
            .map(|lid| {
                model.to_label(lid).map(str::to_owned).ok_or_else(|| {
                    Error::Io(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("label #{} is missing from the model", lid),
                    ))
                })
            })
            .collect()
    }

    /// Number of items of the current sequence
    pub(crate) fn num_items(&self) -> usize {
        self.current.as_ref().map_or(0, Instance::num_items)
    }

    /// Replace the current sequence and run forward-backward over it.
    pub(crate) fn set(&mut self, xseq: &ItemSequence) -> Result<()> {
        let model = self.model.borrow_model();
        let mut instance = Instance::new(0);
        instance.items.reserve_exact(xseq.len());
        for item in xseq {
            // Attributes unknown to the model carry no features.
            let item: dataset::Item = item
                .iter()
                .filter_map(|x| {
                    model
                        .to_attr_id(&x.name)
                        .map(|id| dataset::Attribute::new(id, x.value))
                })
                .collect();
            instance.push(item, 0);
        }

        let ctx = &mut self.context;
        ctx.set_num_items(instance.num_items() as u32);
        ctx.reset(Reset::STATE);
        state_score(model, &instance, ctx)?;
        ctx.exp_state();
        ctx.alpha_score();
        ctx.beta_score();
        ctx.marginals();
        self.current = Some(instance);
        Ok(())
    }

    /// Best label path of the current sequence and its score
    pub(crate) fn viterbi(&mut self) -> Result<(Vec<String>, f64)> {
        let (label_ids, score) = self.context.viterbi();
        let model = self.model.borrow_model();
        let labels = label_ids
            .into_iter()
            .map(|lid| {
                model.to_label(lid).map(str::to_owned).ok_or_else(|| {
                    Error::invalid("Failed to convert into label identifier")
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok((labels, score))
    }

    fn label_id(&self, label: &str) -> Result<u32> {
        self.model().to_label_id(label).ok_or_else(|| {
            Error::invalid(format!(
                "Failed to convert into label identifier: {}",
                label
            ))
        })
    }

    /// Probability of `yseq` given the current sequence
    pub(crate) fn probability<S: AsRef<str>>(&self, yseq: &[S]) -> Result<f64> {
        let t = self
            .current
            .as_ref()
            .map(Instance::num_items)
            .ok_or_else(|| Error::invalid("No item sequence has been set"))?;
        if yseq.len() != t {
            return Err(Error::invalid(format!(
                "The numbers of items and labels differ: |x| = {}, |y| = {}",
                t,
                yseq.len()
            )));
        }
        let path = yseq
            .iter()
            .map(|label| self.label_id(label.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        let score = self.context.score(&path);
        Ok((score - self.context.log_norm()).exp())
    }

    /// Marginal probability of `label` at `position` of the current sequence
    pub(crate) fn marginal(&self, label: &str, position: usize) -> Result<f64> {
        let t = self.num_items();
        if position >= t {
            return Err(Error::invalid(format!(
                "The position, {}, is out of range of {}",
                position, t
            )));
        }
        let lid = self.label_id(label)?;
        Ok(self.context.marginal_point(lid, position as u32))
    }

    pub(crate) fn dump<W: Write>(&self, w: &mut W) -> io::Result<()> {
        self.model().dump(w)
    }
}

fn transition_score(model: &Model<'_>, ctx: &mut Context) -> io::Result<()> {
    // Compute transition scores between two labels
    for i in 0..model.num_labels() {
        let edge = model.label_ref(i)?;
        for fid in edge.iter() {
            // Transition feature from #i to #(feature.target)
            let feature = model.feature(fid?)?;
            ctx.trans[[i as usize, feature.target as usize]] = feature.weight;
        }
    }
    Ok(())
}

fn state_score(model: &Model<'_>, instance: &Instance, ctx: &mut Context) -> io::Result<()> {
    // Loop over the items in the sequence
    for (t, item) in instance.items.iter().enumerate() {
        // Loop over the attributes attached to the item
        for attr in item {
            // Access the list of state features associated with the attribute
            let attr_ref = model.attr_ref(attr.id)?;
            for fid in attr_ref.iter() {
                let feature = model.feature(fid?)?;
                // A scale usually represents the attribute frequency in the item
                ctx.state[[t, feature.target as usize]] += feature.weight * attr.value;
            }
        }
    }
    Ok(())
}
