//! Training instances with interned attribute and label ids

use crate::sequence::ItemSequence;
use crate::train::Dictionary;

/// Attribute id and its weight within one item
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Attribute {
    pub id: u32,
    pub value: f64,
}

impl Attribute {
    pub fn new(id: u32, value: f64) -> Self {
        Self { id, value }
    }
}

pub(crate) type Item = Vec<Attribute>;

/// One encoded training sequence
#[derive(Debug, Clone, Default)]
pub(crate) struct Instance {
    pub items: Vec<Item>,
    pub labels: Vec<u32>,
    pub group: u32,
}

impl Instance {
    pub fn new(group: u32) -> Self {
        Self {
            group,
            ..Default::default()
        }
    }

    /// Intern the names of `xseq` and `yseq`; both must have the same length.
    pub fn encode<S: AsRef<str>>(
        xseq: &ItemSequence,
        yseq: &[S],
        group: u32,
        attrs: &mut Dictionary,
        labels: &mut Dictionary,
    ) -> Self {
        let mut inst = Self::new(group);
        inst.items.reserve_exact(xseq.len());
        inst.labels.reserve_exact(xseq.len());
        for (item, label) in xseq.iter().zip(yseq) {
            let item = item
                .iter()
                .map(|attr| Attribute::new(attrs.get_or_insert(&attr.name), attr.value))
                .collect();
            inst.push(item, labels.get_or_insert(label.as_ref()));
        }
        inst
    }

    pub fn num_items(&self) -> usize {
        self.items.len()
    }

    pub fn push(&mut self, item: Item, label: u32) {
        self.items.push(item);
        self.labels.push(label);
    }
}
