//! Item sequences and the encoding of caller observations into them.
//!
//! An observation is either a mapping from attribute key to weight or a plain
//! collection of keys, in which case every attribute gets weight `1.0`. Keys
//! may be narrow (`str`, UTF-8 bytes, [`BStr`]) or wide (UTF-16 code units);
//! both are normalized to the same UTF-8 `String`.

use std::collections::{BTreeMap, HashMap};
use std::hash::BuildHasher;
use std::slice;

use bstr::{BStr, ByteSlice};

use crate::error::{Error, Result};

/// Tuple of attribute and its value
///
/// This type is used for both training and prediction (tagging).
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    /// Attribute name, UTF-8
    pub name: String,
    /// Value of the attribute
    pub value: f64,
}

impl Attribute {
    /// Create a new attribute with a name and value
    pub fn new<T: Into<String>>(name: T, value: f64) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

impl From<&str> for Attribute {
    fn from(name: &str) -> Self {
        Self::new(name, 1.0)
    }
}

impl<S: Into<String>> From<(S, f64)> for Attribute {
    fn from((name, value): (S, f64)) -> Self {
        Self::new(name, value)
    }
}

/// Active attributes of one observation
pub type Item = Vec<Attribute>;

/// An ordered sequence of items, one per position of an instance
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemSequence {
    items: Vec<Item>,
}

impl ItemSequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(cap: usize) -> Self {
        Self {
            items: Vec::with_capacity(cap),
        }
    }

    /// Encode a sequence of observations, preserving their order.
    pub fn encode<I>(observations: I) -> Result<Self>
    where
        I: IntoIterator,
        I::Item: Observation,
    {
        let observations = observations.into_iter();
        let mut seq = Self::with_capacity(observations.size_hint().0);
        for observation in observations {
            seq.items.push(observation.encode()?);
        }
        Ok(seq)
    }

    pub fn push(&mut self, item: Item) {
        self.items.push(item);
    }

    /// Number of items (the sequence length `T`)
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn iter(&self) -> slice::Iter<'_, Item> {
        self.items.iter()
    }
}

impl From<Vec<Item>> for ItemSequence {
    fn from(items: Vec<Item>) -> Self {
        Self { items }
    }
}

impl<'a> IntoIterator for &'a ItemSequence {
    type Item = &'a Item;
    type IntoIter = slice::Iter<'a, Item>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

/// A text key that can be normalized to a UTF-8 attribute name.
pub trait AttributeKey {
    fn encode_key(&self) -> Result<String>;
}

impl AttributeKey for str {
    fn encode_key(&self) -> Result<String> {
        Ok(self.to_owned())
    }
}

impl AttributeKey for String {
    fn encode_key(&self) -> Result<String> {
        Ok(self.clone())
    }
}

impl AttributeKey for [u8] {
    fn encode_key(&self) -> Result<String> {
        self.as_bstr().encode_key()
    }
}

impl AttributeKey for Vec<u8> {
    fn encode_key(&self) -> Result<String> {
        self.as_slice().encode_key()
    }
}

impl AttributeKey for BStr {
    fn encode_key(&self) -> Result<String> {
        self.to_str()
            .map(str::to_owned)
            .map_err(|_| Error::invalid(format!("attribute key is not valid UTF-8: {:?}", self)))
    }
}

impl AttributeKey for [u16] {
    fn encode_key(&self) -> Result<String> {
        String::from_utf16(self).map_err(|_| {
            Error::invalid(format!(
                "attribute key is not valid UTF-16: {}",
                String::from_utf16_lossy(self)
            ))
        })
    }
}

impl AttributeKey for Vec<u16> {
    fn encode_key(&self) -> Result<String> {
        self.as_slice().encode_key()
    }
}

impl<K: AttributeKey + ?Sized> AttributeKey for &K {
    fn encode_key(&self) -> Result<String> {
        (**self).encode_key()
    }
}

/// One observation of a sequence, convertible into an [`Item`].
pub trait Observation {
    /// Number of attributes the encoded item will hold
    fn num_attributes(&self) -> usize;

    /// Append the encoded attributes to `item`.
    fn encode_into(&self, item: &mut Item) -> Result<()>;

    fn encode(&self) -> Result<Item> {
        let mut item = Vec::with_capacity(self.num_attributes());
        self.encode_into(&mut item)?;
        Ok(item)
    }
}

impl<T: Observation + ?Sized> Observation for &T {
    fn num_attributes(&self) -> usize {
        (**self).num_attributes()
    }

    fn encode_into(&self, item: &mut Item) -> Result<()> {
        (**self).encode_into(item)
    }
}

impl<T> Observation for Vec<T>
where
    [T]: Observation,
{
    fn num_attributes(&self) -> usize {
        self.as_slice().num_attributes()
    }

    fn encode_into(&self, item: &mut Item) -> Result<()> {
        self.as_slice().encode_into(item)
    }
}

impl<T, const N: usize> Observation for [T; N]
where
    [T]: Observation,
{
    fn num_attributes(&self) -> usize {
        self.as_slice().num_attributes()
    }

    fn encode_into(&self, item: &mut Item) -> Result<()> {
        self.as_slice().encode_into(item)
    }
}

impl Observation for [Attribute] {
    fn num_attributes(&self) -> usize {
        self.len()
    }

    fn encode_into(&self, item: &mut Item) -> Result<()> {
        item.extend_from_slice(self);
        Ok(())
    }
}

impl<K: AttributeKey> Observation for [(K, f64)] {
    fn num_attributes(&self) -> usize {
        self.len()
    }

    fn encode_into(&self, item: &mut Item) -> Result<()> {
        for (key, value) in self {
            item.push(Attribute::new(key.encode_key()?, *value));
        }
        Ok(())
    }
}

impl<K: AttributeKey, S: BuildHasher> Observation for HashMap<K, f64, S> {
    fn num_attributes(&self) -> usize {
        self.len()
    }

    fn encode_into(&self, item: &mut Item) -> Result<()> {
        for (key, value) in self {
            item.push(Attribute::new(key.encode_key()?, *value));
        }
        Ok(())
    }
}

impl<K: AttributeKey> Observation for BTreeMap<K, f64> {
    fn num_attributes(&self) -> usize {
        self.len()
    }

    fn encode_into(&self, item: &mut Item) -> Result<()> {
        for (key, value) in self {
            item.push(Attribute::new(key.encode_key()?, *value));
        }
        Ok(())
    }
}

// Plain key collections: every attribute weighs 1.0.
macro_rules! plain_key_observations {
    ($(impl<$($lt:lifetime),*> for $key:ty;)*) => {$(
        impl<$($lt),*> Observation for [$key] {
            fn num_attributes(&self) -> usize {
                self.len()
            }

            fn encode_into(&self, item: &mut Item) -> Result<()> {
                for key in self {
                    item.push(Attribute::new(key.encode_key()?, 1.0));
                }
                Ok(())
            }
        }
    )*};
}

plain_key_observations! {
    impl<'a> for &'a str;
    impl<> for String;
    impl<'a> for &'a [u8];
    impl<> for Vec<u8>;
    impl<'a> for &'a BStr;
    impl<'a> for &'a [u16];
    impl<> for Vec<u16>;
}

/// Anything that can be turned into an [`ItemSequence`].
pub trait IntoItemSequence {
    fn into_item_sequence(self) -> Result<ItemSequence>;
}

impl IntoItemSequence for ItemSequence {
    fn into_item_sequence(self) -> Result<ItemSequence> {
        Ok(self)
    }
}

impl IntoItemSequence for &ItemSequence {
    fn into_item_sequence(self) -> Result<ItemSequence> {
        Ok(self.clone())
    }
}

impl<O: Observation> IntoItemSequence for &[O] {
    fn into_item_sequence(self) -> Result<ItemSequence> {
        ItemSequence::encode(self)
    }
}

impl<O: Observation> IntoItemSequence for &Vec<O> {
    fn into_item_sequence(self) -> Result<ItemSequence> {
        ItemSequence::encode(self)
    }
}

impl<O: Observation> IntoItemSequence for Vec<O> {
    fn into_item_sequence(self) -> Result<ItemSequence> {
        ItemSequence::encode(&self)
    }
}

impl<O: Observation, const N: usize> IntoItemSequence for &[O; N] {
    fn into_item_sequence(self) -> Result<ItemSequence> {
        ItemSequence::encode(self)
    }
}

impl<O: Observation, const N: usize> IntoItemSequence for [O; N] {
    fn into_item_sequence(self) -> Result<ItemSequence> {
        ItemSequence::encode(&self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attribute_creation() {
        let attr = Attribute::new("walk", 1.0);
        assert_eq!(attr.name, "walk");
        assert_eq!(attr.value, 1.0);

        let attr = Attribute::from("shop");
        assert_eq!(attr.value, 1.0);

        let attr = Attribute::from(("clean", 0.5));
        assert_eq!(attr.name, "clean");
        assert_eq!(attr.value, 0.5);
    }

    #[test]
    fn test_mapping_keeps_weights() {
        let mut obs = BTreeMap::new();
        obs.insert("walk", 0.5);
        obs.insert("shop", 2.0);
        let item = obs.encode().unwrap();
        assert!(item.capacity() >= 2);
        assert_eq!(
            item,
            vec![Attribute::new("shop", 2.0), Attribute::new("walk", 0.5)]
        );
    }

    #[test]
    fn test_plain_collection_weighs_one() {
        let seq = ItemSequence::encode(vec![vec!["a", "b"], vec!["c"]]).unwrap();
        assert_eq!(seq.len(), 2);
        assert!(seq.iter().flatten().all(|attr| attr.value == 1.0));
        let names: Vec<_> = seq.iter().flatten().map(|a| a.name.as_str()).collect();
        assert_eq!(names, ["a", "b", "c"]);
    }

    #[test]
    fn test_duplicate_keys_are_retained() {
        let item = [("x", 1.0), ("x", 2.0)].encode().unwrap();
        assert_eq!(item.len(), 2);
    }

    #[test]
    fn test_narrow_and_wide_keys_are_identical() {
        let text = "température";
        let narrow = text.encode_key().unwrap();
        let bytes = text.as_bytes().encode_key().unwrap();
        let wide: Vec<u16> = text.encode_utf16().collect();
        let wide = wide.encode_key().unwrap();
        assert_eq!(narrow.as_bytes(), bytes.as_bytes());
        assert_eq!(narrow.as_bytes(), wide.as_bytes());
    }

    #[test]
    fn test_wide_observation_matches_narrow() {
        let wide: Vec<u16> = "été".encode_utf16().collect();
        let a = ItemSequence::encode([vec![wide]]).unwrap();
        let b = ItemSequence::encode([vec!["été"]]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_invalid_keys_are_rejected() {
        let bad: &[u8] = b"\xff\xfe";
        assert!(bad.encode_key().unwrap_err().is_invalid_argument());
        let lone_surrogate: &[u16] = &[0xD800];
        assert!(lone_surrogate.encode_key().is_err());
    }

    #[test]
    fn test_into_item_sequence_forms() {
        let xseq = vec![vec![Attribute::new("walk", 1.0)], vec![]];
        let seq = (&xseq).into_item_sequence().unwrap();
        assert_eq!(seq.len(), 2);
        assert!(seq.items()[1].is_empty());

        let mut obs = HashMap::new();
        obs.insert(String::from("a"), 3.0);
        let seq = vec![obs].into_item_sequence().unwrap();
        assert_eq!(seq.items()[0], vec![Attribute::new("a", 3.0)]);
    }
}
