use std::collections::HashMap;

/// Interning table assigning dense ids to attribute and label names.
///
/// Ids are handed out in insertion order starting from zero and are never
/// reused until [`Dictionary::clear`].
#[derive(Debug, Clone, Default)]
pub(crate) struct Dictionary {
    ids: HashMap<String, u32>,
    names: Vec<String>,
}

impl Dictionary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Id of `name`, interning it on first sight
    pub fn get_or_insert(&mut self, name: &str) -> u32 {
        if let Some(&id) = self.ids.get(name) {
            return id;
        }
        let id = self.names.len() as u32;
        self.ids.insert(name.to_string(), id);
        self.names.push(name.to_string());
        id
    }

    pub fn get(&self, name: &str) -> Option<u32> {
        self.ids.get(name).copied()
    }

    pub fn get_name(&self, id: u32) -> Option<&str> {
        self.names.get(id as usize).map(String::as_str)
    }

    pub fn clear(&mut self) {
        self.ids.clear();
        self.names.clear();
    }

    /// `(name, id)` pairs in id order
    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> + '_ {
        self.names
            .iter()
            .enumerate()
            .map(|(id, name)| (name.as_str(), id as u32))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_follow_insertion_order() {
        let mut dict = Dictionary::new();
        assert!(dict.is_empty());
        assert_eq!(dict.get_or_insert("sunny"), 0);
        assert_eq!(dict.get_or_insert("rainy"), 1);
        assert_eq!(dict.get_or_insert("sunny"), 0);
        assert_eq!(dict.len(), 2);
        assert_eq!(dict.get("rainy"), Some(1));
        assert_eq!(dict.get("cloudy"), None);
        assert_eq!(dict.get_name(1), Some("rainy"));
        assert_eq!(dict.get_name(2), None);
        assert_eq!(
            dict.iter().collect::<Vec<_>>(),
            vec![("sunny", 0), ("rainy", 1)]
        );
    }

    #[test]
    fn test_clear_restarts_ids() {
        let mut dict = Dictionary::new();
        dict.get_or_insert("walk");
        dict.get_or_insert("shop");
        dict.clear();
        assert!(dict.is_empty());
        assert_eq!(dict.get_or_insert("clean"), 0);
    }
}
