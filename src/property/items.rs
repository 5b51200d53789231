//! An insertion-order preserving `name -> value` map.
//!
//! INDI drivers index vector elements by position as well as by name, so
//! decode-then-encode must reproduce the exact element order the server
//! sent. `std::collections::HashMap` does not guarantee that; this keeps
//! a parallel `Vec` of keys in insertion order alongside a `HashMap` index
//! for O(1) lookup. Grounded on `pyindi/core/indi_types.py`'s use of
//! `collections.OrderedDict` for `VectorProperty.items`.

use std::collections::HashMap;

use super::value::TypedValue;

/// Ordered `name -> TypedValue` collection backing a [`super::vector::VectorProperty`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemMap {
    order: Vec<String>,
    index: HashMap<String, usize>,
    values: Vec<TypedValue>,
}

impl ItemMap {
    /// An empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace `name`. Replacing an existing key keeps its
    /// original position; a new key is appended.
    pub fn insert(&mut self, name: impl Into<String>, value: TypedValue) {
        let name = name.into();
        if let Some(&idx) = self.index.get(&name) {
            self.values[idx] = value;
        } else {
            self.index.insert(name.clone(), self.order.len());
            self.order.push(name);
            self.values.push(value);
        }
    }

    /// Look up by name.
    pub fn get(&self, name: &str) -> Option<&TypedValue> {
        self.index.get(name).map(|&idx| &self.values[idx])
    }

    /// Look up by name, mutably.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut TypedValue> {
        if let Some(&idx) = self.index.get(name) {
            Some(&mut self.values[idx])
        } else {
            None
        }
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// `true` if there are no elements.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Iterate `(name, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &TypedValue)> {
        self.order
            .iter()
            .map(move |name| (name.as_str(), self.get(name).expect("index is consistent")))
    }

    /// Iterate names in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }
}

impl FromIterator<(String, TypedValue)> for ItemMap {
    fn from_iter<T: IntoIterator<Item = (String, TypedValue)>>(iter: T) -> Self {
        let mut map = ItemMap::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preserves_insertion_order() {
        let mut m = ItemMap::new();
        m.insert("z", TypedValue::Number(1.0));
        m.insert("a", TypedValue::Number(2.0));
        m.insert("m", TypedValue::Number(3.0));
        assert_eq!(m.keys().collect::<Vec<_>>(), vec!["z", "a", "m"]);
    }

    #[test]
    fn replacing_a_key_keeps_its_position() {
        let mut m = ItemMap::new();
        m.insert("a", TypedValue::Number(1.0));
        m.insert("b", TypedValue::Number(2.0));
        m.insert("a", TypedValue::Number(9.0));
        assert_eq!(m.keys().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(m.get("a"), Some(&TypedValue::Number(9.0)));
    }
}
