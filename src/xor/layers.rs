//! Matching of layers between the two inputs.
//!
//! Layers are matched by their logical identity, never by their index: layer 5 in one
//! layout may well be stored at index 0 in the other.

use std::{
    cmp::Ordering,
    collections::BTreeMap,
    fmt,
};

use crate::{
    db::{LayerIndex, LayerInfo, Layout},
    xor::ToleranceSchedule,
};

/// Logical identity of a layer.
///
/// Layers with a layer number are compared by `(layer, datatype)` alone; the name is carried
/// for display only. Layers without a number (negative layer or datatype) are "named-only"
/// and compare by name. Numbered layers sort before named-only ones.
#[derive(Debug, Clone)]
pub struct LayerIdentity {
    /// Layer number, negative for named-only layers
    pub layer: i32,
    /// Datatype, negative for named-only layers
    pub datatype: i32,
    /// Optional name
    pub name: Option<String>,
}

impl LayerIdentity {
    /// A numbered layer.
    #[must_use]
    pub fn new(layer: i32, datatype: i32) -> Self {
        Self {
            layer,
            datatype,
            name: None,
        }
    }

    /// Returns `true` if the layer carries a layer/datatype number.
    #[must_use]
    pub fn is_numbered(&self) -> bool {
        self.layer >= 0 && self.datatype >= 0
    }

    /// Layer properties of this identity's output layer at tolerance level `index`.
    #[must_use]
    pub fn output_info(&self, index: usize, bump: i32) -> LayerInfo {
        if self.is_numbered() {
            return LayerInfo {
                layer: ToleranceSchedule::output_layer(self.layer, index, bump),
                datatype: self.datatype,
                name: self.name.clone(),
            };
        }
        let name = self.to_string();
        LayerInfo {
            layer: self.layer,
            datatype: self.datatype,
            name: Some(if index == 0 {
                name
            } else {
                format!("{name}#{index}")
            }),
        }
    }
}

impl From<&LayerInfo> for LayerIdentity {
    fn from(info: &LayerInfo) -> Self {
        Self {
            layer: info.layer,
            datatype: info.datatype,
            name: info.name.clone(),
        }
    }
}

impl Ord for LayerIdentity {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.is_numbered(), other.is_numbered()) {
            (true, true) => (self.layer, self.datatype).cmp(&(other.layer, other.datatype)),
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            (false, false) => self.name.cmp(&other.name),
        }
    }
}

impl PartialOrd for LayerIdentity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for LayerIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for LayerIdentity {}

impl fmt::Display for LayerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.is_numbered(), &self.name) {
            (true, Some(name)) => write!(f, "{}/{} {}", self.layer, self.datatype, name),
            (true, None) => write!(f, "{}/{}", self.layer, self.datatype),
            (false, Some(name)) => write!(f, "{name}"),
            (false, None) => write!(f, "<unnamed>"),
        }
    }
}

/// The layer indexes of one identity in both inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LayerPair {
    /// Index in the first layout
    pub a: Option<LayerIndex>,
    /// Index in the second layout
    pub b: Option<LayerIndex>,
}

impl LayerPair {
    /// Returns `true` if the layer exists on both sides.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.a.is_some() && self.b.is_some()
    }
}

/// Identity-ordered table of layer pairs, built once per run.
#[derive(Debug, Clone, Default)]
pub struct LayerPairTable {
    entries: BTreeMap<LayerIdentity, LayerPair>,
}

impl LayerPairTable {
    /// Builds the table from two layouts.
    ///
    /// If a layout holds the same identity twice, its first layer wins.
    #[must_use]
    pub fn resolve(a: &Layout, b: &Layout) -> Self {
        let mut entries: BTreeMap<LayerIdentity, LayerPair> = BTreeMap::new();
        for (index, info) in a.layers() {
            let slot = entries.entry(LayerIdentity::from(info)).or_default();
            slot.a.get_or_insert(index);
        }
        for (index, info) in b.layers() {
            let slot = entries.entry(LayerIdentity::from(info)).or_default();
            slot.b.get_or_insert(index);
        }
        Self { entries }
    }

    /// Iterates all pairs in identity order.
    pub fn iter(&self) -> impl Iterator<Item = (&LayerIdentity, &LayerPair)> + '_ {
        self.entries.iter()
    }

    /// Number of identities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if neither layout has layers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The pair of an identity.
    #[must_use]
    pub fn get(&self, identity: &LayerIdentity) -> Option<&LayerPair> {
        self.entries.get(identity)
    }

    /// Identities present only in the first layout.
    pub fn only_in_a(&self) -> impl Iterator<Item = &LayerIdentity> + '_ {
        self.entries
            .iter()
            .filter(|(_, p)| p.b.is_none())
            .map(|(id, _)| id)
    }

    /// Identities present only in the second layout.
    pub fn only_in_b(&self) -> impl Iterator<Item = &LayerIdentity> + '_ {
        self.entries
            .iter()
            .filter(|(_, p)| p.a.is_none())
            .map(|(id, _)| id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_ignores_name_for_numbered_layers() {
        let a = LayerIdentity::from(&LayerInfo::named(1, 0, "M1"));
        let b = LayerIdentity::new(1, 0);
        assert_eq!(a, b);
        assert!(LayerIdentity::new(1, 0) < LayerIdentity::new(1, 1));
        assert!(LayerIdentity::new(2, 0) < LayerIdentity::from(&LayerInfo::named(-1, -1, "A")));
    }

    #[test]
    fn test_named_only_layers() {
        let a = LayerIdentity::from(&LayerInfo::named(-1, -1, "POLY"));
        let b = LayerIdentity::from(&LayerInfo::named(-1, -1, "POLY"));
        let c = LayerIdentity::from(&LayerInfo::named(-1, -1, "DIFF"));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.to_string(), "POLY");
    }

    #[test]
    fn test_resolve() {
        let mut a = Layout::new(0.001);
        a.insert_layer(LayerInfo::new(2, 0));
        a.insert_layer(LayerInfo::new(1, 0));
        let mut b = Layout::new(0.001);
        b.insert_layer(LayerInfo::new(1, 0));
        b.insert_layer(LayerInfo::new(3, 0));

        let table = LayerPairTable::resolve(&a, &b);
        assert_eq!(table.len(), 3);

        let ids: Vec<String> = table.iter().map(|(id, _)| id.to_string()).collect();
        assert_eq!(ids, vec!["1/0", "2/0", "3/0"]);

        let pair = table.get(&LayerIdentity::new(1, 0)).unwrap();
        assert_eq!(*pair, LayerPair { a: Some(1), b: Some(0) });
        assert!(pair.is_complete());

        let only_a: Vec<&LayerIdentity> = table.only_in_a().collect();
        assert_eq!(only_a, vec![&LayerIdentity::new(2, 0)]);
        let only_b: Vec<&LayerIdentity> = table.only_in_b().collect();
        assert_eq!(only_b, vec![&LayerIdentity::new(3, 0)]);
    }

    #[test]
    fn test_output_info() {
        let numbered = LayerIdentity::from(&LayerInfo::named(3, 1, "VIA"));
        let info = numbered.output_info(2, 100);
        assert_eq!((info.layer, info.datatype), (203, 1));
        assert_eq!(info.name.as_deref(), Some("VIA"));

        let named = LayerIdentity::from(&LayerInfo::named(-1, -1, "POLY"));
        assert_eq!(named.output_info(0, 100).name.as_deref(), Some("POLY"));
        assert_eq!(named.output_info(1, 100).name.as_deref(), Some("POLY#1"));
    }

    #[test]
    fn test_resolve_empty() {
        let table = LayerPairTable::resolve(&Layout::new(0.001), &Layout::new(0.001));
        assert!(table.is_empty());
    }
}
