/*!
Hierarchical addresses and choice maps.

A choice map is a tree: interior nodes are keyed by address [`Component`]s and
leaves hold the realized value of one random choice. The same type is used for
the choices of a trace, for observation constraints, for the edits a proposal
wants to make and for the values an update discarded.

# Examples

```rust
use trace_mh::addr;
use trace_mh::address::ChoiceMap;

let mut choices = ChoiceMap::new();
choices.insert(&addr!["mu"], 0.5).unwrap();
choices.insert(&addr!["y", 0], 1.2).unwrap();
choices.insert(&addr!["y", 1], 0.9).unwrap();

assert_eq!(choices.len(), 3);
assert_eq!(choices.get(&addr!["y", 1]), Some(&0.9));
assert_eq!(choices.get_submap(&addr!["y"]).map(|m| m.len()), Some(2));
```
*/

use std::collections::BTreeMap;
use std::fmt;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{MhError, Result};

/// One step of an [`Address`]: either a name or an integer index.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Component {
    Name(String),
    Index(usize),
}

impl From<&str> for Component {
    fn from(name: &str) -> Self {
        Component::Name(name.to_string())
    }
}

impl From<String> for Component {
    fn from(name: String) -> Self {
        Component::Name(name)
    }
}

impl From<usize> for Component {
    fn from(index: usize) -> Self {
        Component::Index(index)
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Component::Name(name) => write!(f, "{name}"),
            Component::Index(index) => write!(f, "{index}"),
        }
    }
}

/// A hierarchical key identifying one random choice inside a trace.
///
/// The empty address is the root of a choice map.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Address(Vec<Component>);

impl Address {
    /// The empty address.
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn from_components(components: Vec<Component>) -> Self {
        Self(components)
    }

    /// Returns a new address with `component` appended.
    pub fn push(mut self, component: impl Into<Component>) -> Self {
        self.0.push(component.into());
        self
    }

    pub fn components(&self) -> &[Component] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl From<&str> for Address {
    fn from(name: &str) -> Self {
        Self(vec![Component::from(name)])
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "/");
        }
        for (i, component) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "/")?;
            }
            write!(f, "{component}")?;
        }
        Ok(())
    }
}

/// Builds an [`Address`] from names and indices: `addr!["y", 3]`.
#[macro_export]
macro_rules! addr {
    ($($component:expr),* $(,)?) => {
        $crate::address::Address::from_components(vec![
            $($crate::address::Component::from($component)),*
        ])
    };
}

/// A hierarchical mapping from [`Address`] to value.
///
/// Serialized as a flat list of `(address, value)` leaves.
#[derive(Debug, Clone, PartialEq)]
pub enum ChoiceMap<V> {
    Empty,
    Value(V),
    Node(BTreeMap<Component, ChoiceMap<V>>),
}

impl<V> Default for ChoiceMap<V> {
    fn default() -> Self {
        ChoiceMap::Empty
    }
}

impl<V> ChoiceMap<V> {
    pub fn new() -> Self {
        ChoiceMap::Empty
    }

    /// A map holding exactly one value at `address`.
    pub fn singleton(address: &Address, value: V) -> Self {
        address
            .components()
            .iter()
            .rev()
            .fold(ChoiceMap::Value(value), |inner, component| {
                ChoiceMap::Node(BTreeMap::from([(component.clone(), inner)]))
            })
    }

    /// Builds a map from `(address, value)` pairs, failing on conflicting
    /// addresses (a value and a sub-map at the same place).
    pub fn from_leaves<I>(leaves: I) -> Result<Self>
    where
        I: IntoIterator<Item = (Address, V)>,
    {
        let mut map = ChoiceMap::Empty;
        for (address, value) in leaves {
            map.insert(&address, value)?;
        }
        Ok(map)
    }

    pub fn is_empty(&self) -> bool {
        match self {
            ChoiceMap::Empty => true,
            ChoiceMap::Value(_) => false,
            ChoiceMap::Node(children) => children.values().all(ChoiceMap::is_empty),
        }
    }

    /// Number of leaf values.
    pub fn len(&self) -> usize {
        match self {
            ChoiceMap::Empty => 0,
            ChoiceMap::Value(_) => 1,
            ChoiceMap::Node(children) => children.values().map(ChoiceMap::len).sum(),
        }
    }

    /// Returns the sub-map rooted at `address`, if any.
    pub fn get_submap(&self, address: &Address) -> Option<&ChoiceMap<V>> {
        let mut current = self;
        for component in address.components() {
            match current {
                ChoiceMap::Node(children) => current = children.get(component)?,
                _ => return None,
            }
        }
        Some(current)
    }

    /// Returns the value stored exactly at `address`.
    pub fn get(&self, address: &Address) -> Option<&V> {
        match self.get_submap(address)? {
            ChoiceMap::Value(value) => Some(value),
            _ => None,
        }
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.get(address).is_some()
    }

    /// Stores `value` at `address`, returning the value it replaced.
    ///
    /// Fails with [`MhError::AddressConflict`] when `address` passes through
    /// an existing leaf or points at a non-empty sub-map.
    pub fn insert(&mut self, address: &Address, value: V) -> Result<Option<V>> {
        self.insert_at(address.components(), address, value)
    }

    fn insert_at(&mut self, path: &[Component], full: &Address, value: V) -> Result<Option<V>> {
        match path.split_first() {
            None => {
                if matches!(self, ChoiceMap::Node(_)) && !self.is_empty() {
                    return Err(MhError::AddressConflict(full.clone()));
                }
                match std::mem::replace(self, ChoiceMap::Value(value)) {
                    ChoiceMap::Value(old) => Ok(Some(old)),
                    _ => Ok(None),
                }
            }
            Some((head, rest)) => {
                if matches!(self, ChoiceMap::Empty) {
                    *self = ChoiceMap::Node(BTreeMap::new());
                }
                match self {
                    ChoiceMap::Node(children) => children
                        .entry(head.clone())
                        .or_insert(ChoiceMap::Empty)
                        .insert_at(rest, full, value),
                    _ => Err(MhError::AddressConflict(full.clone())),
                }
            }
        }
    }

    /// Removes and returns the value at `address`, pruning empty nodes.
    pub fn remove(&mut self, address: &Address) -> Option<V> {
        self.remove_at(address.components())
    }

    fn remove_at(&mut self, path: &[Component]) -> Option<V> {
        match path.split_first() {
            None => match std::mem::replace(self, ChoiceMap::Empty) {
                ChoiceMap::Value(value) => Some(value),
                other => {
                    *self = other;
                    None
                }
            },
            Some((head, rest)) => {
                let ChoiceMap::Node(children) = self else {
                    return None;
                };
                let child = children.get_mut(head)?;
                let removed = child.remove_at(rest);
                if child.is_empty() {
                    children.remove(head);
                }
                if children.is_empty() {
                    *self = ChoiceMap::Empty;
                }
                removed
            }
        }
    }

    /// All leaves in address order.
    pub fn iter(&self) -> std::vec::IntoIter<(Address, &V)> {
        let mut out = Vec::with_capacity(self.len());
        self.collect_leaves(Address::root(), &mut out);
        out.into_iter()
    }

    fn collect_leaves<'a>(&'a self, prefix: Address, out: &mut Vec<(Address, &'a V)>) {
        match self {
            ChoiceMap::Empty => {}
            ChoiceMap::Value(value) => out.push((prefix, value)),
            ChoiceMap::Node(children) => {
                for (component, child) in children {
                    child.collect_leaves(prefix.clone().push(component.clone()), out);
                }
            }
        }
    }

    pub fn addresses(&self) -> Vec<Address> {
        self.iter().map(|(address, _)| address).collect()
    }
}

impl<V: Clone> ChoiceMap<V> {
    /// Overlays `edits` on top of `self`.
    ///
    /// Returns the merged map and the discard: the previous values of every
    /// address that `edits` overwrote. Addresses that only exist in `edits`
    /// are added and contribute nothing to the discard.
    pub fn merge(&self, edits: &ChoiceMap<V>) -> Result<(ChoiceMap<V>, ChoiceMap<V>)> {
        let mut merged = self.clone();
        let mut discard = ChoiceMap::Empty;
        for (address, value) in edits.iter() {
            if let Some(old) = merged.insert(&address, value.clone())? {
                discard.insert(&address, old)?;
            }
        }
        Ok((merged, discard))
    }
}

impl<V: Serialize> Serialize for ChoiceMap<V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

impl<'de, V: Deserialize<'de>> Deserialize<'de> for ChoiceMap<V> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let leaves: Vec<(Address, V)> = Vec::deserialize(deserializer)?;
        ChoiceMap::from_leaves(leaves).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_map() -> ChoiceMap<f64> {
        ChoiceMap::from_leaves([
            (addr!["mu"], 0.0),
            (addr!["y", 0], 1.0),
            (addr!["y", 1], 2.0),
        ])
        .unwrap()
    }

    #[test]
    fn test_display_address() {
        assert_eq!(addr!["y", 3].to_string(), "y/3");
        assert_eq!(Address::root().to_string(), "/");
        assert_eq!(Address::from("mu").to_string(), "mu");
    }

    #[test]
    fn test_insert_get_remove() {
        let mut map = sample_map();
        assert_eq!(map.len(), 3);
        assert_eq!(map.get(&addr!["y", 0]), Some(&1.0));
        assert_eq!(map.get(&addr!["y"]), None);
        assert_eq!(map.insert(&addr!["mu"], 5.0).unwrap(), Some(0.0));

        assert_eq!(map.remove(&addr!["y", 0]), Some(1.0));
        assert_eq!(map.remove(&addr!["y", 1]), Some(2.0));
        assert!(map.get_submap(&addr!["y"]).is_none());
        assert_eq!(map.addresses(), vec![addr!["mu"]]);
    }

    #[test]
    fn test_insert_conflicts() {
        let mut map = sample_map();
        let below_leaf = map.insert(&addr!["mu", 0], 1.0);
        assert!(matches!(below_leaf, Err(MhError::AddressConflict(_))));
        let over_node = map.insert(&addr!["y"], 1.0);
        assert!(matches!(over_node, Err(MhError::AddressConflict(_))));
        // The failed inserts leave the map untouched.
        assert_eq!(map, sample_map());
    }

    #[test]
    fn test_merge_reports_discard() {
        let map = sample_map();
        let edits = ChoiceMap::from_leaves([(addr!["mu"], 3.0), (addr!["z"], 7.0)]).unwrap();
        let (merged, discard) = map.merge(&edits).unwrap();

        assert_eq!(merged.get(&addr!["mu"]), Some(&3.0));
        assert_eq!(merged.get(&addr!["z"]), Some(&7.0));
        assert_eq!(merged.len(), 4);
        assert_eq!(discard, ChoiceMap::singleton(&addr!["mu"], 0.0));
    }

    #[test]
    fn test_json_leaves() {
        let map = sample_map();
        let json = serde_json::to_string(&map).unwrap();
        assert_eq!(json, r#"[[["mu"],0.0],[["y",0],1.0],[["y",1],2.0]]"#);
        let back: ChoiceMap<f64> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, map);
    }
}
