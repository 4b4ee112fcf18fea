//! Static name -> slot mappings a compositor can join

use sdk::errors::EngineError;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::observable::message::downcast_snapshot;
use crate::observable::{ObservableAddress, ObservableRef, Snapshot};

/// One named input of a compositor
#[derive(Debug, Clone)]
pub struct Source {
    pub name: String,
    pub address: ObservableAddress,
}

impl Source {
    fn of<V: Send + Sync + 'static>(name: impl Into<String>, observable: &ObservableRef<V>) -> Self {
        Self {
            name: name.into(),
            address: observable.address().clone(),
        }
    }
}

/// A fixed set of observables joined into one typed output
///
/// `sources` and `join` agree on slot order: `values[i]` is the snapshot of
/// `sources()[i]`. `join` is only called once every slot holds a value.
pub trait ObserveSet: Send {
    type Output: Send + 'static;

    fn sources(&self) -> Vec<Source>;

    fn join(&self, values: &[Snapshot]) -> Result<Self::Output, EngineError>;
}

fn slot_value<V: Send + Sync + 'static>(
    observable: &ObservableRef<V>,
    values: &[Snapshot],
    index: usize,
) -> Result<Arc<V>, EngineError> {
    let snapshot = values
        .get(index)
        .ok_or_else(|| EngineError::ObservableUnavailable(observable.name().to_string()))?;
    downcast_snapshot(observable.name(), snapshot)
}

impl<V: Send + Sync + 'static> ObserveSet for ObservableRef<V> {
    type Output = Arc<V>;

    fn sources(&self) -> Vec<Source> {
        vec![Source::of(self.name(), self)]
    }

    fn join(&self, values: &[Snapshot]) -> Result<Self::Output, EngineError> {
        slot_value(self, values, 0)
    }
}

macro_rules! impl_observe_set_for_tuple {
    ($(($ty:ident, $idx:tt)),+) => {
        impl<$($ty: Send + Sync + 'static),+> ObserveSet for ($(ObservableRef<$ty>,)+) {
            type Output = ($(Arc<$ty>,)+);

            fn sources(&self) -> Vec<Source> {
                vec![$(Source::of(self.$idx.name(), &self.$idx)),+]
            }

            fn join(&self, values: &[Snapshot]) -> Result<Self::Output, EngineError> {
                Ok(($(slot_value(&self.$idx, values, $idx)?,)+))
            }
        }
    };
}

impl_observe_set_for_tuple!((A, 0));
impl_observe_set_for_tuple!((A, 0), (B, 1));
impl_observe_set_for_tuple!((A, 0), (B, 1), (C, 2));
impl_observe_set_for_tuple!((A, 0), (B, 1), (C, 2), (D, 3));

/// Named observables of one value type, joined by key
impl<V: Send + Sync + 'static> ObserveSet for BTreeMap<String, ObservableRef<V>> {
    type Output = BTreeMap<String, Arc<V>>;

    fn sources(&self) -> Vec<Source> {
        self.iter()
            .map(|(name, observable)| Source::of(name.as_str(), observable))
            .collect()
    }

    fn join(&self, values: &[Snapshot]) -> Result<Self::Output, EngineError> {
        self.iter()
            .enumerate()
            .map(|(index, (name, observable))| {
                slot_value(observable, values, index).map(|value| (name.clone(), value))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observable::Observable;

    #[test]
    fn test_tuple_join_keeps_order() {
        let a = Observable::<u32>::new("a");
        let b = Observable::<String>::new("b");
        let set = (a.observable_ref(), b.observable_ref());

        let names: Vec<String> = set.sources().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["a", "b"]);

        let values: Vec<Snapshot> = vec![Arc::new(7u32), Arc::new("x".to_string())];
        let (first, second) = set.join(&values).unwrap();
        assert_eq!(*first, 7);
        assert_eq!(second.as_str(), "x");
    }

    #[test]
    fn test_join_rejects_wrong_type() {
        let a = Observable::<u32>::new("a");
        let values: Vec<Snapshot> = vec![Arc::new("not a number".to_string())];

        let result = a.observable_ref().join(&values);

        assert!(matches!(result, Err(EngineError::SnapshotType { .. })));
    }

    #[test]
    fn test_map_join_by_key() {
        let x = Observable::<u32>::new("node-x");
        let y = Observable::<u32>::new("node-y");
        let mut set = BTreeMap::new();
        set.insert("y".to_string(), y.observable_ref());
        set.insert("x".to_string(), x.observable_ref());

        let names: Vec<String> = set.sources().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["x", "y"]);

        let values: Vec<Snapshot> = vec![Arc::new(1u32), Arc::new(2u32)];
        let joined = set.join(&values).unwrap();
        assert_eq!(*joined["x"], 1);
        assert_eq!(*joined["y"], 2);
    }
}
