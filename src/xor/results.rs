//! Publish-once storage of per-layer, per-tolerance results.
//!
//! Engines compute results in parallel and publish each one exactly once. The store is a
//! lock-free ordered map, so publishing never blocks a worker on another worker's publish,
//! and reading the map after the engine finished needs no locking at all.

use std::{
    fmt,
    sync::atomic::{AtomicUsize, Ordering},
};

use crossbeam_skiplist::SkipMap;
use strum::Display;
use tracing::warn;

use crate::{
    db::{CellIndex, LayerIndex, Region},
    xor::{DeepRegion, LayerIdentity, LayerPair},
    Error, Result,
};

/// Key of one result: tolerance level and layer identity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ResultKey {
    /// Index into the tolerance schedule
    pub tolerance_index: usize,
    /// The compared layer
    pub layer: LayerIdentity,
}

impl ResultKey {
    /// Creates a key.
    #[must_use]
    pub fn new(tolerance_index: usize, layer: LayerIdentity) -> Self {
        Self {
            tolerance_index,
            layer,
        }
    }
}

impl fmt::Display for ResultKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ tolerance #{}", self.layer, self.tolerance_index)
    }
}

/// The input that lacks a layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum MissingSide {
    /// The first layout lacks the layer
    A,
    /// The second layout lacks the layer
    B,
}

/// Result geometry kept for reporting or later delivery.
#[derive(Debug, Clone, PartialEq)]
pub enum PendingResult {
    /// Flat region in top cell coordinates
    Flat(Region),
    /// Hierarchical result
    Deep(DeepRegion),
}

impl PendingResult {
    /// Expands the result into a flat region.
    #[must_use]
    pub fn to_region(&self) -> Region {
        match self {
            PendingResult::Flat(region) => region.clone(),
            PendingResult::Deep(deep) => deep.flatten(),
        }
    }
}

/// Outcome of one `(tolerance, layer)` comparison.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResultDescriptor {
    /// Layer index in the first layout
    pub layer_a: Option<LayerIndex>,
    /// Layer index in the second layout
    pub layer_b: Option<LayerIndex>,
    /// Layer index in the output layout
    pub layer_output: Option<LayerIndex>,
    /// Top cell of the output layout
    pub top_cell: Option<CellIndex>,
    /// Number of differing polygons (hierarchical count in deep mode)
    pub shape_count: u64,
    /// Number of differing polygons after flattening
    pub flat_shape_count: u64,
    /// Result geometry, unless only counts were requested
    pub pending_region: Option<PendingResult>,
    /// Set if the layer exists on one side only and was not compared
    pub missing: Option<MissingSide>,
}

impl ResultDescriptor {
    /// A descriptor for a compared layer pair.
    #[must_use]
    pub fn for_pair(pair: &LayerPair) -> Self {
        Self {
            layer_a: pair.a,
            layer_b: pair.b,
            ..Self::default()
        }
    }

    /// Returns `true` if no difference of any kind was found.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shape_count == 0 && self.flat_shape_count == 0 && self.missing.is_none()
    }
}

/// Concurrent result store.
#[derive(Debug, Default)]
pub struct ResultMap {
    entries: SkipMap<ResultKey, ResultDescriptor>,
    missing_layers: AtomicUsize,
}

impl ResultMap {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes a result.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateResult`] if the key was published before; the stored
    /// result is left unchanged.
    pub fn publish(&self, key: ResultKey, descriptor: ResultDescriptor) -> Result<()> {
        let mut inserted = false;
        let entry = self.entries.get_or_insert_with(key, || {
            inserted = true;
            descriptor
        });
        if inserted {
            Ok(())
        } else {
            Err(Error::DuplicateResult(entry.key().to_string()))
        }
    }

    /// Records a layer that exists on one side only.
    ///
    /// The marker is stored at tolerance level 0; the layer is counted once.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateResult`] if the layer was already recorded.
    pub fn record_missing(&self, layer: &LayerIdentity, pair: &LayerPair) -> Result<()> {
        let side = if pair.a.is_none() {
            MissingSide::A
        } else {
            MissingSide::B
        };
        warn!(layer = %layer, side = %side, "layer is missing in one input");

        let descriptor = ResultDescriptor {
            missing: Some(side),
            ..ResultDescriptor::for_pair(pair)
        };
        self.publish(ResultKey::new(0, layer.clone()), descriptor)?;
        self.missing_layers.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    /// A copy of the result stored under `key`.
    #[must_use]
    pub fn get(&self, key: &ResultKey) -> Option<ResultDescriptor> {
        self.entries.get(key).map(|e| e.value().clone())
    }

    /// Copies of all results in key order.
    #[must_use]
    pub fn to_vec(&self) -> Vec<(ResultKey, ResultDescriptor)> {
        self.entries
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    /// Visits all results in key order without copying them.
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&ResultKey, &ResultDescriptor),
    {
        for entry in self.entries.iter() {
            f(entry.key(), entry.value());
        }
    }

    /// Number of stored results.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing was published.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of layers that exist on one side only.
    #[must_use]
    pub fn missing_layers(&self) -> usize {
        self.missing_layers.load(Ordering::Acquire)
    }

    /// Returns `true` if all results are empty and no layer is missing.
    #[must_use]
    pub fn all_empty(&self) -> bool {
        self.missing_layers() == 0 && self.entries.iter().all(|e| e.value().is_empty())
    }
}
