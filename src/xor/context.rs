//! Shared state of one comparison run.

use std::collections::{BTreeMap, HashSet};

use tracing::warn;

use crate::{
    db::{CellIndex, Coord, LayerIndex, Layout},
    xor::{
        LayerIdentity, LayerPair, LayerPairTable, ResultDescriptor, ResultKey, ResultMap,
        ToleranceSchedule, XorFlags,
    },
    Result,
};

/// Output layout slots prepared before the engines start.
#[derive(Debug, Clone)]
pub struct OutputTarget {
    /// Top cell receiving the XOR shapes
    pub top: CellIndex,
    /// Output layer of every compared `(tolerance, layer)` pair
    pub layers: BTreeMap<ResultKey, LayerIndex>,
}

/// Read-mostly context shared by all workers of a run.
///
/// Both inputs use the same database unit. Lengths are in database units.
#[derive(Debug)]
pub struct XorContext<'a> {
    /// First input
    pub a: &'a Layout,
    /// Second input
    pub b: &'a Layout,
    /// Top cell of the first input
    pub top_a: CellIndex,
    /// Top cell of the second input
    pub top_b: CellIndex,
    /// Matched layers
    pub layers: LayerPairTable,
    /// Tolerance levels
    pub tolerances: ToleranceSchedule,
    /// Output layer number offset between tolerance levels
    pub layer_bump: i32,
    /// Worker count
    pub threads: usize,
    /// Tile edge length, zero for a single tile
    pub tile_size: Coord,
    /// Extra tile border on top of the tolerance border
    pub tile_border: Coord,
    /// Behavior switches
    pub flags: XorFlags,
    /// Completed results
    pub results: ResultMap,
    /// Output slots, if an output layout was requested
    pub output: Option<OutputTarget>,
}

impl<'a> XorContext<'a> {
    /// Creates a context comparing `top_a` in `a` against `top_b` in `b`.
    #[must_use]
    pub fn new(a: &'a Layout, b: &'a Layout, top_a: CellIndex, top_b: CellIndex) -> Self {
        Self {
            a,
            b,
            top_a,
            top_b,
            layers: LayerPairTable::resolve(a, b),
            tolerances: ToleranceSchedule::default(),
            layer_bump: 0,
            threads: 1,
            tile_size: 0,
            tile_border: 0,
            flags: XorFlags::default(),
            results: ResultMap::new(),
            output: None,
        }
    }

    /// Returns `true` if tile fragments are merged before counting.
    #[must_use]
    pub fn heal(&self) -> bool {
        self.flags.contains(XorFlags::HEAL)
    }

    /// Returns `true` if result geometry has to be kept in the result map.
    #[must_use]
    pub fn keeps_geometry(&self) -> bool {
        !self.flags.contains(XorFlags::SUMMARIZE_ONLY)
    }

    /// The layer pairs that are actually compared.
    ///
    /// Incomplete pairs take part only when missing layers count as empty.
    #[must_use]
    pub fn compared_pairs(&self) -> Vec<(LayerIdentity, LayerPair)> {
        let missing_as_empty = self.flags.contains(XorFlags::MISSING_AS_EMPTY);
        self.layers
            .iter()
            .filter(|(_, pair)| pair.is_complete() || missing_as_empty)
            .map(|(id, pair)| (id.clone(), *pair))
            .collect()
    }

    /// Records every one-sided layer as missing, unless missing layers count as empty.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::DuplicateResult`] if a marker was already published.
    pub fn record_missing_layers(&self) -> Result<()> {
        if self.flags.contains(XorFlags::MISSING_AS_EMPTY) {
            return Ok(());
        }
        for (id, pair) in self.layers.iter().filter(|(_, p)| !p.is_complete()) {
            self.results.record_missing(id, pair)?;
        }
        Ok(())
    }

    /// A descriptor for `pair` with the output slot of `key` filled in.
    #[must_use]
    pub fn descriptor(&self, key: &ResultKey, pair: &LayerPair) -> ResultDescriptor {
        let mut descriptor = ResultDescriptor::for_pair(pair);
        if let Some(target) = &self.output {
            descriptor.layer_output = target.layers.get(key).copied();
            descriptor.top_cell = Some(target.top);
        }
        descriptor
    }

    /// Creates the top cell and all output layers in `output`.
    ///
    /// Every compared pair gets one layer per tolerance level, even if it turns out to be
    /// empty, so the output is structured the same for every run.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::DuplicateCell`] if `output` already holds `top_cell`.
    pub fn prepare_output(&mut self, output: &mut Layout, top_cell: &str) -> Result<()> {
        let top = output.add_cell(top_cell)?;
        let mut layers = BTreeMap::new();
        let mut used = HashSet::new();
        for (id, _) in self.compared_pairs() {
            for (index, _) in self.tolerances.iter() {
                let layer = output.find_or_insert_layer(id.output_info(index, self.layer_bump));
                output.prepare_shapes(top, layer)?;
                if !used.insert(layer) {
                    warn!(layer = %id, index, "output layer shared with another result");
                }
                layers.insert(ResultKey::new(index, id.clone()), layer);
            }
        }
        self.output = Some(OutputTarget { top, layers });
        Ok(())
    }
}
