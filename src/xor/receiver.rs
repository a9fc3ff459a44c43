//! Tile output receivers with boundary healing.
//!
//! Tiling cuts polygons that straddle tile boundaries into fragments computed by different
//! tiles. A receiver takes the per-tile results and decides for every polygon whether it is
//! final. A polygon whose bounding box lies inside its tile shrunk by [`TIE_BREAK`] cannot
//! have been cut and is accepted directly. Everything else is deferred into a shared region
//! that is merged once all tiles are done, which re-joins the fragments.
//!
//! Receivers follow a small protocol: [`TileReceiver::begin`], any number of concurrent
//! [`TileReceiver::put`] calls, then [`TileReceiver::finish`].

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Mutex,
};

use tracing::debug;

use crate::{
    db::{CellIndex, Coord, LayerIndex, Layout, Polygon, Region},
    xor::{Tile, TileGridDims},
    Result,
};

/// Distance by which a tile is shrunk to decide whether a polygon touches its boundary.
///
/// One database unit is the smallest distance on the integer grid.
pub const TIE_BREAK: Coord = 1;

/// Final numbers of a receiver.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReceiverOutcome {
    /// Number of polygons
    pub count: u64,
    /// The whole result if the receiver retains geometry, otherwise the merged deferred part
    pub region: Region,
}

#[derive(Debug, Default)]
struct Deferred {
    region: Region,
    count: u64,
}

impl Deferred {
    fn absorb(&mut self, polygons: &[Polygon]) {
        for polygon in polygons {
            self.region.insert_polygon(polygon);
        }
        self.count += polygons.len() as u64;
    }

    /// Count and merged region; the count is the raw fragment count unless healing.
    fn settle(mut self, heal: bool) -> (u64, Region) {
        self.region.merge();
        let count = if heal { self.region.count() } else { self.count };
        (count, self.region)
    }
}

/// Splits a tile result into final and deferred polygons.
fn admit(tile: &Tile, region: &Region, clip: bool) -> (Vec<Polygon>, Vec<Polygon>) {
    let region = if clip {
        region.clipped(&tile.owned)
    } else {
        region.merged()
    };
    let inner = tile.owned.enlarged(-TIE_BREAK);
    region
        .polygons()
        .into_iter()
        .partition(|p| inner.contains_rect(&p.bbox()))
}

/// Counts polygons, optionally keeping the geometry.
#[derive(Debug)]
pub struct CountingReceiver {
    heal: bool,
    retain: bool,
    direct: AtomicU64,
    deferred: Mutex<Deferred>,
    retained: Mutex<Region>,
}

impl CountingReceiver {
    /// Creates a receiver; with `retain` the full result region is kept.
    #[must_use]
    pub fn new(heal: bool, retain: bool) -> Self {
        Self {
            heal,
            retain,
            direct: AtomicU64::new(0),
            deferred: Mutex::new(Deferred::default()),
            retained: Mutex::new(Region::new()),
        }
    }

    fn put(&self, tile: &Tile, region: &Region, clip: bool) -> Result<()> {
        let (direct, deferred) = admit(tile, region, clip);
        self.direct
            .fetch_add(direct.len() as u64, Ordering::AcqRel);
        if self.retain && !direct.is_empty() {
            let mut retained = lock!(self.retained)?;
            for polygon in &direct {
                retained.insert_polygon(polygon);
            }
        }
        if !deferred.is_empty() {
            lock!(self.deferred)?.absorb(&deferred);
        }
        Ok(())
    }

    fn finish(self) -> Result<ReceiverOutcome> {
        let (deferred_count, deferred) = into_inner!(self.deferred)?.settle(self.heal);
        let count = self.direct.load(Ordering::Acquire) + deferred_count;
        let region = if self.retain {
            let mut retained = into_inner!(self.retained)?;
            retained.insert_region(&deferred);
            retained.merged()
        } else {
            deferred
        };
        Ok(ReceiverOutcome { count, region })
    }
}

/// Writes polygons into a prepared cell/layer slot of an output layout.
#[derive(Debug)]
pub struct LayoutWritingReceiver<'o> {
    heal: bool,
    layout: &'o Layout,
    cell: CellIndex,
    layer: LayerIndex,
    direct: AtomicU64,
    deferred: Mutex<Deferred>,
}

impl<'o> LayoutWritingReceiver<'o> {
    /// Creates a receiver writing to `cell`/`layer` of `layout`.
    ///
    /// The slot must have been prepared with [`Layout::prepare_shapes`].
    #[must_use]
    pub fn new(heal: bool, layout: &'o Layout, cell: CellIndex, layer: LayerIndex) -> Self {
        Self {
            heal,
            layout,
            cell,
            layer,
            direct: AtomicU64::new(0),
            deferred: Mutex::new(Deferred::default()),
        }
    }

    fn put(&self, tile: &Tile, region: &Region, clip: bool) -> Result<()> {
        let (direct, deferred) = admit(tile, region, clip);
        for polygon in &direct {
            for rect in polygon.boxes() {
                self.layout.insert_shape(self.cell, self.layer, *rect)?;
            }
        }
        self.direct
            .fetch_add(direct.len() as u64, Ordering::AcqRel);
        if !deferred.is_empty() {
            lock!(self.deferred)?.absorb(&deferred);
        }
        Ok(())
    }

    fn finish(self) -> Result<ReceiverOutcome> {
        let (deferred_count, deferred) = into_inner!(self.deferred)?.settle(self.heal);
        let written = self.layout.insert_region(self.cell, self.layer, &deferred);
        self.layout.end_changes();
        written?;
        Ok(ReceiverOutcome {
            count: self.direct.load(Ordering::Acquire) + deferred_count,
            region: deferred,
        })
    }
}

/// The receiver variants used by the tiled engine.
#[derive(Debug)]
pub enum TileReceiver<'o> {
    /// Count only
    Counting(CountingReceiver),
    /// Count and write to an output layout
    LayoutWriting(LayoutWritingReceiver<'o>),
}

impl TileReceiver<'_> {
    /// Starts receiving results of a tile grid.
    pub fn begin(&self, dims: TileGridDims) {
        debug!(nx = dims.nx, ny = dims.ny, "receiver started");
        if let TileReceiver::LayoutWriting(writer) = self {
            writer.layout.start_changes();
        }
    }

    /// Hands over the result of one tile. Safe to call from several threads.
    ///
    /// With `clip` set, the region is clipped to the tile's owned area first.
    ///
    /// # Errors
    ///
    /// Returns an error if the deferred region lock is poisoned or the output slot is missing.
    pub fn put(&self, tile: &Tile, region: &Region, clip: bool) -> Result<()> {
        match self {
            TileReceiver::Counting(receiver) => receiver.put(tile, region, clip),
            TileReceiver::LayoutWriting(receiver) => receiver.put(tile, region, clip),
        }
    }

    /// Merges the deferred polygons and returns the final numbers.
    ///
    /// # Errors
    ///
    /// Returns an error if a lock is poisoned or the output slot is missing.
    pub fn finish(self) -> Result<ReceiverOutcome> {
        match self {
            TileReceiver::Counting(receiver) => receiver.finish(),
            TileReceiver::LayoutWriting(receiver) => receiver.finish(),
        }
    }
}
