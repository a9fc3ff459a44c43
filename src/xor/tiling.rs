//! Tile grid and parallel tile execution.
//!
//! The grid partitions the working area into equally sized, abutting tiles ("owned" areas).
//! Each tile is processed with a border around its owned area so that sizing operations near
//! the tile edge see all the geometry they depend on. The [`TileScheduler`] runs one closure
//! per tile on a dedicated thread pool; every tile is processed exactly once and the first
//! failing tile aborts the remaining work.

use rayon::prelude::*;
use tracing::debug;

use crate::{
    db::{Coord, Rect},
    Error, Result,
};

/// Number of tiles in x and y.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TileGridDims {
    /// Columns
    pub nx: usize,
    /// Rows
    pub ny: usize,
}

/// One tile of a [`TileGrid`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tile {
    /// Column
    pub ix: usize,
    /// Row
    pub iy: usize,
    /// The area the tile is responsible for
    pub owned: Rect,
    /// The owned area plus the border; input is collected from here
    pub processing: Rect,
}

/// A regular grid of tiles centered on a working area.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileGrid {
    origin_x: Coord,
    origin_y: Coord,
    tile_width: Coord,
    tile_height: Coord,
    border: Coord,
    dims: TileGridDims,
}

impl TileGrid {
    /// Creates a grid of square tiles of edge `tile_size` covering `area`.
    ///
    /// A `tile_size` of zero yields a single tile identical to `area`. An empty area yields
    /// no tiles at all.
    #[must_use]
    pub fn new(area: Rect, tile_size: Coord, border: Coord) -> Self {
        if area.is_empty() {
            return Self {
                origin_x: 0,
                origin_y: 0,
                tile_width: 0,
                tile_height: 0,
                border,
                dims: TileGridDims::default(),
            };
        }
        if tile_size <= 0 {
            return Self {
                origin_x: area.left,
                origin_y: area.bottom,
                tile_width: area.width(),
                tile_height: area.height(),
                border,
                dims: TileGridDims { nx: 1, ny: 1 },
            };
        }

        let nx = tiles_needed(area.width(), tile_size);
        let ny = tiles_needed(area.height(), tile_size);
        let span_x = tile_size * nx as Coord;
        let span_y = tile_size * ny as Coord;
        Self {
            origin_x: area.left - (span_x - area.width()) / 2,
            origin_y: area.bottom - (span_y - area.height()) / 2,
            tile_width: tile_size,
            tile_height: tile_size,
            border,
            dims: TileGridDims { nx, ny },
        }
    }

    /// The grid dimensions.
    #[must_use]
    pub fn dims(&self) -> TileGridDims {
        self.dims
    }

    /// Number of tiles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.dims.nx * self.dims.ny
    }

    /// Returns `true` if the grid has no tiles.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The tile at column `ix`, row `iy`.
    #[must_use]
    pub fn tile(&self, ix: usize, iy: usize) -> Option<Tile> {
        if ix >= self.dims.nx || iy >= self.dims.ny {
            return None;
        }
        let left = self.origin_x + self.tile_width * ix as Coord;
        let bottom = self.origin_y + self.tile_height * iy as Coord;
        let owned = Rect::new(left, bottom, left + self.tile_width, bottom + self.tile_height);
        Some(Tile {
            ix,
            iy,
            owned,
            processing: owned.enlarged(self.border),
        })
    }

    /// All tiles, row by row.
    #[must_use]
    pub fn tiles(&self) -> Vec<Tile> {
        (0..self.dims.ny)
            .flat_map(|iy| (0..self.dims.nx).filter_map(move |ix| self.tile(ix, iy)))
            .collect()
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn tiles_needed(extent: Coord, tile_size: Coord) -> usize {
    let n = (extent + tile_size - 1) / tile_size;
    n.max(1) as usize
}

/// Runs per-tile work on a dedicated thread pool.
#[derive(Debug, Clone, Copy)]
pub struct TileScheduler {
    threads: usize,
}

impl TileScheduler {
    /// Creates a scheduler with `threads` workers (at least one).
    #[must_use]
    pub fn new(threads: usize) -> Self {
        Self {
            threads: threads.max(1),
        }
    }

    /// Calls `work` once per tile and blocks until all tiles are done.
    ///
    /// # Errors
    ///
    /// Returns the first error reported by `work`; tiles not yet started are skipped.
    pub fn execute<F>(&self, grid: &TileGrid, work: F) -> Result<()>
    where
        F: Fn(&Tile) -> Result<()> + Send + Sync,
    {
        let tiles = grid.tiles();
        let dims = grid.dims();
        debug!(
            nx = dims.nx,
            ny = dims.ny,
            threads = self.threads,
            "executing tile grid"
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.threads)
            .build()
            .map_err(|e| Error::Error(format!("failed to build tile pool - {e}")))?;

        pool.install(|| {
            tiles.par_iter().try_for_each(|tile| {
                debug!(ix = tile.ix, iy = tile.iy, "processing tile");
                work(tile)
            })
        })
    }
}
