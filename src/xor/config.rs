//! Comparison configuration
//!
//! [`XorConfig`] collects every option of a comparison run. Lengths are given in
//! micrometers and converted to database units once the database unit of the run is known.
//! Presets cover the common setups; the `with_*` setters adjust individual options.

use bitflags::bitflags;
use strum::{Display, EnumIter};
use tracing::warn;

use crate::{Error, Result};

/// Which engine performs the comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumIter)]
pub enum XorMode {
    /// Flat comparison on a tile grid
    #[default]
    #[strum(serialize = "tiled")]
    Tiled,
    /// Hierarchical comparison without flattening
    #[strum(serialize = "deep")]
    Deep,
}

bitflags! {
    /// Behavior switches of a comparison run.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct XorFlags: u32 {
        /// Merge shapes cut by tile boundaries before counting them
        const HEAL = 0x0001;
        /// Compare a layer missing on one side against an empty layer
        const MISSING_AS_EMPTY = 0x0002;
        /// Keep only shape counts, drop result geometry
        const SUMMARIZE_ONLY = 0x0004;
    }
}

impl Default for XorFlags {
    fn default() -> Self {
        XorFlags::HEAL
    }
}

/// Where the XOR shapes go when an output layout is requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputSpec {
    /// Name of the top cell created in the output layout
    pub top_cell: String,
}

/// Options of a comparison run.
///
/// # Examples
///
/// ```rust
/// use xorscope::xor::{XorConfig, XorFlags, XorMode};
///
/// let config = XorConfig::tiled(100.0)
///     .with_tolerances(vec![0.0, 0.01])
///     .with_threads(4)
///     .with_output("XOR");
///
/// assert_eq!(config.mode, XorMode::Tiled);
/// assert!(config.flags.contains(XorFlags::HEAL));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct XorConfig {
    /// Ascending tolerances in micrometers; empty means a single zero tolerance
    pub tolerances: Vec<f64>,
    /// Layer number offset between two tolerance levels in the output
    pub layer_bump: i32,
    /// Tile edge length in micrometers, 0 for a single tile
    pub tile_size: f64,
    /// Extra tile overlap in micrometers, added to twice the largest tolerance
    pub tile_border: f64,
    /// Worker thread count, 0 is treated as 1
    pub threads: usize,
    /// The engine to use
    pub mode: XorMode,
    /// Behavior switches
    pub flags: XorFlags,
    /// Explicit top cell of the first layout
    pub top_a: Option<String>,
    /// Explicit top cell of the second layout
    pub top_b: Option<String>,
    /// Output layout request
    pub output: Option<OutputSpec>,
}

impl Default for XorConfig {
    fn default() -> Self {
        Self {
            tolerances: Vec::new(),
            layer_bump: 10000,
            tile_size: 0.0,
            tile_border: 0.0,
            threads: 1,
            mode: XorMode::Tiled,
            flags: XorFlags::default(),
            top_a: None,
            top_b: None,
            output: None,
        }
    }
}

impl XorConfig {
    /// Tiled comparison on all available cores.
    #[must_use]
    pub fn tiled(tile_size: f64) -> Self {
        Self {
            tile_size,
            threads: available_threads(),
            mode: XorMode::Tiled,
            ..Self::default()
        }
    }

    /// Hierarchical comparison on all available cores.
    #[must_use]
    pub fn deep() -> Self {
        Self {
            threads: available_threads(),
            mode: XorMode::Deep,
            ..Self::default()
        }
    }

    /// Sets the tolerances (micrometers).
    #[must_use]
    pub fn with_tolerances(mut self, tolerances: Vec<f64>) -> Self {
        self.tolerances = tolerances;
        self
    }

    /// Sets the layer bump.
    #[must_use]
    pub fn with_layer_bump(mut self, bump: i32) -> Self {
        self.layer_bump = bump;
        self
    }

    /// Sets the tile size (micrometers).
    #[must_use]
    pub fn with_tile_size(mut self, tile_size: f64) -> Self {
        self.tile_size = tile_size;
        self
    }

    /// Sets the extra tile border (micrometers).
    #[must_use]
    pub fn with_tile_border(mut self, border: f64) -> Self {
        self.tile_border = border;
        self
    }

    /// Sets the worker thread count.
    #[must_use]
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    /// Selects the engine.
    #[must_use]
    pub fn with_mode(mut self, mode: XorMode) -> Self {
        self.mode = mode;
        self
    }

    /// Replaces all flags.
    #[must_use]
    pub fn with_flags(mut self, flags: XorFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Enables or disables boundary healing.
    #[must_use]
    pub fn heal(mut self, enabled: bool) -> Self {
        self.flags.set(XorFlags::HEAL, enabled);
        self
    }

    /// Enables or disables comparing missing layers against empty ones.
    #[must_use]
    pub fn missing_as_empty(mut self, enabled: bool) -> Self {
        self.flags.set(XorFlags::MISSING_AS_EMPTY, enabled);
        self
    }

    /// Enables or disables count-only results.
    #[must_use]
    pub fn summarize_only(mut self, enabled: bool) -> Self {
        self.flags.set(XorFlags::SUMMARIZE_ONLY, enabled);
        self
    }

    /// Sets explicit top cells.
    #[must_use]
    pub fn with_top_cells(mut self, top_a: &str, top_b: &str) -> Self {
        self.top_a = Some(top_a.to_string());
        self.top_b = Some(top_b.to_string());
        self
    }

    /// Requests an output layout with the given top cell.
    #[must_use]
    pub fn with_output(mut self, top_cell: &str) -> Self {
        self.output = Some(OutputSpec {
            top_cell: top_cell.to_string(),
        });
        self
    }

    /// The effective worker count, at least one.
    #[must_use]
    pub fn effective_threads(&self) -> usize {
        self.threads.max(1)
    }

    /// Checks the configuration before any work starts.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTolerances`] for a bad tolerance list and
    /// [`Error::InvalidConfig`] for inconsistent options.
    pub fn validate(&self) -> Result<()> {
        if let Some(bad) = self.tolerances.iter().find(|t| !t.is_finite() || **t < 0.0) {
            return Err(Error::InvalidTolerances(format!(
                "tolerance {bad} is negative or not finite"
            )));
        }
        if let Some(w) = self.tolerances.windows(2).find(|w| w[0] >= w[1]) {
            return Err(Error::InvalidTolerances(format!(
                "tolerances must be strictly ascending, found {} followed by {}",
                w[0], w[1]
            )));
        }
        if !self.tile_size.is_finite() || self.tile_size < 0.0 {
            return Err(config_error!("tile size {} is invalid", self.tile_size));
        }
        if !self.tile_border.is_finite() || self.tile_border < 0.0 {
            return Err(config_error!("tile border {} is invalid", self.tile_border));
        }
        if self.output.is_some() {
            if self.flags.contains(XorFlags::SUMMARIZE_ONLY) {
                return Err(config_error!(
                    "an output layout cannot be produced in summarize-only mode"
                ));
            }
            if self.tolerances.len() > 1 && self.layer_bump <= 0 {
                return Err(config_error!(
                    "layer bump {} would map several tolerances onto one output layer",
                    self.layer_bump
                ));
            }
        }
        if self.mode == XorMode::Deep && self.tile_size > 0.0 {
            warn!(
                tile_size = self.tile_size,
                "tile size is ignored in deep mode"
            );
        }
        Ok(())
    }
}

fn available_threads() -> usize {
    std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get)
}
