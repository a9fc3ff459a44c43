//! Geometric XOR of two layouts.
//!
//! A comparison matches the layers of both inputs by identity ([`LayerPairTable`]), computes
//! the symmetric difference of every layer pair and filters it once per tolerance level
//! ([`ToleranceSchedule`]). Two engines are available:
//!
//! - the tiled engine ([`run_tiled`]) flattens both inputs tile by tile on a thread pool and
//!   heals shapes cut at tile boundaries in its [`TileReceiver`]s
//! - the deep engine ([`DeepJob`]) keeps the cell hierarchy and runs one task per layer pair
//!
//! Both publish their results into a [`ResultMap`] that is summarized by an [`XorReport`].
//! [`XorRun`] ties everything together.
//!
//! # Examples
//!
//! ```rust
//! use xorscope::db::{LayerInfo, Layout, Rect};
//! use xorscope::xor::{compare, XorConfig};
//!
//! let mut a = Layout::new(0.001);
//! let layer = a.insert_layer(LayerInfo::new(1, 0));
//! let top = a.add_cell("TOP")?;
//! a.insert(top, layer, Rect::new(0, 0, 10, 10))?;
//!
//! let mut b = Layout::new(0.001);
//! let layer = b.insert_layer(LayerInfo::new(1, 0));
//! let top = b.add_cell("TOP")?;
//! b.insert(top, layer, Rect::new(1, 0, 11, 10))?;
//!
//! let outcome = compare(&a, &b, XorConfig::default().with_tolerances(vec![0.0, 0.002]))?;
//! assert!(!outcome.layouts_match());
//! println!("{}", outcome.report);
//! # Ok::<(), xorscope::Error>(())
//! ```

mod config;
mod context;
mod deep;
mod hierarchy;
mod layers;
mod receiver;
mod report;
mod results;
mod run;
mod tiled;
mod tiling;
mod tolerance;

pub use config::{OutputSpec, XorConfig, XorFlags, XorMode};
pub use context::{OutputTarget, XorContext};
pub use deep::{DeepJob, JobState, XorTask};
pub use hierarchy::{DeepCell, DeepInstance, DeepRegion, HierarchicalXor, HierarchyCache, Side};
pub use layers::{LayerIdentity, LayerPair, LayerPairTable};
pub use receiver::{
    CountingReceiver, LayoutWritingReceiver, ReceiverOutcome, TileReceiver, TIE_BREAK,
};
pub use report::{ReportRow, ReportValue, XorReport};
pub use results::{MissingSide, PendingResult, ResultDescriptor, ResultKey, ResultMap};
pub use run::{compare, XorOutcome, XorRun};
pub use tiled::run_tiled;
pub use tiling::{Tile, TileGrid, TileGridDims, TileScheduler};
pub use tolerance::ToleranceSchedule;
