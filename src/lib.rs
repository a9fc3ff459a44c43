// Copyright 2025 The xorscope Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![deny(unsafe_code)]

//! # xorscope
//!
//! Geometric XOR comparison of hierarchical layouts.
//!
//! `xorscope` computes the symmetric difference of two layout databases layer by layer,
//! filters it at a list of tolerances and reports or materializes what differs. Large inputs
//! are handled either flat on a parallel tile grid, with fragments cut at tile boundaries
//! healed before they are counted, or hierarchically, keeping the cell tree of the inputs in
//! the result.
//!
//! ## Features
//!
//! - **Layer matching by identity** - layers are paired by layer/datatype or by name
//! - **Tolerances** - differences narrower than a tolerance are filtered by a morphological
//!   opening, one result layer per tolerance
//! - **Tiled engine** - bounded memory and parallel tiles on a `rayon` pool
//! - **Deep engine** - hierarchy-preserving comparison on a pool of scoped worker threads
//! - **Reports** - pass/fail plus a per-layer, per-tolerance difference table
//!
//! ## Quick Start
//!
//! ```rust
//! use xorscope::prelude::*;
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
//! let config = XorConfig::tiled(100.0).with_tolerances(vec![0.0, 0.002]);
//! let outcome = XorRun::new(&a, &b, config)?.execute()?;
//!
//! assert!(!outcome.layouts_match());
//! println!("{}", outcome.report);
//! # Ok::<(), xorscope::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`db`] - the layout database: integer geometry, regions, cells, layers and the recursive
//!   shape iterator
//! - [`xor`] - layer matching, tolerance schedule, both engines, result map and report
//!
//! ## Logging
//!
//! Progress is reported through [`tracing`]: `info` for run start and finish, `debug` per
//! tile and task, `warn` for layers present in one input only. Installing a subscriber is left
//! to the application.
//!
//! ## Error Handling
//!
//! All fallible operations return [`Result`]. Configuration problems are detected before any
//! work starts; a failing tile or task aborts the whole run.

#[macro_use]
pub(crate) mod macros;

#[macro_use]
pub(crate) mod error;

/// Shared functionality which is used in unit tests
#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types.
///
/// # Example
///
/// ```rust
/// use xorscope::prelude::*;
///
/// let config = XorConfig::deep().with_tolerances(vec![0.0, 0.01]);
/// assert_eq!(config.mode, XorMode::Deep);
/// ```
pub mod prelude;

pub mod db;
pub mod xor;

/// `xorscope` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `xorscope` Error type
///
/// # Examples
///
/// ```rust
/// use xorscope::{db::Layout, xor::{compare, XorConfig}, Error};
///
/// match compare(&Layout::new(0.001), &Layout::new(0.001), XorConfig::default()) {
///     Ok(outcome) => println!("{}", outcome.report),
///     Err(Error::CellNotFound(name)) => println!("no top cell: {name}"),
///     Err(e) => println!("Error: {e}"),
/// }
/// ```
pub use error::Error;
