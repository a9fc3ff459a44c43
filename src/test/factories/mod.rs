//! Layout factories.

mod layouts;

pub use layouts::*;
