#![forbid(unsafe_code)]

pub mod discover;
pub mod pipeline;

pub use discover::{discover_units, is_generated, UnitPath};
pub use pipeline::{run_build, BuildOptions, BuildReport, TRANSPILER_VERSION};
