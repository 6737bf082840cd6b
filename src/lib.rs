pub mod arch;
pub mod cli;
pub mod gguf;
pub mod hparams;
pub mod kv_layout;
pub mod loader;
pub mod model;
pub mod report;
pub mod swa;

pub use hparams::{Hparams, HparamsBuilder, LayerKind, LayerValues, RecurrentLayers, StateFamily};
pub use swa::SwaPattern;
