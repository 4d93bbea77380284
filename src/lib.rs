pub mod accumulate;
pub mod gtr;
pub mod io;
pub mod merge;
pub mod nucleotide;
pub mod progress;
pub mod reduce;
pub mod stats;
pub mod tree;
pub mod utils;

pub use accumulate::{AccumulateOptions, Accumulation, WindowAccumulator};
pub use gtr::{GtrLikelihood, GtrParameters, LikelihoodOptions};
pub use reduce::{ModelVariant, ReducedStats, reduce};
