//! Region capture: compositing a selection out of page rasters and handing
//! the result to its destination.

mod engine;
mod fallback;
mod output;
mod sink;

pub use engine::*;
pub use fallback::*;
pub use output::*;
pub use sink::*;
