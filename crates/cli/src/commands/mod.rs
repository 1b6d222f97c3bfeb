pub mod diff;
pub mod dump;
pub mod graph;
pub mod util;

pub use diff::*;
pub use dump::*;
pub use graph::*;
pub use util::*;
