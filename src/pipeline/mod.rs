//! Pipeline module - orchestration, fusion, and batch scoring.

mod batch;
mod fusion;
mod uncertainty;

pub use batch::*;
pub use fusion::*;
pub use uncertainty::*;
