//! Signal module - the four uncertainty estimators.
//!
//! Blackbox (text only): consistency, reflection.
//! Whitebox (token logprobs): perplexity, entropy.

mod consistency;
mod entropy;
mod perplexity;
mod reflection;

pub use consistency::*;
pub use entropy::*;
pub use perplexity::*;
pub use reflection::*;
