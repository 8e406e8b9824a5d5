//! Command/selection engine.
//!
//! - [`selection`]: the per-session selection state
//! - [`dispatcher`]: request interpretation over the hierarchy

pub mod dispatcher;
pub mod selection;

pub use dispatcher::{Dispatcher, Request, Response};
pub use selection::Selection;
