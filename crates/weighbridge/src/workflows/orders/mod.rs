//! Order lifecycle workflow: free-text intake, catalog resolution,
//! expected-weight estimation, weight and visual verification, and the
//! reversible status machine with its audit ledger.

pub mod domain;
pub(crate) mod estimator;
pub(crate) mod normalizer;
pub(crate) mod resolver;
pub mod router;
pub mod service;
pub mod structuring;
pub mod verification;
pub mod visual;

#[cfg(test)]
mod tests;

pub use resolver::ResolutionError;
pub use router::order_router;
pub use service::{
    InvalidTransition, OrderService, OrderServiceError, WeighedOrder, INACTIVITY_WINDOW_HOURS,
};
pub use structuring::{StructuringError, StructuringGateway};
pub use visual::{VisionError, VisionGateway};
