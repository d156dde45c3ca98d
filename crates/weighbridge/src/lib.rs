//! Order lifecycle engine for restaurants dispatching bulk takeout and
//! delivery orders.
//!
//! Inbound free-text orders are structured by an external collaborator,
//! resolved against a mutable per-tenant catalog (auto-extending it when
//! items are unknown), priced and weighed, then persisted atomically and
//! tracked through a reversible lifecycle with an append-only audit
//! ledger. Before dispatch the physical weight of the packed order is
//! checked against the catalog expectation, and an optional image-based
//! verification can run alongside.

pub mod config;
pub mod error;
pub mod store;
pub mod telemetry;
pub mod workflows;
