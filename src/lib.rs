//! Metamorph -- Self-Modification Engine
//!
//! Lets an autonomous process propose, risk-classify, gate behind approval,
//! atomically apply, verify, and roll back changes to its own source tree.
//! The orchestrator in [`engine`] is the only writer of proposal lifecycle
//! state; everything it collaborates with is an injected trait object.

pub mod approval;
pub mod audit;
pub mod config;
pub mod engine;
pub mod error;
pub mod patch;
pub mod risk;
pub mod store;
pub mod types;
pub mod verify;

pub use engine::Engine;
pub use error::EngineError;
