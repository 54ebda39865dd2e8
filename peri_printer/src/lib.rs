//! Printer domain logic for the peripheral integration core: discovery, a
//! durable per-printer queue with retry and crash recovery, fallback
//! routing, and status monitoring. Layered the same way `peri_ecr` sits on
//! `peri_transport` for the payment side.

pub mod circuit_breaker;
pub mod discovery;
pub mod error;
pub mod queue;
pub mod router;
pub mod status;

pub use error::{PrinterError, Result};
