//! Small cross-cutting utilities: graceful shutdown and logging setup.

pub mod sig_down;
pub mod telemetry;

pub use sig_down::SigDown;
pub use telemetry::Telemetry;
