//! Small building blocks shared by the transport, engine and orchestrator.

pub mod cancel;
pub mod location;

pub use cancel::CancelToken;
