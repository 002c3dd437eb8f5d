//! These models represent the objects passed around by the agent
//!
//! Messages are kept in the shape the provider expects so the context can be
//! serialized straight into a request. Tool calls are held with parsed
//! arguments and only turned back into argument text on the wire.
pub mod message;
pub mod role;
pub mod tool;
