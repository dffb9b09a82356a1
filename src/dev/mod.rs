//! Device backends: one module per supported hardware kind.

pub mod mcp23017;
pub mod native;
