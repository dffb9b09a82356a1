#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

mod bus;
mod common;
mod context;
pub mod dev;
mod device;
mod error;
mod port;
mod watcher;

pub use common::{Direction, Edge, EventFn, LevelFn, PortEvent};
pub use context::{Context, Settings, DEFAULT_DEBOUNCE};
pub use device::Interface;
pub use error::{Error, Result};
pub use port::Port;

pub use dev::mcp23017::{Bank, Mcp23017};
pub use dev::native::{NativeGpio, NativePins};
