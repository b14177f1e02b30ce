//! Transport implementations

pub mod console;

pub use console::{CONSOLE_SENDER, ConsoleTransport};
