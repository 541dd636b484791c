//! Chat transport adapters.
//!
//! The engine only sees the `ChatTransport` trait from chatsh-core; an
//! adapter converts between it and a concrete surface.

pub mod console;

pub use console::ConsoleTransport;
