//! Recording sinks.

pub mod collector;

pub use collector::{InMemorySink, Row, SinkCall};
