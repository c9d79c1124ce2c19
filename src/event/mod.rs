//! Event module - alarm notification decoding

pub mod ingestor;

pub use ingestor::{AlarmEvent, AlarmNameConvention, EventIngestor};
