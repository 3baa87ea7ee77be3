//! Delivery of formatted entries to channels.
//!
//! The chat transport itself lives outside this crate; it plugs in through
//! the `DeliverySink` trait.

pub mod sink;
pub mod unit;

pub use sink::{ConsoleSink, DeliverySink, RenderMode};
pub use unit::{
    deliver, truncate_text, DeliveryOutcome, DeliveryUnit, MAX_MESSAGE_LENGTH, TRUNCATION_SUFFIX,
};
