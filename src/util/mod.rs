//! Small shared helpers.

pub mod format;

pub use format::{format_duration, format_size, format_time, format_time_in};
