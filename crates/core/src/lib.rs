#![forbid(unsafe_code)]

pub mod mastery;
pub mod model;
pub mod performance;
pub mod stats;
pub mod time;

pub use time::Clock;
