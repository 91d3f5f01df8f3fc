//! Stream combinators

mod sample;

pub use sample::{Sample, SampleExt};
