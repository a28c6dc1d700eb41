//! Distributed harvesting-and-processing pipeline engine.
//!
//! A task arrives from the external work queue, the harvest splitter expands
//! it into bounded schema/set/date-window chunks, the work-distribution
//! engine drains the resulting record tuples through a chain of pipeline
//! stages, and the state store tracks progress, errors and kill flags.

pub mod engine;
pub mod kill;
pub mod resolver;
pub mod splitter;
