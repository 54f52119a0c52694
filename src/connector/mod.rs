//! Concrete connectors built on the enumerator and reader runtime

pub mod file;
