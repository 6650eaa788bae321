//! Host-facing helpers.

pub mod bootstrap;
