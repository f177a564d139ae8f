//! Utility library for the pfvq experiment tooling

pub mod cache;
