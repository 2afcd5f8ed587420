//! Capability domain module.
//!
//! - `model`: `Capability` trait, inputs, errors, handles and the registry trait
//! - `catalog`: fixed capability tables

pub mod catalog;
mod model;

pub use model::{Capability, CapabilityError, CapabilityHandle, CapabilityInput, CapabilityRegistry};
