//! WASM bindings for the epidemic model explorer.

pub mod equilibrium;
pub mod scenarios;
pub mod system;
