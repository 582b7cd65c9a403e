//! Per-asset constraint builders.
//!
//! Each builder adds its own variables and constraints, then links the
//! balance and cost terms it owns. Builders never read each other's
//! registries, except degradation, which prices the battery flows.

pub mod battery;
pub mod degradation;
pub mod genset;
pub mod load_control;

pub use battery::build_batteries;
pub use degradation::build_degradation;
pub use genset::build_gensets;
pub use load_control::build_load_control;
