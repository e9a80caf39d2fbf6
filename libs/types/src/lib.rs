//! Types library for the field dispatch system
//!
//! Core type definitions shared by every service crate: validated value
//! types, entity records with tagged status enums, and the error taxonomy.
//!
//! # Modules
//! - `ids`: Unique identifiers (CustomerId, TechnicianId, JobId, AssignmentId)
//! - `geo`: Location and great-circle distance
//! - `technician`: Technician record and availability status
//! - `job`: Job record, priority tiers, lifecycle states
//! - `assignment`: Job-technician binding
//! - `customer`: Customer record
//! - `errors`: Error taxonomy

pub mod assignment;
pub mod customer;
pub mod errors;
pub mod geo;
pub mod ids;
pub mod job;
pub mod technician;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::assignment::*;
    pub use crate::customer::*;
    pub use crate::errors::*;
    pub use crate::geo::*;
    pub use crate::ids::*;
    pub use crate::job::*;
    pub use crate::technician::*;
}
