//! Customer record
//!
//! Pure CRUD data; never consulted by the matching or lifecycle logic.

use crate::geo::Location;
use crate::ids::CustomerId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub id: CustomerId,
    pub name: String,
    pub phone: String,
    pub address: String,
    pub location: Location,
    pub email: Option<String>,
}

impl Customer {
    pub fn new(
        name: impl Into<String>,
        phone: impl Into<String>,
        address: impl Into<String>,
        location: Location,
    ) -> Self {
        Self {
            id: CustomerId::new(),
            name: name.into(),
            phone: phone.into(),
            address: address.into(),
            location,
            email: None,
        }
    }
}
