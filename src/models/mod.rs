mod audit;
mod customers;
mod devices;

pub use audit::*;
pub use customers::*;
pub use devices::*;

use serde::Serialize;

/// Operator identity attached to every deployment run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Operator {
    pub name: String,
    pub ip: String,
}

impl Operator {
    pub fn new(name: impl Into<String>, ip: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ip: ip.into(),
        }
    }
}
