pub mod aggregate;
pub mod batch;
pub mod clade;
pub mod reference;
pub mod stages;
