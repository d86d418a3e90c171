//! Payment-platform integration: field catalog, request signing, response
//! parsing and result classification.

pub mod classifier;
pub mod fields;
pub mod request;
pub mod response;
pub mod signature;
pub mod variants;
