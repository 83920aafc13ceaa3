pub mod cook;
pub mod domain;
pub mod error;
pub mod protocol;
