pub mod driver;
pub mod error;
pub mod factory;
mod header;
pub mod logger;
pub mod manager;
pub mod reg;
pub mod reg_set;

pub use reg_model_generator::*;
