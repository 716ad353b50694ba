pub mod config;
pub mod predict;
pub mod vocab;

pub use config::*;
pub use predict::*;
pub use vocab::*;
