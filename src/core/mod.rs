pub mod config;
pub mod error;
pub mod guard;
pub mod state;

pub use config::*;
pub use error::*;
pub use guard::*;
pub use state::*;
