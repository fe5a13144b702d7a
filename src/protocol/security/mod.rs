pub mod des;
pub mod types;

pub use types::{AuthResult, SecurityType};
