//! Identity and value types shared by every tier of the client.

mod content;
mod key;

pub use content::*;
pub use key::*;
