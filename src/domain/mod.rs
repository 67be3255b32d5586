//! Content entities and the static content-type discriminator.

mod content;
mod entities;

pub use content::*;
pub use entities::*;
