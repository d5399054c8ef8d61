pub mod author;
pub mod citation;
pub mod identifiers;
pub mod record;

pub use author::*;
pub use citation::*;
pub use identifiers::*;
pub use record::*;
