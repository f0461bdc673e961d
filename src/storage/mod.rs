pub mod hash;
pub mod share;

pub use hash::HashUtils;
pub use share::ShareSet;
