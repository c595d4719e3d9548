pub mod bundle_adjustment;
pub mod factors;

pub use bundle_adjustment::*;
