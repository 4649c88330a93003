pub mod features;
pub mod weather;

pub use features::*;
pub use weather::*;
