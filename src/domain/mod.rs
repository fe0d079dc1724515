pub mod lines;
pub mod order;

pub use lines::*;
pub use order::*;
