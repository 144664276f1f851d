mod model;
mod source;

pub use model::*;
pub use source::*;
