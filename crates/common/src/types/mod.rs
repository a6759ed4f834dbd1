mod routing;
mod template;

pub use routing::*;
pub use template::*;
