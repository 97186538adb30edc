mod base;
mod changefeed;

pub use base::*;
pub use changefeed::*;
