mod clock;
mod command;

pub use clock::*;
pub use command::*;
