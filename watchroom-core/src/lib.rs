mod config;
mod playback;
mod presence;
mod time;
mod util;

pub use config::*;
pub use playback::*;
pub use presence::*;
pub use time::*;
pub use util::*;
