pub mod board;
pub mod events;
pub mod player;
pub mod roster;
pub mod snapshot;

pub use board::*;
pub use events::*;
pub use player::*;
pub use roster::*;
pub use snapshot::*;
