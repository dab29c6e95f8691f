mod achievement;
mod bonus;
mod constants;
mod economy;
mod game;
mod player;
mod rank;

pub use achievement::*;
pub use bonus::*;
pub use constants::*;
pub use economy::*;
pub use game::*;
pub use player::*;
pub use rank::*;
