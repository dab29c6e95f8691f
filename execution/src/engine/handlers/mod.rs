mod bonus;
mod rewards;
mod settlement;
mod upkeep;

pub use bonus::BonusClaim;
