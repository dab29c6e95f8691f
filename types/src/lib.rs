//! Data model shared by the casino engine and its adapters.
//!
//! Everything in this crate is plain data plus the pure arithmetic that goes with it
//! (rank/level tables, bonus quotes, achievement predicates). Nothing here performs I/O
//! or takes a lock.

pub mod casino;

pub use casino::UserId;
