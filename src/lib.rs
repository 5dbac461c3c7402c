#[macro_use]
pub mod util;

pub mod assignment;
pub mod bitvec;
pub mod cli;
pub mod config;
pub mod expr;
pub mod normalize;
pub mod pcache;
pub mod solver;
pub mod stats;
