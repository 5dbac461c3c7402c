//! Key rewrites applied before a constraint set reaches the cache. Both
//! passes are deterministic, so they yield the same key on insert and
//! lookup.

pub mod algebra;
pub mod names;

pub use algebra::AlgebraNormalizer;
pub use names::NameNormalizer;
