//! Pure read projections of state, optionally memoized.

mod memo;

pub use memo::{dep, DepFn, DerivedSelector, EqualityFn, MemoSelector};
