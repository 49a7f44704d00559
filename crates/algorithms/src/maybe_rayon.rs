//! Parallel iteration when the `parallel` feature is on, plain iteration otherwise.
//!
//! Callers write `into_par_iter()` either way. Without rayon the call
//! resolves to `into_iter()`, so `map`/`collect` fall back to the standard
//! `Iterator` methods and output order is unchanged.

#[cfg(feature = "parallel")]
pub use rayon::prelude::*;

#[cfg(not(feature = "parallel"))]
mod sequential {
    pub trait IntoParallelIterator {
        type Iter;
        type Item;
        fn into_par_iter(self) -> Self::Iter;
    }

    impl<I: IntoIterator> IntoParallelIterator for I {
        type Iter = I::IntoIter;
        type Item = I::Item;
        fn into_par_iter(self) -> Self::Iter {
            self.into_iter()
        }
    }
}

#[cfg(not(feature = "parallel"))]
pub use sequential::*;
