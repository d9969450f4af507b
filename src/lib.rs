//! rmem: a seed-and-extend short read aligner.
//!
//! Reads are aligned against a preprocessed reference (`index`): super-maximal
//! exact matches are collected (`smem`), clustered into co-linear chains
//! (`chain`), extended into scored alignment regions with a banded
//! Smith-Waterman kernel (`extend`, `sw`), post-processed into primary and
//! secondary hits with mapping qualities (`region`) and serialized as SAM
//! (`sam`). `mapper` drives batches of reads across worker threads.

#[macro_use]
extern crate log;

#[cfg(test)]
#[macro_use]
extern crate quickcheck;

pub mod chain;
pub mod error;
pub mod extend;
pub mod index;
pub mod io;
pub mod mapper;
pub mod opts;
pub mod region;
pub mod sam;
pub mod smem;
pub mod sw;
pub mod util;
