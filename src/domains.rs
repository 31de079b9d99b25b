//! Domains ready to learn programs in.

pub mod strings;
