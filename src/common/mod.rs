//! Format-independent building blocks.

pub mod xml;
