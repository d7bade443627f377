//! Domain records and page-tree invariants.

pub mod entities;
pub mod error;
pub mod pages;
pub mod slug;
pub mod types;
