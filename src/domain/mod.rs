//! Demo content served on top of the dispatch core
//!
//! A calculator tool and a small task list exposed as tools and resources.

pub mod calculator;
pub mod tasks;
pub mod todolist;
pub mod utils;
