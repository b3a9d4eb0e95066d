//! 公共库

pub mod category;
pub mod config;
pub mod node;
