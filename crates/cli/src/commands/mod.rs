//! CLI Commands

pub mod apps;
pub mod git;
pub mod logs;
pub mod machine;
pub mod npm;
pub mod services;
