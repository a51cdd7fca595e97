pub mod config;
pub mod install;
pub mod steps;
pub mod up;
