pub mod catalog;
pub mod command;
pub mod executor;
pub mod fastx;
pub mod file;
pub mod system;
