pub mod ascii_display;
pub mod basics;
pub mod display;
pub mod error;
pub mod executor;
pub mod program;
pub mod vm;
