pub mod memory;
pub mod run;
