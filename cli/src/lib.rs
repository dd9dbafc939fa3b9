pub mod cli;
pub mod emit;
