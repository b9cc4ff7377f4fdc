pub mod probe;
pub mod repl;
pub mod selftest;
