// ABOUTME: Root library module for the shelly binary
// ABOUTME: Settings loading and the console space used by the command line runner

pub mod console;
pub mod settings;
