pub mod types;

// io
pub mod input_reader;

// client
pub mod client;
