pub mod accumulator;
pub mod base;
pub mod configs;
pub mod decoder;
pub mod errors;
pub mod events;
pub mod openai;
pub mod retry;
pub mod utils;

#[cfg(test)]
pub mod mock;
