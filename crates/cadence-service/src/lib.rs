pub mod error;
pub mod generation;
pub mod window;
pub mod worker;

#[cfg(test)]
mod fixtures;
