pub mod exception;
pub mod instance;
pub mod rule;
pub mod template;
pub mod window;
