// Library surface for the terminal driver and the headless integration tests.
pub mod config;
pub mod engine;
pub mod error;
pub mod grammar;
pub mod logger;
pub mod media;
pub mod playback;
pub mod questionnaire;
pub mod runtime;
pub mod sampler;
pub mod session;
pub mod settings;
pub mod validator;

pub use error::{Result, SessionError};
