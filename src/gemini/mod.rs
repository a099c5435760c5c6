// Gemini web client module
// Author: kelexine (https://github.com/kelexine)

pub mod backend;
mod client;
pub mod credentials;
pub mod parser;

pub use backend::{
    BackendStatus, Candidate, ChatMetadata, ChatSession, FileRef, GeminiBackend, ModelOutput,
    WebImage,
};
pub use client::GeminiClient;
pub use credentials::{CredentialManager, Credentials};
