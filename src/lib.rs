// gem2openai - Cookie-session Gemini web client exposed as an OpenAI-compatible API
// Author: kelexine (https://github.com/kelexine)

pub mod auth;
pub mod cli;
pub mod config;
pub mod error;
pub mod gemini;
pub mod metrics;
pub mod models;
pub mod server;
pub mod sessions;
pub mod translation;
pub mod utils;
