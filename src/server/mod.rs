//! Axum-based HTTP server implementation for the gem2openai bridge.
//!
//! This module sets up the HTTP server, configures routes, and handles
//! incoming requests from clients that speak the OpenAI Chat Completions
//! API, bridging them to the Gemini web app.
//!
//! # Components
//!
//! - `handlers`: Implementation of individual API endpoints (chat, models, health, metrics).
//! - `middleware`: Request ID tracking, bearer auth, rate limiting and CORS.
//! - `routes`: The main router configuration that ties everything together.
//!
//! Author: kelexine (<https://github.com/kelexine>)

mod handlers;
mod middleware;
mod routes;

pub use routes::{create_router, AppState, BODY_LIMIT_BYTES};
