//! HTTP surface for the NeuroSurf semantic index: `/v1/semantic/index`,
//! `/v1/semantic/rag` and supporting document and session endpoints.

pub mod config;
pub mod error;
pub mod protocol;
pub mod server;
pub mod telemetry;

pub use config::{LogFormat, Provider, ServerConfig, load_dotenv, load_dotenv_from};
pub use server::{AppState, app_router, run_server};
pub use telemetry::init_tracing;
