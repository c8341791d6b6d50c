//! VirLaw backend: a retrieval-augmented question service over a local
//! legal knowledge corpus, with document upload and Gemini-backed answers.

pub mod core;
pub mod knowledge;
pub mod llm;
pub mod loader;
pub mod server;
pub mod state;
