//! Translation between the OpenAI chat format and the Abacus chat backend.
//!
//! The core of the proxy: folds chat histories into one backend message, parses
//! the backend's line stream, and projects it back into OpenAI chunks or a full
//! completion. Nothing in here performs network I/O.

pub mod backend_types;
pub mod openai_types;
pub mod request;
pub mod response;
pub mod sse;
pub mod streaming;
