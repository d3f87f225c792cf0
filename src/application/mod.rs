// Application layer - the transaction engine and report materializer.
// Transports (CLI, HTTP) call in with validated primitives and render
// results or errors; they never touch the stores directly.

mod engine;
pub mod error;
mod reporting;

pub use engine::*;
pub use error::*;
pub use reporting::*;
