//! Small concurrency helpers.

mod once;

pub use once::OnceCall;
