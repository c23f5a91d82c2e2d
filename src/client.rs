//! Assistant client: the request-facing composition of the core.
//!
//! A request flows through the pieces in a fixed order: resolve the image,
//! check the response cache, read session context, then call the provider
//! through its circuit breaker and retry policy. Successful results are
//! cached and written back to the session; every request ends with one
//! telemetry record.

mod builder;
mod core;
mod status;
mod types;

pub use builder::AssistClientBuilder;
pub use core::AssistClient;
pub use status::StatusSnapshot;
pub use types::{AssistRequest, AssistResponse, InspectResponse, ResolvedImage, TextResponse};
