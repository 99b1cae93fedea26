pub mod common;

pub use common::{init_tracing, parse_dims, validate_backend_choice, BackendKind};
