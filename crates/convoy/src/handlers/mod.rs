//! HTTP request handlers.

mod concurrency;
mod health;
pub mod test_gateway;
mod version;

pub use concurrency::concurrency;
pub use health::{livez, readyz};
pub use version::version;
