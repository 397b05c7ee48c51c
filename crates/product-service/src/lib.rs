//! Product API guarded by the outbound resilience stack.
//!
//! Every product request first calls the downstream dependency through a
//! circuit breaker wrapping a retrying HTTP client
//! (see [`dependency::Dependency`]), and only touches storage once that call
//! has succeeded.
//!
//! ```text
//! handler ─▶ CircuitBreaker ─▶ Retry ─▶ PlainClient ─▶ Transport ─▶ downstream
//!    │
//!    └─▶ ProductRepository (only after the guarded call succeeds)
//! ```

pub mod app;
pub mod config;
pub mod dependency;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod repository;
pub mod telemetry;

pub use app::{router, AppState};
pub use config::{Settings, SettingsError};
pub use dependency::{Dependency, DependencyError};
pub use error::ApiError;
pub use repository::{InMemoryProductRepository, Product, ProductRepository, RepositoryError};
