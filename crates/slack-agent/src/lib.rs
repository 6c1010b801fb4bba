pub mod agent;
pub mod errors;
pub mod gateway;
pub mod identity;
pub mod models;
pub mod prompt_template;
pub mod providers;
pub mod systems;
pub mod wrapper;

pub use errors::{WrapperError, WrapperResult};
pub use wrapper::{EventStream, IdentityAwareAgent, ProviderFactory, WrapperConfig};
