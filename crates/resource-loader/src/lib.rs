//! Fetch-once loading of remote map resources.
//!
//! A [`SingletonLoader`] owns one credential-backed resource (the Google Maps
//! script, the Mapbox style). However many tasks call [`SingletonLoader::load`]
//! at once, the credential is fetched at most once and the resource injected
//! at most once; every caller sees the same outcome.
//!
//! ```text
//! load() ──► cached credential? ──no──► CredentialSource::fetch ──► cache
//!                  │ yes                                            │
//!                  └──────────────► ResourceInjector::inject ◄──────┘
//!                                            │
//!                                 ResourceRegistry::publish
//! ```

mod error;
mod injector;
mod loader;
mod registry;
mod source;
mod state;

pub use error::{LoadError, LoadResult};
pub use injector::{HttpResourceInjector, LoadedResource, ResourceInjector, ResourceTemplate};
pub use loader::{LoaderConfig, LoaderStatus, SingletonLoader};
pub use registry::ResourceRegistry;
pub use source::{CredentialSource, EdgeFunctionSource, EnvSource};
pub use state::{LoadMachine, LoadMachineInput, LoadMachineState, LoadStatus};
