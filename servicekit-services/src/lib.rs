// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! # servicekit Services
//!
//! Request routing, the service registry and the concrete services.
//!
//! - **ServiceClient**: builds full URLs, attaches auth and content
//!   headers, and sends calls through the cache and pagination chain
//! - **ServiceRegistry**: binds services to one configuration, token and
//!   transport per generation
//! - **Services**: [`AuthenticationService`], [`AccountService`],
//!   [`SearchService`]
//!
//! ## Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use servicekit_fetch::SystemKeychain;
//! use servicekit_services::{RegistrySetup, SearchService, ServiceRegistry};
//!
//! let registry = ServiceRegistry::new();
//! registry
//!     .set(RegistrySetup::new(resolver, Arc::new(SystemKeychain::new())))
//!     .await?;
//!
//! let search = registry.service::<SearchService>().unwrap();
//! let hits = search.search_recent("#rust").await?;
//! ```

pub mod client;
pub mod descriptor;
pub mod error;
pub mod registry;
pub mod services;

pub use client::{ServiceClient, ServiceRequest};
pub use descriptor::ServiceKind;
pub use error::RegistryError;
pub use registry::{
    RegisteredService, RegistryDelegate, RegistryHandle, RegistrySetup, ServiceInstance,
    ServiceRegistry, TransportKind,
};

// Concrete services
pub use services::{
    AccountService, AuthenticationService, SearchResult, SearchService, SearchUser,
    password_signature,
};
