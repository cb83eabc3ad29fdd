//! Service registry.
//!
//! The registry binds a set of services to one configuration, token and
//! transport. Each `set` builds a complete generation and swaps it in whole;
//! services already handed out keep the generation they were built with.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock, Weak};

use servicekit_core::{Configuration, TokenSchema};
use servicekit_fetch::{
    CacheStore, CachedTransport, HttpTransport, KeyValueStore, MemoryCacheStore, StubTransport,
    TokenManager, Transport, TransportSettings,
};
use servicekit_store::ConfigurationResolver;
use tracing::{debug, info, instrument};

use crate::client::ServiceClient;
use crate::descriptor::ServiceKind;
use crate::error::RegistryError;
use crate::services::{AccountService, AuthenticationService, SearchService};

// ============================================================================
// Delegate
// ============================================================================

/// Receives registry-wide notifications.
pub trait RegistryDelegate: Send + Sync {
    /// Called when a signed-in service gets a 401.
    fn authentication_token_did_expire(&self, service: ServiceKind);
}

/// Delegate shared by the registry and every client it builds.
pub(crate) type DelegateSlot = Arc<RwLock<Option<Arc<dyn RegistryDelegate>>>>;

// ============================================================================
// Setup
// ============================================================================

/// Which raw transport a generation uses.
#[derive(Clone)]
pub enum TransportKind {
    /// Real HTTP.
    Http(TransportSettings),
    /// Rule-driven stub; its token store is bound on every `set`.
    Stub(Arc<StubTransport>),
    /// Any other transport.
    Custom(Arc<dyn Transport>),
}

impl Default for TransportKind {
    fn default() -> Self {
        Self::Http(TransportSettings::default())
    }
}

impl std::fmt::Debug for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Http(settings) => f.debug_tuple("Http").field(settings).finish(),
            Self::Stub(_) => f.write_str("Stub"),
            Self::Custom(transport) => f.debug_tuple("Custom").field(&transport.name()).finish(),
        }
    }
}

/// Everything the registry needs to build a generation.
#[derive(Clone)]
pub struct RegistrySetup {
    /// Services to construct.
    pub services: Vec<ServiceKind>,
    /// Resolves the configuration.
    pub resolver: ConfigurationResolver,
    /// Backing store for tokens.
    pub token_store: Arc<dyn KeyValueStore>,
    /// Fields required to accept a token.
    pub token_schema: TokenSchema,
    /// Raw transport.
    pub transport: TransportKind,
    /// Response cache.
    pub cache_store: Arc<dyn CacheStore>,
    /// Device identifier sent with logout calls.
    pub device_identifier: Option<String>,
    /// Per-service base URL overrides.
    pub base_urls: HashMap<ServiceKind, String>,
    /// Per-service version overrides.
    pub versions: HashMap<ServiceKind, String>,
}

impl RegistrySetup {
    /// Creates a setup for every known service over HTTP with an in-memory cache.
    pub fn new(resolver: ConfigurationResolver, token_store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            services: ServiceKind::all().to_vec(),
            resolver,
            token_store,
            token_schema: TokenSchema::default(),
            transport: TransportKind::default(),
            cache_store: Arc::new(MemoryCacheStore::new()),
            device_identifier: None,
            base_urls: HashMap::new(),
            versions: HashMap::new(),
        }
    }

    /// Restricts the services constructed.
    pub fn with_services(mut self, services: impl IntoIterator<Item = ServiceKind>) -> Self {
        self.services = services.into_iter().collect();
        self
    }

    /// Sets the token schema.
    pub fn with_token_schema(mut self, schema: TokenSchema) -> Self {
        self.token_schema = schema;
        self
    }

    /// Sets the transport.
    pub fn with_transport(mut self, transport: TransportKind) -> Self {
        self.transport = transport;
        self
    }

    /// Sets the cache store.
    pub fn with_cache_store(mut self, store: Arc<dyn CacheStore>) -> Self {
        self.cache_store = store;
        self
    }

    /// Sets the device identifier.
    pub fn with_device_identifier(mut self, id: impl Into<String>) -> Self {
        self.device_identifier = Some(id.into());
        self
    }

    /// Overrides the base URL of one service.
    pub fn with_base_url(mut self, kind: ServiceKind, url: impl Into<String>) -> Self {
        self.base_urls.insert(kind, url.into());
        self
    }

    /// Overrides the version of one service.
    pub fn with_version(mut self, kind: ServiceKind, version: impl Into<String>) -> Self {
        self.versions.insert(kind, version.into());
        self
    }
}

impl std::fmt::Debug for RegistrySetup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistrySetup")
            .field("services", &self.services)
            .field("token_schema", &self.token_schema)
            .field("transport", &self.transport)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Service Instances
// ============================================================================

/// A constructed service.
#[derive(Debug, Clone)]
pub enum ServiceInstance {
    /// Authentication service.
    Authentication(Arc<AuthenticationService>),
    /// Account service.
    Account(Arc<AccountService>),
    /// Search service.
    Search(Arc<SearchService>),
}

impl ServiceInstance {
    fn build(client: ServiceClient, handle: &RegistryHandle, setup: &RegistrySetup) -> Self {
        match client.kind() {
            ServiceKind::Authentication => Self::Authentication(Arc::new(
                AuthenticationService::new(
                    client,
                    handle.clone(),
                    setup.device_identifier.clone().unwrap_or_default(),
                ),
            )),
            ServiceKind::Account => Self::Account(Arc::new(AccountService::new(client))),
            ServiceKind::Search => Self::Search(Arc::new(SearchService::new(client))),
        }
    }

    /// Returns the kind.
    pub fn kind(&self) -> ServiceKind {
        match self {
            Self::Authentication(_) => ServiceKind::Authentication,
            Self::Account(_) => ServiceKind::Account,
            Self::Search(_) => ServiceKind::Search,
        }
    }
}

/// A service type the registry can hand out.
pub trait RegisteredService: Send + Sync + Sized + 'static {
    /// Key this type is registered under.
    const KIND: ServiceKind;

    /// Extracts this type from an instance of the same kind.
    fn from_instance(instance: &ServiceInstance) -> Option<Arc<Self>>;
}

// ============================================================================
// Registry
// ============================================================================

/// One immutable configuration/token/transport triple and its services.
struct Generation {
    setup: RegistrySetup,
    configuration: Arc<Configuration>,
    tokens: TokenManager,
    services: BTreeMap<ServiceKind, ServiceInstance>,
}

enum RegistryState {
    Unconfigured,
    Configured(Arc<Generation>),
}

struct RegistryInner {
    state: RwLock<RegistryState>,
    delegate: DelegateSlot,
}

/// Binds services to a shared configuration, token and transport.
///
/// Cloning is cheap; clones share state.
#[derive(Clone)]
pub struct ServiceRegistry {
    inner: Arc<RegistryInner>,
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceRegistry {
    /// Creates an unconfigured registry.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                state: RwLock::new(RegistryState::Unconfigured),
                delegate: DelegateSlot::default(),
            }),
        }
    }

    fn generation(&self) -> Option<Arc<Generation>> {
        match &*self.inner.state.read().unwrap_or_else(PoisonError::into_inner) {
            RegistryState::Unconfigured => None,
            RegistryState::Configured(generation) => Some(Arc::clone(generation)),
        }
    }

    fn handle(&self) -> RegistryHandle {
        RegistryHandle {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Builds a new generation from `setup` and makes it current.
    ///
    /// On error the previous generation stays in place.
    #[instrument(skip(self, setup), fields(services = setup.services.len()))]
    pub async fn set(&self, setup: RegistrySetup) -> Result<(), RegistryError> {
        let generation = self.build(setup).await?;
        let kinds: Vec<_> = generation.services.keys().copied().collect();

        *self.inner.state.write().unwrap_or_else(PoisonError::into_inner) =
            RegistryState::Configured(Arc::new(generation));

        info!(?kinds, "Registry configured");
        Ok(())
    }

    async fn build(&self, setup: RegistrySetup) -> Result<Generation, RegistryError> {
        let configuration = Arc::new(setup.resolver.resolve()?);
        let tokens = TokenManager::new(
            Arc::clone(&setup.token_store),
            setup.token_schema.clone(),
        );

        let raw: Arc<dyn Transport> = match &setup.transport {
            TransportKind::Http(settings) => {
                Arc::new(HttpTransport::with_settings(settings.clone())?)
            }
            TransportKind::Stub(stub) => {
                stub.bind_token_manager(tokens.clone());
                Arc::clone(stub) as Arc<dyn Transport>
            }
            TransportKind::Custom(transport) => Arc::clone(transport),
        };
        let transport: Arc<dyn Transport> = Arc::new(CachedTransport::with_store(
            raw,
            Arc::clone(&setup.cache_store),
        ));

        let token = tokens.current().await;
        debug!(
            transport = transport.name(),
            authenticated = token.is_some(),
            "Building services"
        );

        let handle = self.handle();
        let mut services = BTreeMap::new();
        for &kind in &setup.services {
            let mut client = ServiceClient::new(
                kind,
                Arc::clone(&configuration),
                token.clone(),
                tokens.clone(),
                Arc::clone(&transport),
            )
            .with_delegate(Arc::clone(&self.inner.delegate));
            if let Some(url) = setup.base_urls.get(&kind) {
                client = client.with_base_url(url.clone());
            }
            if let Some(version) = setup.versions.get(&kind) {
                client = client.with_version(version.clone());
            }
            services.insert(kind, ServiceInstance::build(client, &handle, &setup));
        }

        Ok(Generation {
            setup,
            configuration,
            tokens,
            services,
        })
    }

    /// Drops the current generation. Lookups return `None` until the next `set`.
    pub fn reset(&self) {
        *self.inner.state.write().unwrap_or_else(PoisonError::into_inner) =
            RegistryState::Unconfigured;
        info!("Registry reset");
    }

    /// Rebuilds the current service list with a fresh configuration and token.
    ///
    /// References obtained before the reload keep their old generation.
    pub async fn reload_existing_services(&self) -> Result<(), RegistryError> {
        let setup = self
            .generation()
            .map(|generation| generation.setup.clone())
            .ok_or(RegistryError::NotConfigured)?;
        debug!("Reloading services");
        self.set(setup).await
    }

    /// Returns the registered service of type `S`.
    pub fn service<S: RegisteredService>(&self) -> Option<Arc<S>> {
        self.instance(S::KIND)
            .as_ref()
            .and_then(S::from_instance)
    }

    /// Returns the registered instance for `kind`.
    pub fn instance(&self, kind: ServiceKind) -> Option<ServiceInstance> {
        self.generation()?.services.get(&kind).cloned()
    }

    /// True once `set` has succeeded and until `reset`.
    pub fn is_configured(&self) -> bool {
        self.generation().is_some()
    }

    /// Returns the current configuration.
    pub fn configuration(&self) -> Option<Arc<Configuration>> {
        self.generation()
            .map(|generation| Arc::clone(&generation.configuration))
    }

    /// Returns the current token store.
    pub fn token_manager(&self) -> Option<TokenManager> {
        self.generation().map(|generation| generation.tokens.clone())
    }

    /// Returns the kinds of the registered services, in order.
    pub fn registered_kinds(&self) -> Vec<ServiceKind> {
        self.generation()
            .map(|generation| generation.services.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Sets the delegate. Applies to services built before and after.
    pub fn set_delegate(&self, delegate: Arc<dyn RegistryDelegate>) {
        *self
            .inner
            .delegate
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(delegate);
    }

    /// Removes the delegate.
    pub fn clear_delegate(&self) {
        *self
            .inner
            .delegate
            .write()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl std::fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("configured", &self.is_configured())
            .field("services", &self.registered_kinds())
            .finish()
    }
}

/// Weak reference services use to reload the registry that built them.
#[derive(Clone)]
pub struct RegistryHandle {
    inner: Weak<RegistryInner>,
}

impl RegistryHandle {
    /// Reloads the registry, if it still exists.
    pub async fn reload(&self) -> Result<(), RegistryError> {
        let inner = self.inner.upgrade().ok_or(RegistryError::NotConfigured)?;
        ServiceRegistry { inner }.reload_existing_services().await
    }
}

impl std::fmt::Debug for RegistryHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryHandle")
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
