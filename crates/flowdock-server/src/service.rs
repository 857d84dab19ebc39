//! Component registration service
//!
//! Ties validation, compilation, the registry, propagation and reload into
//! the registration pipeline behind the HTTP surface.

use flowdock_core::{
    compile, validate_definition, CompileProfile, ComponentDefinition, ComponentId, ComponentSummary,
};
use flowdock_document_store::SharedDocument;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::error::ServerResult;
use crate::registry::RegistryStore;
use crate::reloader::{DocumentReloader, ReloadOutcome};
use crate::synchronizer::FlowSynchronizer;

/// Short description of a registered component
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisteredComponent {
    pub id: String,
    pub name: String,
    pub icon: String,
    pub group: String,
    pub color: String,
}

/// Response body for a successful registration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrationResponse {
    pub success: bool,
    pub id: String,
    pub message: String,
    pub component: RegisteredComponent,
}

/// Response body for the component listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentListResponse {
    pub success: bool,
    pub count: usize,
    pub components: Vec<ComponentSummary>,
}

/// Response body for a refresh
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefreshResponse {
    pub success: bool,
    pub message: String,
}

/// The registration pipeline and the read/refresh operations around it
#[derive(Debug)]
pub struct ComponentService {
    document: Arc<SharedDocument>,
    registry: Arc<RegistryStore>,
    synchronizer: Arc<FlowSynchronizer>,
    reloader: Arc<DocumentReloader>,
    registration_lock: Option<Mutex<()>>,
}

impl ComponentService {
    pub fn new(
        document: Arc<SharedDocument>,
        registry: Arc<RegistryStore>,
        synchronizer: Arc<FlowSynchronizer>,
        reloader: Arc<DocumentReloader>,
        serialize_registrations: bool,
    ) -> Self {
        Self {
            document,
            registry,
            synchronizer,
            reloader,
            registration_lock: serialize_registrations.then(|| Mutex::new(())),
        }
    }

    pub fn document(&self) -> &Arc<SharedDocument> {
        &self.document
    }

    pub fn registry(&self) -> &Arc<RegistryStore> {
        &self.registry
    }

    pub fn reloader(&self) -> &Arc<DocumentReloader> {
        &self.reloader
    }

    /// Validate, compile, store, propagate and reload one component
    /// submitted over HTTP.
    ///
    /// Validation failures are returned before anything is touched. Once the
    /// component is stored, propagation and reload failures are logged and the
    /// registration still succeeds. Any other failure is returned after a
    /// best-effort re-propagation of every API component.
    ///
    /// The pipeline runs on its own task, so dropping the returned future
    /// (a client hanging up) does not stop it halfway.
    pub async fn register(self: &Arc<Self>, definition: ComponentDefinition) -> ServerResult<RegistrationResponse> {
        self.spawn_registration(definition, CompileProfile::Api).await
    }

    /// Register through the programmatic surface.
    ///
    /// Same pipeline as [`register`](Self::register), but the body is
    /// compiled with the library defaults (group `Custom`, outputs
    /// `output` and `error`).
    pub async fn register_library(
        self: &Arc<Self>,
        definition: ComponentDefinition,
    ) -> ServerResult<RegistrationResponse> {
        self.spawn_registration(definition, CompileProfile::Library).await
    }

    async fn spawn_registration(
        self: &Arc<Self>,
        definition: ComponentDefinition,
        profile: CompileProfile,
    ) -> ServerResult<RegistrationResponse> {
        let id = validate_definition(&definition)?;

        let service = Arc::clone(self);
        tokio::spawn(async move { service.register_validated(definition, id, profile).await }).await?
    }

    async fn register_validated(
        &self,
        definition: ComponentDefinition,
        id: ComponentId,
        profile: CompileProfile,
    ) -> ServerResult<RegistrationResponse> {
        let _guard = match &self.registration_lock {
            Some(lock) => Some(lock.lock().await),
            None => None,
        };

        match self.run_pipeline(&definition, &id, profile).await {
            Ok(response) => Ok(response),
            Err(err) => {
                error!(component_id = %id, error = %err, "Error registering component");
                if let Err(fallback) = self.synchronizer.propagate_all_api_components().await {
                    warn!(error = %fallback, "Fallback propagation failed");
                }
                Err(err)
            }
        }
    }

    async fn run_pipeline(
        &self,
        definition: &ComponentDefinition,
        id: &ComponentId,
        profile: CompileProfile,
    ) -> ServerResult<RegistrationResponse> {
        let compilation = compile(definition, id, profile);
        debug!(component_id = %id, ?profile, size = compilation.compiled.as_str().len(), "Component compiled");

        self.registry.put(id, &compilation).await?;

        if let Err(err) = self.synchronizer.propagate(id.as_str(), &compilation.compiled).await {
            warn!(component_id = %id, error = %err, "Failed to propagate component to flows");
        }

        if let ReloadOutcome::Reloaded { failed, .. } = self.reloader.reload().await {
            if !failed.is_empty() {
                warn!(component_id = %id, flows = ?failed, "Some flows failed to reload");
            }
        }

        if let Err(err) = self.document.persist().await {
            warn!(error = %err, "Failed to persist document after reload");
        }

        if let Err(err) = self.synchronizer.propagate_all_api_components().await {
            warn!(error = %err, "Failed to synchronize API components with flows");
        }

        info!(component_id = %id, "Component registered successfully");

        // the response reports `Custom` for a missing group on both surfaces,
        // whatever the compiled body says
        let group = definition
            .group
            .as_deref()
            .filter(|group| !group.is_empty())
            .unwrap_or(CompileProfile::Library.default_group());

        let metadata = compilation.metadata;
        Ok(RegistrationResponse {
            success: true,
            id: id.as_str().to_string(),
            message: "Component registered successfully".to_string(),
            component: RegisteredComponent {
                id: metadata.id,
                name: metadata.name,
                icon: metadata.icon,
                group: group.to_string(),
                color: metadata.color,
            },
        })
    }

    /// Every well-formed component in the registry
    pub async fn list(&self) -> ComponentListResponse {
        let components = self.registry.list().await;
        debug!(count = components.len(), "Listing components");
        ComponentListResponse {
            success: true,
            count: components.len(),
            components,
        }
    }

    /// Re-run propagation of every API-origin component.
    ///
    /// Like registration, the pass runs on its own task so the in-memory
    /// update and its persist are never separated by a dropped request.
    pub async fn refresh(&self) -> ServerResult<RefreshResponse> {
        info!("Refreshing components");
        let synchronizer = Arc::clone(&self.synchronizer);
        tokio::spawn(async move { synchronizer.propagate_all_api_components().await }).await??;
        Ok(RefreshResponse {
            success: true,
            message: "Components refreshed successfully".to_string(),
        })
    }

    /// Catch-up propagation run once after startup
    pub async fn startup_sync(&self) {
        match self.synchronizer.propagate_all_api_components().await {
            Ok(added) => info!(added, "Startup component synchronization complete"),
            Err(err) => warn!(error = %err, "Startup component synchronization failed"),
        }
    }
}
