//! Service catalog: what each purchasable service targets and how the
//! dispatcher reaches it at the provider.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// What a service acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceKind {
    Likes,
    Comments,
    Views,
    ReelViews,
    Followers,
}

impl ServiceKind {
    /// Content-scoped kinds must target a specific post or reel URL.
    pub fn requires_content_url(&self) -> bool {
        !self.is_profile_wide()
    }

    /// Profile-wide kinds target the account itself.
    pub fn is_profile_wide(&self) -> bool {
        matches!(self, ServiceKind::Followers)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceKind::Likes => "likes",
            ServiceKind::Comments => "comments",
            ServiceKind::Views => "views",
            ServiceKind::ReelViews => "reel_views",
            ServiceKind::Followers => "followers",
        }
    }
}

impl std::fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One purchasable service and its provider routing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDefinition {
    pub id: String,
    pub kind: ServiceKind,
    /// Provider account the dispatcher bills against.
    pub provider_id: String,
    /// Provider-side identifier for this exact service.
    pub external_service_id: String,
}

impl ServiceDefinition {
    pub fn new(
        id: impl Into<String>,
        kind: ServiceKind,
        provider_id: impl Into<String>,
        external_service_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            provider_id: provider_id.into(),
            external_service_id: external_service_id.into(),
        }
    }
}

/// Lookup table from service id to definition.
#[derive(Debug, Clone, Default)]
pub struct ServiceCatalog {
    services: HashMap<String, ServiceDefinition>,
}

impl ServiceCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// The storefront's standard Instagram services.
    pub fn builtin() -> Self {
        let mut catalog = Self::new();
        for (id, kind, external_service_id) in [
            ("instagram-likes", ServiceKind::Likes, "2101"),
            ("instagram-comments", ServiceKind::Comments, "2205"),
            ("instagram-views", ServiceKind::Views, "2310"),
            ("instagram-reel-views", ServiceKind::ReelViews, "2311"),
            ("instagram-followers", ServiceKind::Followers, "2408"),
        ] {
            catalog.insert(ServiceDefinition::new(id, kind, "smm-main", external_service_id));
        }
        catalog
    }

    pub fn insert(&mut self, definition: ServiceDefinition) {
        self.services.insert(definition.id.clone(), definition);
    }

    /// Builder-style insert for test and config wiring.
    pub fn with_service(mut self, definition: ServiceDefinition) -> Self {
        self.insert(definition);
        self
    }

    pub fn get(&self, service_id: &str) -> Option<&ServiceDefinition> {
        self.services.get(service_id)
    }

    /// Looks up a service id, failing for unknown ids.
    pub fn require(&self, service_id: &str) -> Result<&ServiceDefinition, DomainError> {
        self.get(service_id).ok_or_else(|| DomainError::ServiceNotFound {
            service_id: service_id.to_string(),
        })
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}
