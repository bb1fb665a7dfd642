//! Registry of optional collaborators.
//!
//! Integrations outside the trust core (calendar sync, PDF export,
//! messaging, AI providers, feed ingestion) register here when they are
//! present. The core asks [`CapabilityRegistry::is_available`] instead of
//! assuming a collaborator exists.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::{Arc, RwLock};
use tracing::{info, warn};

/// An optional feature supplied by a collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Capability {
    CalendarSync,
    PdfExport,
    Sms,
    Email,
    Whatsapp,
    Ai,
    Rss,
}

impl Capability {
    pub const ALL: [Capability; 7] = [
        Self::CalendarSync,
        Self::PdfExport,
        Self::Sms,
        Self::Email,
        Self::Whatsapp,
        Self::Ai,
        Self::Rss,
    ];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CalendarSync => "calendar-sync",
            Self::PdfExport => "pdf-export",
            Self::Sms => "sms",
            Self::Email => "email",
            Self::Whatsapp => "whatsapp",
            Self::Ai => "ai",
            Self::Rss => "rss",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A collaborator that provides one capability.
pub trait Collaborator: Send + Sync {
    fn capability(&self) -> Capability;

    /// Human-readable name for logs.
    fn name(&self) -> &str;

    /// Whether the collaborator can serve requests right now (credentials
    /// configured, service reachable). Defaults to true.
    fn is_ready(&self) -> bool {
        true
    }
}

/// Outcome of [`CapabilityRegistry::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    Registered,
    /// Replaced a previously registered collaborator.
    Replaced,
    /// The capability is disabled by configuration.
    Disabled,
}

/// Thread-safe map from capability to its collaborator.
pub struct CapabilityRegistry {
    collaborators: RwLock<HashMap<Capability, Arc<dyn Collaborator>>>,
    disabled: BTreeSet<Capability>,
}

impl CapabilityRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::with_disabled(BTreeSet::new())
    }

    /// Creates a registry that refuses every capability in `disabled`.
    #[must_use]
    pub fn with_disabled(disabled: BTreeSet<Capability>) -> Self {
        Self {
            collaborators: RwLock::new(HashMap::new()),
            disabled,
        }
    }

    /// Registers `collaborator` for its capability.
    pub fn register(&self, collaborator: Arc<dyn Collaborator>) -> Registration {
        let capability = collaborator.capability();
        if self.disabled.contains(&capability) {
            warn!(
                "Refusing collaborator {}: capability {} is disabled",
                collaborator.name(),
                capability
            );
            return Registration::Disabled;
        }
        info!("Registered {} for {}", collaborator.name(), capability);
        let previous = self
            .collaborators
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(capability, collaborator);
        match previous {
            Some(_) => Registration::Replaced,
            None => Registration::Registered,
        }
    }

    /// Removes the collaborator for `capability`, returning it.
    pub fn unregister(&self, capability: Capability) -> Option<Arc<dyn Collaborator>> {
        self.collaborators
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&capability)
    }

    /// Returns true if a ready collaborator provides `capability`.
    #[must_use]
    pub fn is_available(&self, capability: Capability) -> bool {
        self.get(capability).is_some_and(|c| c.is_ready())
    }

    /// Returns the collaborator for `capability`, ready or not.
    #[must_use]
    pub fn get(&self, capability: Capability) -> Option<Arc<dyn Collaborator>> {
        self.collaborators
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&capability)
            .cloned()
    }

    /// Returns the capabilities currently available, sorted.
    #[must_use]
    pub fn available(&self) -> Vec<Capability> {
        let collaborators = self.collaborators.read().unwrap_or_else(|e| e.into_inner());
        let mut available: Vec<_> = collaborators
            .iter()
            .filter(|(_, c)| c.is_ready())
            .map(|(cap, _)| *cap)
            .collect();
        available.sort();
        available
    }

    #[must_use]
    pub fn is_disabled(&self, capability: Capability) -> bool {
        self.disabled.contains(&capability)
    }
}

impl Default for CapabilityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilityRegistry")
            .field("available", &self.available())
            .field("disabled", &self.disabled)
            .finish()
    }
}
