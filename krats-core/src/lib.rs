//! The KRATS trust core: license gate, shared context and background
//! services.
//!
//! Startup goes through [`TrustContext::bootstrap`], which validates the
//! license before building the key store consumers, the audit log, the
//! encryption manager and the security manager. The resulting context is
//! passed explicitly to the rest of the application; there are no global
//! singletons.
//!
//! Background work (session timeouts, scheduled reminders) talks to the
//! core through a [`CoreHandle`] over a bounded channel.

mod capability;
pub mod config;
mod context;
mod error;
mod inactivity;
mod service;
pub mod telemetry;

pub use capability::{Capability, CapabilityRegistry, Collaborator, Registration};
pub use config::CoreConfig;
pub use context::{Bootstrap, TrustContext};
pub use error::{
    ConfigError, ConfigResult, ServiceError, ServiceResult, StartupError, StartupResult,
};
pub use inactivity::{ActivityTracker, InactivityMonitor};
pub use service::{CoreEvent, CoreHandle, CoreRequest, CoreService};
