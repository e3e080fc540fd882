//! Plugin contract and registry.
//!
//! Handlers are declared at startup with an explicit descriptor (id,
//! capabilities, danger flag, priority) — there is no runtime discovery,
//! which keeps the plugin set auditable. The registry probes each plugin's
//! `init` against a startup budget before accepting it.

pub mod contract;
pub mod event_bus;
pub mod registry;

pub use contract::{Handler, HandlerDescriptor, HandlerRequest, PluginContext};
pub use event_bus::EventBus;
pub use registry::{PluginLoadError, PluginRegistry};
