//! Host integration points
//!
//! The manager never runs plugin code itself. Enabling and disabling call
//! into a host-supplied [`PluginHooks`] implementation, and every visible
//! state change is reported as a [`PluginEvent`].

use std::fmt;

use crate::plugin::Plugin;

/// Error type hooks may return.
pub type HookError = Box<dyn std::error::Error + Send + Sync>;

/// Something that happened to a plugin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginEvent {
    Installed { plugin_id: String },
    Uninstalled { plugin_id: String },
    Enabled { plugin_id: String },
    Disabled { plugin_id: String },
    RefSwitched { plugin_id: String, reference: String },
}

impl PluginEvent {
    pub fn plugin_id(&self) -> &str {
        match self {
            Self::Installed { plugin_id }
            | Self::Uninstalled { plugin_id }
            | Self::Enabled { plugin_id }
            | Self::Disabled { plugin_id }
            | Self::RefSwitched { plugin_id, .. } => plugin_id,
        }
    }
}

impl fmt::Display for PluginEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Installed { plugin_id } => write!(f, "installed {plugin_id}"),
            Self::Uninstalled { plugin_id } => write!(f, "uninstalled {plugin_id}"),
            Self::Enabled { plugin_id } => write!(f, "enabled {plugin_id}"),
            Self::Disabled { plugin_id } => write!(f, "disabled {plugin_id}"),
            Self::RefSwitched {
                plugin_id,
                reference,
            } => write!(f, "switched {plugin_id} to {reference}"),
        }
    }
}

/// Callbacks into the host application.
pub trait PluginHooks {
    /// Load and activate the plugin's code.
    fn enable(&mut self, plugin: &Plugin) -> Result<(), HookError>;

    /// Deactivate the plugin's code and unregister its extensions.
    fn disable(&mut self, plugin: &Plugin) -> Result<(), HookError>;

    /// Observe a state change. The default ignores it.
    fn on_event(&mut self, _event: &PluginEvent) {}
}

/// Hooks for front ends that manage plugins without loading them.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHooks;

impl PluginHooks for NoopHooks {
    fn enable(&mut self, plugin: &Plugin) -> Result<(), HookError> {
        tracing::trace!(plugin_id = %plugin.plugin_id, "enable hook (no-op)");
        Ok(())
    }

    fn disable(&mut self, plugin: &Plugin) -> Result<(), HookError> {
        tracing::trace!(plugin_id = %plugin.plugin_id, "disable hook (no-op)");
        Ok(())
    }
}
