//! Built-in tools.
//!
//! The application-model tools (user stories, forms, reports, workflows) are
//! registered by the embedding host; this module only ships the diagnostic
//! tools the bare server carries so a stand-alone binary is usable.

use std::time::Instant;

use serde_json::json;

use crate::error::RegistryError;
use crate::registry::{ToolDefinition, ToolRegistry};

/// Register the built-in diagnostic tools.
pub fn register_builtin(registry: &mut ToolRegistry) -> Result<(), RegistryError> {
    let started_at = Instant::now();

    registry.register(ToolDefinition::new(
        "server_status",
        "Report server name, version and uptime.",
        json!({
            "type": "object",
            "properties": {},
            "additionalProperties": false
        }),
        move |_args| {
            let uptime = started_at.elapsed().as_secs();
            async move {
                Ok(json!({
                    "name": env!("CARGO_PKG_NAME"),
                    "version": env!("CARGO_PKG_VERSION"),
                    "uptimeSeconds": uptime,
                }))
            }
        },
    ))
}
