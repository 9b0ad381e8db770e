//! Per-user persona selection.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::catalog::PersonaCatalog;
use crate::template::PersonaTemplate;

/// Owns which persona each user currently speaks to. Selections are created
/// lazily, changed by explicit switch, cleared by reset, and never expire —
/// unlike conversation contexts.
///
/// Switching a persona does not touch conversation history; clearing history
/// after a switch is the calling layer's contract.
#[derive(Clone)]
pub struct PersonaManager {
    catalog: Arc<PersonaCatalog>,
    current: Arc<RwLock<HashMap<String, String>>>,
    default_persona: String,
}

impl PersonaManager {
    pub fn new(catalog: Arc<PersonaCatalog>, default_persona: impl Into<String>) -> Self {
        Self {
            catalog,
            current: Arc::new(RwLock::new(HashMap::new())),
            default_persona: default_persona.into(),
        }
    }

    pub fn catalog(&self) -> &Arc<PersonaCatalog> {
        &self.catalog
    }

    /// The template bound to the user's selection, falling back to the
    /// configured default, then to the literal `"default"` template. Absence
    /// of "default" is a configuration error; even then a safety template is
    /// returned rather than an error.
    pub async fn current(&self, user_id: &str) -> PersonaTemplate {
        let selected = self.current.read().await.get(user_id).cloned();
        if let Some(name) = selected {
            if let Some(template) = self.catalog.resolve(&name).await {
                return template;
            }
            debug!(user_id = %user_id, persona = %name, "Selected persona no longer exists");
        }
        if let Some(template) = self.catalog.resolve(&self.default_persona).await {
            return template;
        }
        if let Some(template) = self.catalog.resolve("default").await {
            return template;
        }
        PersonaTemplate::fallback()
    }

    /// Switches the user's persona. Resolves aliases through the catalog and
    /// stores the canonical name, so later alias-table edits cannot orphan
    /// the selection. Returns false when nothing resolves.
    pub async fn switch(&self, user_id: &str, name_or_alias: &str) -> bool {
        match self.catalog.resolve(name_or_alias).await {
            Some(template) => {
                info!(
                    user_id = %user_id,
                    requested = %name_or_alias,
                    persona = %template.name,
                    "Persona switched"
                );
                self.current
                    .write()
                    .await
                    .insert(user_id.to_string(), template.name);
                true
            }
            None => {
                debug!(user_id = %user_id, requested = %name_or_alias, "Unknown persona");
                false
            }
        }
    }

    /// Clears the user's selection; the next lookup sees the default again.
    pub async fn reset(&self, user_id: &str) {
        self.current.write().await.remove(user_id);
    }

    /// The raw stored selection, if any. Mainly for diagnostics.
    pub async fn selected(&self, user_id: &str) -> Option<String> {
        self.current.read().await.get(user_id).cloned()
    }

    pub async fn add_custom(&self, template: PersonaTemplate) -> bool {
        self.catalog.add_custom(template).await
    }

    pub async fn remove_custom(&self, name: &str) -> bool {
        self.catalog.remove_custom(name).await
    }
}
