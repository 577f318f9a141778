//! Asynchronous seams to template descriptions and saved profiles.

use std::collections::{BTreeMap, HashMap};
use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::SessionError;

/// Source of template descriptions, addressed by template identifier.
#[async_trait]
pub trait TemplateSource: Send + Sync {
    /// Fetch the raw description of `id`.
    async fn fetch(&self, id: &str) -> Result<String, SessionError>;
}

/// Storage of named profiles per template.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Names of the profiles saved for `template`, sorted.
    async fn list(&self, template: &str) -> Result<Vec<String>, SessionError>;
    async fn load(&self, template: &str, name: &str) -> Result<String, SessionError>;
    /// Store a profile; an existing one is only replaced when `overwrite` is set.
    async fn save(
        &self,
        template: &str,
        name: &str,
        xml: String,
        overwrite: bool,
    ) -> Result<(), SessionError>;
    async fn delete(&self, template: &str, name: &str) -> Result<(), SessionError>;
}

/// Reads `<root>/<id>.xml` for each requested template.
#[derive(Debug, Clone)]
pub struct DirTemplateSource {
    root: PathBuf,
}

impl DirTemplateSource {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl TemplateSource for DirTemplateSource {
    async fn fetch(&self, id: &str) -> Result<String, SessionError> {
        let path = self.root.join(format!("{id}.xml"));
        debug!(template = id, path = %path.display(), "reading template description");
        tokio::fs::read_to_string(&path)
            .await
            .map_err(|err| match err.kind() {
                ErrorKind::NotFound => SessionError::TemplateNotFound(id.to_string()),
                _ => SessionError::storage(format!("{}: {err}", path.display())),
            })
    }
}

/// Process-local profile store.
#[derive(Debug, Default)]
pub struct MemoryProfileStore {
    profiles: Mutex<HashMap<String, BTreeMap<String, String>>>,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProfileStore for MemoryProfileStore {
    async fn list(&self, template: &str) -> Result<Vec<String>, SessionError> {
        let profiles = self.profiles.lock().await;
        Ok(profiles
            .get(template)
            .map(|saved| saved.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn load(&self, template: &str, name: &str) -> Result<String, SessionError> {
        let profiles = self.profiles.lock().await;
        profiles
            .get(template)
            .and_then(|saved| saved.get(name))
            .cloned()
            .ok_or_else(|| SessionError::ProfileNotFound(name.to_string()))
    }

    async fn save(
        &self,
        template: &str,
        name: &str,
        xml: String,
        overwrite: bool,
    ) -> Result<(), SessionError> {
        let mut profiles = self.profiles.lock().await;
        let saved = profiles.entry(template.to_string()).or_default();
        if !overwrite && saved.contains_key(name) {
            return Err(SessionError::ProfileExists(name.to_string()));
        }
        saved.insert(name.to_string(), xml);
        Ok(())
    }

    async fn delete(&self, template: &str, name: &str) -> Result<(), SessionError> {
        let mut profiles = self.profiles.lock().await;
        profiles
            .get_mut(template)
            .and_then(|saved| saved.remove(name))
            .map(|_| ())
            .ok_or_else(|| SessionError::ProfileNotFound(name.to_string()))
    }
}
