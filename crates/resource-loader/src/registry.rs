//! Resources that finished loading.

use crate::injector::LoadedResource;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Resources currently available, by loader key.
///
/// Stands in for the live environment a loaded resource lives in: anything
/// may remove an entry, and loaders re-check it before trusting their own
/// state.
#[derive(Debug, Default)]
pub struct ResourceRegistry {
    resources: RwLock<HashMap<String, LoadedResource>>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, key: &str, resource: LoadedResource) {
        self.resources.write().insert(key.to_string(), resource);
    }

    pub fn get(&self, key: &str) -> Option<LoadedResource> {
        self.resources.read().get(key).cloned()
    }

    pub fn remove(&self, key: &str) -> Option<LoadedResource> {
        self.resources.write().remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.resources.read().contains_key(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_resource_registry() {
        let registry = ResourceRegistry::new();
        assert!(!registry.contains("google_maps"));

        registry.publish(
            "google_maps",
            LoadedResource {
                provider: "google_maps".to_string(),
                url: "https://example.test?key=***".to_string(),
                loaded_at: Utc::now(),
            },
        );
        assert!(registry.contains("google_maps"));
        assert_eq!(registry.get("google_maps").map(|r| r.provider), Some("google_maps".to_string()));
        assert!(registry.remove("google_maps").is_some());
        assert!(registry.get("google_maps").is_none());
    }
}
