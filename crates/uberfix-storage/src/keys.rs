//! Storage key constants.

/// Keys under which map credentials are cached.
///
/// The version suffix is bumped to force every device to refetch.
pub struct StorageKeys;

impl StorageKeys {
    /// Google Maps JavaScript API key
    pub const GOOGLE_MAPS_API_KEY: &'static str = "google_maps_api_key_v2";

    /// Mapbox public access token
    pub const MAPBOX_TOKEN: &'static str = "mapbox_token_v1";
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EXPIRY_SUFFIX;

    #[test]
    fn test_storage_keys_unique_and_not_expiry_entries() {
        let keys = [StorageKeys::GOOGLE_MAPS_API_KEY, StorageKeys::MAPBOX_TOKEN];
        assert_ne!(keys[0], keys[1]);
        for key in keys {
            assert!(!key.is_empty());
            assert!(!key.ends_with(EXPIRY_SUFFIX));
        }
    }
}
