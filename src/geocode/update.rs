use tracing::{error, info};

use super::{Geocoder, NO_ADDRESS};
use crate::records::RecordStore;

/// Fill in place names for every memorial that has coordinates but no location.
///
/// All lookups happen before anything is written, so a geocoder failure leaves
/// the store untouched. Returns the user-facing status message.
pub async fn update_locations(store: &dyn RecordStore, geocoder: &dyn Geocoder) -> String {
    let pending = match store.memorials_missing_location().await {
        Ok(pending) => pending,
        Err(e) => {
            error!(error = %e, "failed to list memorials without location");
            return format!("error: {e}");
        }
    };

    let mut updates = Vec::with_capacity(pending.len());
    for memorial in &pending {
        let (Some(lat), Some(lon)) = (memorial.latitude, memorial.longitude) else {
            continue;
        };
        match geocoder.reverse(lat, lon).await {
            Ok(place) => {
                let place = place
                    .filter(|p| !p.trim().is_empty())
                    .unwrap_or_else(|| NO_ADDRESS.to_string());
                info!(memorial_id = memorial.memorial_id, location = %place, "geocoded");
                updates.push((memorial.memorial_id, place));
            }
            Err(e) => {
                error!(memorial_id = memorial.memorial_id, error = %e, "geocoding failed; nothing written");
                return format!("error: {e}");
            }
        }
    }

    match store.set_locations(updates).await {
        Ok(count) => {
            info!(updated = count, "location update complete");
            format!("updated {count} entries")
        }
        Err(e) => {
            error!(error = %e, "failed to write locations");
            format!("error: {e}")
        }
    }
}
