//! Characteristic resolution
//! Matches the channel table against the catalog a link discovered.

use log::debug;

use crate::core::bluetooth::transport::ServiceCatalog;
use crate::core::bluetooth::types::{RequiredChannel, ResolvedCharacteristics};

/// Looks up every channel in `required`.
///
/// Returns the handles found (absent entries for the rest) and whether all of them resolved.
pub fn resolve<C: Clone>(
    catalog: &ServiceCatalog<C>,
    required: &[RequiredChannel],
) -> (ResolvedCharacteristics<C>, bool) {
    let mut resolved = ResolvedCharacteristics::default();

    for entry in required {
        debug!("Gathering characteristics. Searching for: {}", entry.channel);
        match catalog.get_characteristic(entry.characteristic_id) {
            Some(characteristic) => {
                debug!("Found characteristic {} for {}", entry.characteristic_id, entry.channel);
                resolved.insert(entry.channel, Some(characteristic.clone()));
            }
            None => {
                debug!("Unable to find characteristic: {}", entry.channel);
                resolved.insert(entry.channel, None);
            }
        }
    }

    let all_found = resolved.is_complete();
    (resolved, all_found)
}
