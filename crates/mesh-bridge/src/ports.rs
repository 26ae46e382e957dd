//! TCP port allocation

use std::collections::HashSet;

/// Port Meshtastic clients expect a TCP node on
pub const DEFAULT_BASE_PORT: u16 = 4403;

/// Smallest port at or above `base` that no live bridge holds
///
/// Must be recomputed for every allocation since bridges can die at any
/// time. `None` when every port from `base` up is taken.
pub fn next_available_port(base: u16, occupied: impl IntoIterator<Item = u16>) -> Option<u16> {
    let occupied: HashSet<u16> = occupied.into_iter().collect();
    (base..=u16::MAX).find(|port| !occupied.contains(port))
}
