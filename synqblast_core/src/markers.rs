//! Per-round local bookkeeping: which rounds this player deployed in and
//! which of their reactors have already been reported as confirmed.
//!
//! Pure cache. Losing it only means a confirmation may be reported twice.

use crate::identity::Address;
use crate::ledger::ReactorId;
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoundMarker {
    pub deployed_this_round: bool,
    pub confirmed_reactors: BTreeSet<ReactorId>,
}

#[derive(Debug, Default)]
pub struct RoundMarkers {
    entries: HashMap<(Address, u32), RoundMarker>,
}

impl RoundMarkers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_deployed(&mut self, player: &Address, round: u32) {
        self.entry(player, round).deployed_this_round = true;
    }

    pub fn deployed_this_round(&self, player: &Address, round: u32) -> bool {
        self.get(player, round).is_some_and(|marker| marker.deployed_this_round)
    }

    /// Records a confirmed reactor. Returns true the first time only.
    pub fn record_confirmation(&mut self, player: &Address, round: u32, id: ReactorId) -> bool {
        self.entry(player, round).confirmed_reactors.insert(id)
    }

    pub fn get(&self, player: &Address, round: u32) -> Option<&RoundMarker> {
        self.entries.get(&(player.clone(), round))
    }

    /// Drops every marker not belonging to `round`. Returns how many were removed.
    pub fn evict_except(&mut self, round: u32) -> usize {
        let before = self.entries.len();
        self.entries.retain(|(_, marker_round), _| *marker_round == round);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn entry(&mut self, player: &Address, round: u32) -> &mut RoundMarker {
        self.entries.entry((player.clone(), round)).or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u8) -> Address {
        Address::parse(&format!("0x{:040x}", n)).unwrap()
    }

    #[test]
    fn test_confirmation_reported_once() {
        let mut markers = RoundMarkers::new();
        assert!(markers.record_confirmation(&addr(1), 3, 42));
        assert!(!markers.record_confirmation(&addr(1), 3, 42));
        assert!(markers.record_confirmation(&addr(1), 4, 42));
    }

    #[test]
    fn test_evict_keeps_current_round() {
        let mut markers = RoundMarkers::new();
        markers.mark_deployed(&addr(1), 3);
        markers.mark_deployed(&addr(2), 3);
        markers.mark_deployed(&addr(1), 4);

        assert_eq!(markers.evict_except(4), 2);
        assert!(!markers.deployed_this_round(&addr(1), 3));
        assert!(markers.deployed_this_round(&addr(1), 4));
        assert_eq!(markers.len(), 1);
    }
}
