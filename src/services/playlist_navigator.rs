use crate::models::{PlaybackUnit, UnitId};
use std::cmp::Ordering;

/// Episodes in watch order: season, then episode number, then id.
///
/// Units without a season sort as season 1, units without an episode number sort first
/// within their season.
#[derive(Debug, Clone, Default)]
pub struct EpisodeNavigator {
    units: Vec<PlaybackUnit>,
}

fn watch_order(a: &PlaybackUnit, b: &PlaybackUnit) -> Ordering {
    a.season_number
        .unwrap_or(1)
        .cmp(&b.season_number.unwrap_or(1))
        .then_with(|| a.episode_number.unwrap_or(0).cmp(&b.episode_number.unwrap_or(0)))
        .then_with(|| a.id.cmp(&b.id))
}

impl EpisodeNavigator {
    pub fn new(mut units: Vec<PlaybackUnit>) -> Self {
        units.sort_by(watch_order);
        Self { units }
    }

    pub fn units(&self) -> &[PlaybackUnit] {
        &self.units
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn position_of(&self, current: &UnitId) -> Option<usize> {
        self.units.iter().position(|unit| &unit.id == current)
    }

    /// The unit that follows `current`, if `current` is known and not last.
    pub fn next_after(&self, current: &UnitId) -> Option<&PlaybackUnit> {
        let index = self.position_of(current)?;
        self.units.get(index + 1)
    }

    pub fn previous_before(&self, current: &UnitId) -> Option<&PlaybackUnit> {
        let index = self.position_of(current)?;
        index.checked_sub(1).and_then(|i| self.units.get(i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(navigator: &EpisodeNavigator) -> Vec<&str> {
        navigator.units().iter().map(|u| u.id.as_str()).collect()
    }

    #[test]
    fn test_sorts_by_season_episode_then_id() {
        let navigator = EpisodeNavigator::new(vec![
            PlaybackUnit::episode("s2e1", 2, 1),
            PlaybackUnit::episode("s1e2", 1, 2),
            PlaybackUnit::episode("s1e1", 1, 1),
            PlaybackUnit::episode("b", 1, 3),
            PlaybackUnit::episode("a", 1, 3),
        ]);
        assert_eq!(ids(&navigator), vec!["s1e1", "s1e2", "a", "b", "s2e1"]);
    }

    #[test]
    fn test_missing_numbers_use_defaults() {
        let navigator = EpisodeNavigator::new(vec![
            PlaybackUnit::episode("s1e1", 1, 1),
            PlaybackUnit::new("special"),
            PlaybackUnit::episode("s0e5", 0, 5),
        ]);
        // No season means season 1; no episode number sorts before episode 1
        assert_eq!(ids(&navigator), vec!["s0e5", "special", "s1e1"]);
    }

    #[test]
    fn test_next_and_previous() {
        let navigator = EpisodeNavigator::new(vec![
            PlaybackUnit::episode("e2", 1, 2),
            PlaybackUnit::episode("e1", 1, 1),
            PlaybackUnit::episode("e3", 2, 1),
        ]);

        assert_eq!(navigator.next_after(&"e1".into()).unwrap().id.as_str(), "e2");
        assert_eq!(navigator.next_after(&"e2".into()).unwrap().id.as_str(), "e3");
        assert!(navigator.next_after(&"e3".into()).is_none());
        assert!(navigator.next_after(&"missing".into()).is_none());

        assert_eq!(navigator.previous_before(&"e3".into()).unwrap().id.as_str(), "e2");
        assert!(navigator.previous_before(&"e1".into()).is_none());
        assert_eq!(navigator.position_of(&"e3".into()), Some(2));
    }

    #[test]
    fn test_empty() {
        let navigator = EpisodeNavigator::default();
        assert!(navigator.is_empty());
        assert_eq!(navigator.len(), 0);
        assert!(navigator.next_after(&"e1".into()).is_none());
    }
}
