use super::{ContentId, SeasonId, UnitId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The key under which watch progress is tracked: a title plus an optional episode.
///
/// `season_id` rides along for display and episode-list filtering. It never takes part in
/// persistence: two identities with the same content and unit address the same record even
/// when their seasons disagree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentIdentity {
    pub content_id: ContentId,
    pub unit_id: Option<UnitId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub season_id: Option<SeasonId>,
}

impl ContentIdentity {
    /// Identity for a movie, or for a series as a whole.
    pub fn title(content_id: impl Into<ContentId>) -> Self {
        Self {
            content_id: content_id.into(),
            unit_id: None,
            season_id: None,
        }
    }

    /// Identity for a specific episode.
    pub fn episode(content_id: impl Into<ContentId>, unit_id: impl Into<UnitId>) -> Self {
        Self {
            content_id: content_id.into(),
            unit_id: Some(unit_id.into()),
            season_id: None,
        }
    }

    pub fn with_season(mut self, season_id: impl Into<SeasonId>) -> Self {
        self.season_id = Some(season_id.into());
        self
    }

    /// Same title, different episode. The season is replaced, not inherited.
    pub fn for_unit(&self, unit_id: UnitId, season_id: Option<SeasonId>) -> Self {
        Self {
            content_id: self.content_id.clone(),
            unit_id: Some(unit_id),
            season_id,
        }
    }

    pub fn is_movie(&self) -> bool {
        self.unit_id.is_none()
    }

    /// The persistence key.
    pub fn key(&self) -> (&ContentId, Option<&UnitId>) {
        (&self.content_id, self.unit_id.as_ref())
    }
}

impl PartialEq for ContentIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for ContentIdentity {}

impl fmt::Display for ContentIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.unit_id {
            Some(unit) => write!(f, "{}/{}", self.content_id, unit),
            None => write!(f, "{}", self.content_id),
        }
    }
}
