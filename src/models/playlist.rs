use super::UnitId;
use serde::{Deserialize, Serialize};

/// One playable entry in an episode playlist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackUnit {
    /// Episode id, unique within its title
    pub id: UnitId,
    #[serde(default)]
    pub season_number: Option<u32>,
    #[serde(default)]
    pub episode_number: Option<u32>,
    #[serde(default)]
    pub duration_seconds: Option<u32>,
    /// Display title for the advancing notice
    #[serde(default)]
    pub title: Option<String>,
}

impl PlaybackUnit {
    pub fn new(id: impl Into<UnitId>) -> Self {
        Self {
            id: id.into(),
            season_number: None,
            episode_number: None,
            duration_seconds: None,
            title: None,
        }
    }

    pub fn episode(id: impl Into<UnitId>, season: u32, episode: u32) -> Self {
        Self {
            season_number: Some(season),
            episode_number: Some(episode),
            ..Self::new(id)
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Short label such as `S01E02`, falling back to the title or id.
    pub fn label(&self) -> String {
        match (self.season_number, self.episode_number) {
            (Some(season), Some(episode)) => format!("S{:02}E{:02}", season, episode),
            _ => self
                .title
                .clone()
                .unwrap_or_else(|| self.id.to_string()),
        }
    }
}
