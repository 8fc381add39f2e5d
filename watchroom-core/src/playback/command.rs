use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The kinds of playback control a participant can issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlaybackAction {
    Play,
    Pause,
    Seek,
}

#[derive(Debug, Error, PartialEq)]
pub enum PlaybackError {
    #[error("Unrecognized playback action \"{0}\"")]
    UnknownAction(String),
    #[error("Seeking requires a position")]
    MissingPosition,
    #[error("Position must be a finite number of seconds")]
    InvalidPosition,
}

/// A validated playback command, ready to be applied to a [crate::PlaybackClock].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlaybackCommand {
    Play,
    Pause,
    /// Seek to a position in seconds. Negative values are clamped when applied.
    Seek(f64),
}

impl PlaybackCommand {
    /// Builds a command from an action and the position that came with it, if any.
    /// The position is ignored for anything but [PlaybackAction::Seek].
    pub fn new(action: PlaybackAction, position: Option<f64>) -> Result<Self, PlaybackError> {
        match action {
            PlaybackAction::Play => Ok(Self::Play),
            PlaybackAction::Pause => Ok(Self::Pause),
            PlaybackAction::Seek => {
                let position = position.ok_or(PlaybackError::MissingPosition)?;

                if !position.is_finite() {
                    return Err(PlaybackError::InvalidPosition);
                }

                Ok(Self::Seek(position))
            }
        }
    }

    /// Same as [PlaybackCommand::new], but parses the action from its wire name.
    pub fn parse(action: &str, position: Option<f64>) -> Result<Self, PlaybackError> {
        Self::new(action.parse()?, position)
    }

    pub fn action(&self) -> PlaybackAction {
        match self {
            Self::Play => PlaybackAction::Play,
            Self::Pause => PlaybackAction::Pause,
            Self::Seek(_) => PlaybackAction::Seek,
        }
    }
}

impl FromStr for PlaybackAction {
    type Err = PlaybackError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PLAY" => Ok(Self::Play),
            "PAUSE" => Ok(Self::Pause),
            "SEEK" => Ok(Self::Seek),
            _ => Err(PlaybackError::UnknownAction(s.to_string())),
        }
    }
}

impl Display for PlaybackAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Play => "PLAY",
            Self::Pause => "PAUSE",
            Self::Seek => "SEEK",
        };

        f.write_str(name)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse_actions() {
        assert_eq!(PlaybackCommand::parse("play", None), Ok(PlaybackCommand::Play));
        assert_eq!(PlaybackCommand::parse("PAUSE", Some(3.)), Ok(PlaybackCommand::Pause));
        assert_eq!(
            PlaybackCommand::parse(" Seek ", Some(12.5)),
            Ok(PlaybackCommand::Seek(12.5))
        );
    }

    #[test]
    fn test_invalid_commands() {
        assert_eq!(
            PlaybackCommand::parse("rewind", None),
            Err(PlaybackError::UnknownAction("rewind".to_string()))
        );
        assert_eq!(
            PlaybackCommand::parse("SEEK", None),
            Err(PlaybackError::MissingPosition)
        );
        assert_eq!(
            PlaybackCommand::parse("SEEK", Some(f64::NAN)),
            Err(PlaybackError::InvalidPosition)
        );
    }
}
