use serde::Serialize;

use crate::{seconds_between, PlaybackAction, PlaybackCommand, Timestamp};

/// The minimal state needed to know where a room's video is right now, without asking any client.
///
/// The clock never ticks on its own. Instead it remembers a position at a reference instant,
/// and whether time is flowing, so the position at any later instant can be extrapolated.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackClock {
    is_playing: bool,
    /// Position in seconds at `reference_timestamp`. Never negative.
    position_at_reference: f64,
    /// Only ever moves forward.
    reference_timestamp: Timestamp,
    last_action: PlaybackAction,
    /// Length of the content in seconds, if known
    duration: Option<f64>,
}

/// The broadcastable result of applying a command to a clock.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackSnapshot {
    pub action: PlaybackAction,
    pub is_playing: bool,
    /// The position in seconds at `server_timestamp`
    pub current_position: f64,
    pub server_timestamp: Timestamp,
}

impl PlaybackClock {
    /// A paused clock at the start of the content.
    pub fn new(now: Timestamp) -> Self {
        Self {
            is_playing: false,
            position_at_reference: 0.,
            reference_timestamp: now,
            last_action: PlaybackAction::Pause,
            duration: None,
        }
    }

    /// Rebuilds a clock from persisted fields.
    pub fn restore(
        is_playing: bool,
        position_at_reference: f64,
        reference_timestamp: Timestamp,
        last_action: PlaybackAction,
    ) -> Self {
        Self {
            is_playing,
            position_at_reference: position_at_reference.max(0.),
            reference_timestamp,
            last_action,
            duration: None,
        }
    }

    /// Bounds positions by the content duration. Ignored if the duration isn't positive.
    pub fn with_duration(mut self, duration: Option<f64>) -> Self {
        self.duration = duration.filter(|d| d.is_finite() && *d > 0.);
        self.position_at_reference = self.clamp(self.position_at_reference);
        self
    }

    /// Returns a new clock with the command applied at `now`.
    ///
    /// PLAY while playing and PAUSE while paused return the clock unchanged.
    /// If `now` is earlier than the current reference, the reference is used instead,
    /// so that the reference timestamp never moves backwards.
    pub fn apply(&self, command: PlaybackCommand, now: Timestamp) -> Self {
        let now = now.max(self.reference_timestamp);

        match command {
            PlaybackCommand::Play if self.is_playing => self.clone(),
            PlaybackCommand::Pause if !self.is_playing => self.clone(),
            PlaybackCommand::Play => Self {
                is_playing: true,
                position_at_reference: self.current_position(now),
                reference_timestamp: now,
                last_action: PlaybackAction::Play,
                ..self.clone()
            },
            PlaybackCommand::Pause => Self {
                is_playing: false,
                position_at_reference: self.current_position(now),
                reference_timestamp: now,
                last_action: PlaybackAction::Pause,
                ..self.clone()
            },
            PlaybackCommand::Seek(position) => Self {
                position_at_reference: self.clamp(position),
                reference_timestamp: now,
                last_action: PlaybackAction::Seek,
                ..self.clone()
            },
        }
    }

    /// Extrapolates the position in seconds at `now`.
    pub fn current_position(&self, now: Timestamp) -> f64 {
        if !self.is_playing {
            return self.position_at_reference;
        }

        let elapsed = seconds_between(self.reference_timestamp, now).max(0.);
        self.clamp(self.position_at_reference + elapsed)
    }

    /// Describes the clock at `now`, tagged with the action that produced it.
    pub fn snapshot(&self, action: PlaybackAction, now: Timestamp) -> PlaybackSnapshot {
        let now = now.max(self.reference_timestamp);

        PlaybackSnapshot {
            action,
            is_playing: self.is_playing,
            current_position: self.current_position(now),
            server_timestamp: now,
        }
    }

    pub fn is_playing(&self) -> bool {
        self.is_playing
    }

    pub fn position_at_reference(&self) -> f64 {
        self.position_at_reference
    }

    pub fn reference_timestamp(&self) -> Timestamp {
        self.reference_timestamp
    }

    pub fn last_action(&self) -> PlaybackAction {
        self.last_action
    }

    pub fn duration(&self) -> Option<f64> {
        self.duration
    }

    fn clamp(&self, position: f64) -> f64 {
        let position = position.max(0.);

        match self.duration {
            Some(duration) => position.min(duration),
            None => position,
        }
    }
}

#[cfg(test)]
mod test {
    use chrono::{Duration, Utc};

    use super::*;

    #[test]
    fn test_play_extrapolates_position() {
        let t0 = Utc::now();
        let clock = PlaybackClock::new(t0).apply(PlaybackCommand::Play, t0);

        assert!(clock.is_playing());
        assert_eq!(clock.current_position(t0), 0.);
        assert_eq!(clock.current_position(t0 + Duration::seconds(5)), 5.);
    }

    #[test]
    fn test_play_and_pause_are_idempotent() {
        let t0 = Utc::now();
        let playing = PlaybackClock::new(t0).apply(PlaybackCommand::Play, t0);
        let again = playing.apply(PlaybackCommand::Play, t0 + Duration::seconds(3));

        assert_eq!(playing, again, "second PLAY should not touch the clock");

        let paused = PlaybackClock::new(t0);
        let again = paused.apply(PlaybackCommand::Pause, t0 + Duration::seconds(3));

        assert_eq!(paused, again, "PAUSE while paused should not touch the clock");
    }

    #[test]
    fn test_pause_then_play_is_continuous() {
        let t0 = Utc::now();
        let t1 = t0 + Duration::seconds(7);

        let clock = PlaybackClock::new(t0).apply(PlaybackCommand::Play, t0);
        let before = clock.current_position(t1);

        let clock = clock
            .apply(PlaybackCommand::Pause, t1)
            .apply(PlaybackCommand::Play, t1);

        assert_eq!(clock.current_position(t1), before);
        assert_eq!(clock.current_position(t1 + Duration::seconds(1)), before + 1.);
    }

    #[test]
    fn test_seek_keeps_playing_state_and_clamps() {
        let t0 = Utc::now();
        let t1 = t0 + Duration::seconds(2);

        let clock = PlaybackClock::new(t0)
            .apply(PlaybackCommand::Play, t0)
            .apply(PlaybackCommand::Seek(42.), t1);

        assert!(clock.is_playing());
        assert_eq!(clock.reference_timestamp(), t1);
        assert_eq!(clock.current_position(t1), 42.);
        assert_eq!(clock.last_action(), PlaybackAction::Seek);

        let clock = clock.apply(PlaybackCommand::Seek(-10.), t1);
        assert_eq!(clock.current_position(t1), 0.);
    }

    #[test]
    fn test_seek_is_bounded_by_duration() {
        let t0 = Utc::now();
        let clock = PlaybackClock::new(t0)
            .with_duration(Some(90.))
            .apply(PlaybackCommand::Seek(120.), t0);

        assert_eq!(clock.current_position(t0), 90.);

        // Playing past the end stops at the end
        let clock = clock
            .apply(PlaybackCommand::Seek(85.), t0)
            .apply(PlaybackCommand::Play, t0);

        assert_eq!(clock.current_position(t0 + Duration::seconds(60)), 90.);
    }

    #[test]
    fn test_reference_timestamp_never_moves_backwards() {
        let t0 = Utc::now();
        let earlier = t0 - Duration::seconds(30);

        let clock = PlaybackClock::new(t0).apply(PlaybackCommand::Seek(10.), earlier);

        assert_eq!(clock.reference_timestamp(), t0);
        assert_eq!(clock.snapshot(PlaybackAction::Seek, earlier).server_timestamp, t0);
    }

    #[test]
    fn test_snapshot() {
        let t0 = Utc::now();
        let clock = PlaybackClock::new(t0).apply(PlaybackCommand::Play, t0);
        let snapshot = clock.snapshot(PlaybackAction::Play, t0 + Duration::seconds(4));

        assert_eq!(
            snapshot,
            PlaybackSnapshot {
                action: PlaybackAction::Play,
                is_playing: true,
                current_position: 4.,
                server_timestamp: t0 + Duration::seconds(4),
            }
        );
    }
}
