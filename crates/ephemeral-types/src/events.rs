//! Presence-change notifications consumed by the reducer

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Event metadata used for log correlation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventMetadata {
    /// Unique event ID
    pub event_id: Uuid,
    /// Time the notification was received
    pub timestamp: DateTime<Utc>,
}

impl EventMetadata {
    pub fn new() -> Self {
        Self {
            event_id: Uuid::new_v4(),
            timestamp: Utc::now(),
        }
    }
}

impl Default for EventMetadata {
    fn default() -> Self {
        Self::new()
    }
}

/// A member's voice channel changed (joined, left, moved, or a mute/deafen
/// update that kept the channel).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VoiceStateChange {
    pub metadata: EventMetadata,
    pub user_id: u64,
    pub guild_id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_channel_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_channel_id: Option<u64>,
}

/// Shape of a voice state change
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VoiceTransition {
    Joined,
    Left,
    Moved,
    /// Same channel before and after (mute, deafen, stream toggles).
    Unchanged,
}

impl VoiceStateChange {
    pub fn new(
        user_id: u64,
        guild_id: u64,
        old_channel_id: Option<u64>,
        new_channel_id: Option<u64>,
    ) -> Self {
        Self {
            metadata: EventMetadata::new(),
            user_id,
            guild_id,
            old_channel_id,
            new_channel_id,
        }
    }

    pub fn transition(&self) -> VoiceTransition {
        match (self.old_channel_id, self.new_channel_id) {
            (None, Some(_)) => VoiceTransition::Joined,
            (Some(_), None) => VoiceTransition::Left,
            (Some(old), Some(new)) if old != new => VoiceTransition::Moved,
            _ => VoiceTransition::Unchanged,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_kinds() {
        assert_eq!(
            VoiceStateChange::new(1, 2, None, Some(3)).transition(),
            VoiceTransition::Joined
        );
        assert_eq!(
            VoiceStateChange::new(1, 2, Some(3), None).transition(),
            VoiceTransition::Left
        );
        assert_eq!(
            VoiceStateChange::new(1, 2, Some(3), Some(4)).transition(),
            VoiceTransition::Moved
        );
        assert_eq!(
            VoiceStateChange::new(1, 2, Some(3), Some(3)).transition(),
            VoiceTransition::Unchanged
        );
        assert_eq!(
            VoiceStateChange::new(1, 2, None, None).transition(),
            VoiceTransition::Unchanged
        );
    }

    #[test]
    fn test_channels_omitted_when_none() {
        let change = VoiceStateChange::new(1, 2, None, Some(3));
        let json = serde_json::to_string(&change).unwrap();
        assert!(!json.contains("old_channel_id"));
        assert!(json.contains("\"new_channel_id\":3"));
    }

    #[test]
    fn test_metadata_ids_unique() {
        let a = EventMetadata::new();
        let b = EventMetadata::new();
        assert_ne!(a.event_id, b.event_id);
    }
}
