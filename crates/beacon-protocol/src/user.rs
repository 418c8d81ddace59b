//! Presence records exchanged between tiers.
//!
//! A [`SpaceUser`] is the full record of one participant in one space.
//! A [`PartialSpaceUser`] carries an update: every field except `id` is
//! optional, and an absent field means "leave unchanged".

use serde::{Deserialize, Serialize};

/// Identifier of a user, unique within a space.
pub type UserId = u32;

/// Availability status shown next to a participant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AvailabilityStatus {
    #[default]
    Online,
    Silent,
    Away,
    Jitsi,
    Bbb,
    DenyProposals,
    Speaker,
    Busy,
    DoNotDisturb,
    BackInAMoment,
}

/// One layer of a participant's avatar.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterLayer {
    /// Layer name.
    pub name: String,
    /// Texture URL, if the layer is not a built-in one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// A presence record for one participant within one space.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SpaceUser {
    /// Identifier, never changes after creation.
    pub id: UserId,
    /// Stable external identifier.
    pub uuid: String,
    pub name: String,
    pub tags: Vec<String>,
    pub play_uri: String,
    pub color: String,
    pub character_layers: Vec<CharacterLayer>,
    pub is_logged: bool,
    pub availability_status: AvailabilityStatus,
    pub room_name: String,
    pub visit_card_url: String,
    pub screen_sharing: bool,
    pub microphone_state: bool,
    pub camera_state: bool,
    pub megaphone_state: bool,
    pub jitsi_participant_id: String,
}

/// A field-level update of a [`SpaceUser`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PartialSpaceUser {
    pub id: UserId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub play_uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub character_layers: Option<Vec<CharacterLayer>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_logged: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub availability_status: Option<AvailabilityStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visit_card_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screen_sharing: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub microphone_state: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub camera_state: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub megaphone_state: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jitsi_participant_id: Option<String>,
}

impl SpaceUser {
    /// Create a user with the given id and name, every other field defaulted.
    #[must_use]
    pub fn new(id: UserId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            ..Self::default()
        }
    }

    /// Merge a partial update into this record.
    ///
    /// Absent fields, empty strings and empty lists leave the current value
    /// untouched. Booleans and the availability status overwrite whenever
    /// they are present. The `id` is never modified.
    ///
    /// Returns `true` if the name was replaced.
    pub fn apply(&mut self, update: &PartialSpaceUser) -> bool {
        merge_string(&mut self.uuid, &update.uuid);
        let renamed = merge_string(&mut self.name, &update.name);
        merge_list(&mut self.tags, &update.tags);
        merge_string(&mut self.play_uri, &update.play_uri);
        merge_string(&mut self.color, &update.color);
        merge_list(&mut self.character_layers, &update.character_layers);
        merge_value(&mut self.is_logged, update.is_logged);
        merge_value(&mut self.availability_status, update.availability_status);
        merge_string(&mut self.room_name, &update.room_name);
        merge_string(&mut self.visit_card_url, &update.visit_card_url);
        merge_value(&mut self.screen_sharing, update.screen_sharing);
        merge_value(&mut self.microphone_state, update.microphone_state);
        merge_value(&mut self.camera_state, update.camera_state);
        merge_value(&mut self.megaphone_state, update.megaphone_state);
        merge_string(&mut self.jitsi_participant_id, &update.jitsi_participant_id);
        renamed
    }
}

impl PartialSpaceUser {
    /// Create an update that changes nothing on user `id`.
    #[must_use]
    pub fn new(id: UserId) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    /// Set the name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the tags.
    #[must_use]
    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = Some(tags);
        self
    }

    /// Set the media states. `None` leaves a state unchanged.
    #[must_use]
    pub fn with_media(
        mut self,
        screen_sharing: Option<bool>,
        microphone: Option<bool>,
        camera: Option<bool>,
    ) -> Self {
        self.screen_sharing = screen_sharing;
        self.microphone_state = microphone;
        self.camera_state = camera;
        self
    }

    /// Set the megaphone state.
    #[must_use]
    pub fn with_megaphone(mut self, on: bool) -> Self {
        self.megaphone_state = Some(on);
        self
    }

    /// Set the availability status.
    #[must_use]
    pub fn with_status(mut self, status: AvailabilityStatus) -> Self {
        self.availability_status = Some(status);
        self
    }
}

fn merge_string(field: &mut String, update: &Option<String>) -> bool {
    match update {
        Some(value) if !value.is_empty() => {
            field.clone_from(value);
            true
        }
        _ => false,
    }
}

fn merge_list<T: Clone>(field: &mut Vec<T>, update: &Option<Vec<T>>) {
    if let Some(values) = update {
        if !values.is_empty() {
            field.clone_from(values);
        }
    }
}

fn merge_value<T: Copy>(field: &mut T, update: Option<T>) {
    if let Some(value) = update {
        *field = value;
    }
}
