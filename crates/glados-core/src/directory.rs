//! Read-only user and channel directories.
//!
//! Built once from the bootstrap handshake and shared by reference
//! (`Arc<Directories>`) with the router and every plugin.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

/// A user entry from the bootstrap handshake.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserInfo {
    /// Opaque user id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Whether the account is a bot.
    #[serde(default)]
    pub is_bot: bool,
}

/// A channel entry from the bootstrap handshake.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChannelInfo {
    /// Opaque channel id.
    pub id: String,
    /// Channel name without the leading `#`.
    pub name: String,
    /// Archived channels are left out of the directory.
    #[serde(default)]
    pub is_archived: bool,
    /// The workspace-wide default channel.
    #[serde(default)]
    pub is_general: bool,
}

/// Id → name lookups plus the few distinguished ids the router needs.
#[derive(Debug, Clone, Default)]
pub struct Directories {
    self_id: String,
    users: HashMap<String, String>,
    channels: HashMap<String, String>,
    bots: HashSet<String>,
    debug_channel: Option<String>,
    general_channel: Option<String>,
}

impl Directories {
    /// Builds the directories from bootstrap data.
    ///
    /// `debug_channel_name` selects the designated debug channel by name. In
    /// debug mode the debug channel also stands in for the general channel.
    pub fn build(
        self_id: impl Into<String>,
        users: &[UserInfo],
        channels: &[ChannelInfo],
        debug_channel_name: &str,
        debug: bool,
    ) -> Self {
        let self_id = self_id.into();
        let mut dirs = Self {
            self_id: self_id.clone(),
            ..Default::default()
        };

        for user in users {
            if user.is_bot {
                dirs.bots.insert(user.id.clone());
            }
            dirs.users.insert(user.id.clone(), user.name.clone());
        }
        dirs.bots.insert(self_id);

        for channel in channels.iter().filter(|c| !c.is_archived) {
            dirs.channels.insert(channel.id.clone(), channel.name.clone());
            if channel.name == debug_channel_name {
                dirs.debug_channel = Some(channel.id.clone());
            }
            if channel.is_general {
                dirs.general_channel = Some(channel.id.clone());
            }
        }

        if debug {
            dirs.general_channel.clone_from(&dirs.debug_channel);
        }

        dirs
    }

    /// The bot's own user id.
    pub fn self_id(&self) -> &str {
        &self.self_id
    }

    /// Display name for a user id.
    pub fn user_name(&self, id: &str) -> Option<&str> {
        self.users.get(id).map(String::as_str)
    }

    /// Name for a channel id.
    pub fn channel_name(&self, id: &str) -> Option<&str> {
        self.channels.get(id).map(String::as_str)
    }

    /// Reverse lookup of a channel id by name.
    pub fn channel_id(&self, name: &str) -> Option<&str> {
        self.channels
            .iter()
            .find(|(_, n)| n.as_str() == name)
            .map(|(id, _)| id.as_str())
    }

    /// Whether the id belongs to a known bot, including ourselves.
    pub fn is_bot(&self, id: &str) -> bool {
        self.bots.contains(id)
    }

    /// The designated debug channel, if it exists and is not archived.
    pub fn debug_channel(&self) -> Option<&str> {
        self.debug_channel.as_deref()
    }

    /// The general channel (the debug channel in debug mode).
    pub fn general_channel(&self) -> Option<&str> {
        self.general_channel.as_deref()
    }

    /// Iterates over `(id, name)` pairs of active channels.
    pub fn channels(&self) -> impl Iterator<Item = (&str, &str)> {
        self.channels.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Iterates over `(id, name)` pairs of known users.
    pub fn users(&self) -> impl Iterator<Item = (&str, &str)> {
        self.users.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture(debug: bool) -> Directories {
        let users = vec![
            UserInfo {
                id: "U1".into(),
                name: "chell".into(),
                is_bot: false,
            },
            UserInfo {
                id: "B1".into(),
                name: "wheatley".into(),
                is_bot: true,
            },
        ];
        let channels = vec![
            ChannelInfo {
                id: "C1".into(),
                name: "general".into(),
                is_archived: false,
                is_general: true,
            },
            ChannelInfo {
                id: "C2".into(),
                name: "aperture-science".into(),
                is_archived: false,
                is_general: false,
            },
            ChannelInfo {
                id: "C3".into(),
                name: "old".into(),
                is_archived: true,
                is_general: false,
            },
        ];
        Directories::build("USELF", &users, &channels, "aperture-science", debug)
    }

    #[test]
    fn test_archived_channels_excluded() {
        let dirs = fixture(false);
        assert_eq!(dirs.channel_name("C1"), Some("general"));
        assert_eq!(dirs.channel_name("C3"), None);
        assert_eq!(dirs.channels().count(), 2);
    }

    #[test]
    fn test_bots_include_self() {
        let dirs = fixture(false);
        assert!(dirs.is_bot("B1"));
        assert!(dirs.is_bot("USELF"));
        assert!(!dirs.is_bot("U1"));
        assert_eq!(dirs.user_name("U1"), Some("chell"));
    }

    #[test]
    fn test_general_channel_follows_debug_mode() {
        assert_eq!(fixture(false).general_channel(), Some("C1"));
        assert_eq!(fixture(true).general_channel(), Some("C2"));
        assert_eq!(fixture(true).debug_channel(), Some("C2"));
        assert_eq!(fixture(false).channel_id("aperture-science"), Some("C2"));
    }
}
