use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Kind of a guest media upload, derived from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "Image",
            MediaKind::Video => "Video",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Image" => Ok(MediaKind::Image),
            "Video" => Ok(MediaKind::Video),
            other => Err(format!("unknown media kind: {}", other)),
        }
    }
}

/// Asset kinds that own a file under an event's storage directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetKind {
    Media,
    Voice,
}

impl AssetKind {
    /// Subdirectory name under `events/{event_id}/`.
    pub fn dir_name(&self) -> &'static str {
        match self {
            AssetKind::Media => "media",
            AssetKind::Voice => "voice",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_kind_parses_its_own_output() {
        for kind in [MediaKind::Image, MediaKind::Video] {
            assert_eq!(kind.as_str().parse::<MediaKind>().unwrap(), kind);
        }
        assert!("Audio".parse::<MediaKind>().is_err());
    }
}
