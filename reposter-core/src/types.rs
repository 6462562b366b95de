use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Sentinel value marking a post (or a fingerprint) as permanently skippable.
pub const POISON: &str = "ERROR_POST";

/// Number of hex characters in a single image hash (64 bits).
pub const IMAGE_HASH_LEN: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Section {
    /// Front page, ranked by top-of-day. Source of reply templates.
    Hot,
    /// Most recent user submissions. Where reposts get answered.
    User,
}

impl Section {
    pub fn as_str(&self) -> &'static str {
        match self {
            Section::Hot => "hot",
            Section::User => "user",
        }
    }

    pub fn sort(&self) -> Sort {
        match self {
            Section::Hot => Sort::Top,
            Section::User => Sort::Time,
        }
    }

    pub fn window(&self) -> Window {
        Window::Day
    }

    pub fn default_poll_interval(&self) -> Duration {
        match self {
            Section::Hot => Duration::from_secs(30 * 60),
            Section::User => Duration::from_secs(60),
        }
    }

    pub fn query(&self, page: u32) -> GalleryQuery {
        GalleryQuery {
            section: *self,
            sort: self.sort(),
            window: self.window(),
            page,
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Section {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hot" | "top" => Ok(Section::Hot),
            "user" | "recent" => Ok(Section::User),
            other => Err(format!("unrecognized section: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sort {
    Top,
    Time,
}

impl Sort {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sort::Top => "top",
            Sort::Time => "time",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Window {
    Day,
}

impl Window {
    pub fn as_str(&self) -> &'static str {
        match self {
            Window::Day => "day",
        }
    }
}

/// One page request against a gallery section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GalleryQuery {
    pub section: Section,
    pub sort: Sort,
    pub window: Window,
    pub page: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    pub id: String,
    pub link: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemKind {
    SingleImage(ImageRef),
    Album { images_count: u32 },
    /// Anything the gallery returns that is neither a still image nor an album.
    Unknown { kind: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GalleryItem {
    pub id: String,
    pub title: String,
    pub kind: ItemKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment {
    pub id: u64,
    pub text: String,
    pub author: Option<String>,
}

/// Remaining API credits as last reported by the gallery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Credits {
    pub user_remaining: u32,
    pub client_remaining: u32,
    pub user_reset: Option<DateTime<Utc>>,
}

impl Credits {
    pub fn new(user_remaining: u32, client_remaining: u32) -> Self {
        Self {
            user_remaining,
            client_remaining,
            user_reset: None,
        }
    }

    /// Both counters strictly above the floor.
    pub fn above_floor(&self, floor: u32) -> bool {
        self.user_remaining > floor && self.client_remaining > floor
    }
}

/// Difference hash of a single image, rendered as lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageHash(String);

impl ImageHash {
    pub fn from_bits(bits: u64) -> Self {
        Self(format!("{:0width$x}", bits, width = IMAGE_HASH_LEN))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ImageHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Post-level fingerprint: the image hashes of a post concatenated in order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Returns `None` when no image could be hashed; an empty fingerprint
    /// would collide with every other failed post.
    pub fn from_hashes(hashes: &[ImageHash]) -> Option<Self> {
        if hashes.is_empty() {
            return None;
        }
        Some(Self(hashes.iter().map(ImageHash::as_str).collect()))
    }

    /// Parses a stored or operator-supplied fingerprint.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        let valid = !raw.is_empty()
            && raw.len() % IMAGE_HASH_LEN == 0
            && raw.chars().all(|c| c.is_ascii_hexdigit());
        valid.then(|| Self(raw.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn image_count(&self) -> usize {
        self.0.len() / IMAGE_HASH_LEN
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
