use fingerprint_engine::ImageFailure;
use reposter_core::{Fingerprint, GalleryItem};
use std::fmt;

/// Working state for one gallery item during a single orchestration pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Post {
    pub id: String,
    pub title: String,
    pub fingerprint: Option<Fingerprint>,
    pub top_comment: Option<String>,
    pub failures: Vec<ImageFailure>,
}

impl Post {
    pub fn new(item: &GalleryItem) -> Self {
        Self {
            id: item.id.clone(),
            title: item.title.clone(),
            fingerprint: None,
            top_comment: None,
            failures: Vec::new(),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.fingerprint.is_none()
    }

    pub fn image_count(&self) -> usize {
        self.fingerprint.as_ref().map_or(0, Fingerprint::image_count)
    }
}

impl fmt::Display for Post {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} images", self.title, self.image_count())
    }
}
