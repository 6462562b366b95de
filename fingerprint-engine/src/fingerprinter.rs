use crate::hasher::PerceptualHasher;
use imgur_client::{GalleryApi, RateLimitedClient};
use reposter_core::{
    CoreError, ErrorRecovery, Fingerprint, FingerprintError, GalleryItem, ImageHash, ImageRef,
    ItemKind,
};
use tracing::{debug, warn};
use url::Url;

pub const DEFAULT_THUMBNAIL_SIZE: char = 's';

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageFailure {
    pub image_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FingerprintReport {
    /// `None` when not a single image of the post could be hashed.
    pub fingerprint: Option<Fingerprint>,
    pub failures: Vec<ImageFailure>,
}

/// Builds the thumbnail variant of an image link by appending the size
/// suffix to the file stem, e.g. `abc.png` -> `abcs.png`.
pub fn thumbnail_url(link: &str, size: char) -> Option<String> {
    let mut url = Url::parse(link).ok()?;
    let file_name = url.path_segments()?.last()?.to_string();
    let (stem, extension) = file_name.rsplit_once('.')?;
    if stem.is_empty() {
        return None;
    }

    let thumbnail = format!("{}{}.{}", stem, size, extension);
    url.path_segments_mut().ok()?.pop().push(&thumbnail);
    Some(url.to_string())
}

/// Turns a gallery item into a post fingerprint.
#[derive(Debug, Clone)]
pub struct PostFingerprinter {
    hasher: PerceptualHasher,
    thumbnail_size: char,
}

impl PostFingerprinter {
    pub fn new(thumbnail_size: char) -> Self {
        Self {
            hasher: PerceptualHasher::new(),
            thumbnail_size,
        }
    }

    pub async fn fingerprint<A: GalleryApi>(
        &self,
        item: &GalleryItem,
        client: &mut RateLimitedClient<A>,
    ) -> Result<FingerprintReport, CoreError> {
        let images = match &item.kind {
            ItemKind::SingleImage(image) => vec![image.clone()],
            ItemKind::Album { images_count: 0 } => {
                return Err(FingerprintError::EmptyAlbum {
                    post_id: item.id.clone(),
                }
                .into());
            }
            ItemKind::Album { .. } => client.list_album_images(&item.id).await?,
            ItemKind::Unknown { kind } => {
                return Err(FingerprintError::UnknownItemKind {
                    post_id: item.id.clone(),
                    kind: kind.clone(),
                }
                .into());
            }
        };

        let mut hashes = Vec::with_capacity(images.len());
        let mut failures = Vec::new();
        for image in &images {
            match self.hash_image(image, client).await {
                Ok(hash) => hashes.push(hash),
                Err(error) if ErrorRecovery::is_post_recoverable(&error) => {
                    warn!("Skipping image {} of post {}: {}", image.id, item.id, error);
                    failures.push(ImageFailure {
                        image_id: image.id.clone(),
                        reason: error.to_string(),
                    });
                }
                Err(error) => return Err(error),
            }
        }

        let fingerprint = Fingerprint::from_hashes(&hashes);
        debug!(
            "Post {} hashed {} of {} images",
            item.id,
            hashes.len(),
            images.len()
        );
        Ok(FingerprintReport {
            fingerprint,
            failures,
        })
    }

    async fn hash_image<A: GalleryApi>(
        &self,
        image: &ImageRef,
        client: &mut RateLimitedClient<A>,
    ) -> Result<ImageHash, CoreError> {
        if let Some(thumbnail) = thumbnail_url(&image.link, self.thumbnail_size) {
            let download = client.download(&thumbnail).await?;
            if download.is_success() {
                return Ok(self.hasher.hash(&download.bytes)?);
            }
            debug!(
                "Thumbnail {} returned HTTP {}, using full image",
                thumbnail, download.status
            );
        }

        let download = client.download(&image.link).await?;
        if !download.is_success() {
            return Err(FingerprintError::Decode {
                reason: format!("{} returned HTTP {}", image.link, download.status),
            }
            .into());
        }
        Ok(self.hasher.hash(&download.bytes)?)
    }
}

impl Default for PostFingerprinter {
    fn default() -> Self {
        Self::new(DEFAULT_THUMBNAIL_SIZE)
    }
}
