use img_hash::{HashAlg, HasherConfig};
use reposter_core::{FingerprintError, ImageHash};

const HASH_SIDE: u32 = 8;

/// 64-bit horizontal gradient hash (dHash), rendered as 16 hex chars.
///
/// Identical pixels always give identical hashes, whatever the container.
#[derive(Debug, Clone, Copy, Default)]
pub struct PerceptualHasher;

impl PerceptualHasher {
    pub fn new() -> Self {
        Self
    }

    pub fn hash(&self, bytes: &[u8]) -> Result<ImageHash, FingerprintError> {
        let decoded =
            img_hash::image::load_from_memory(bytes).map_err(|e| FingerprintError::Decode {
                reason: e.to_string(),
            })?;

        let hasher = HasherConfig::new()
            .hash_alg(HashAlg::Gradient)
            .hash_size(HASH_SIDE, HASH_SIDE)
            .to_hasher();
        let bits = hasher
            .hash_image(&decoded)
            .as_bytes()
            .iter()
            .fold(0u64, |bits, byte| (bits << 8) | u64::from(*byte));

        Ok(ImageHash::from_bits(bits))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    fn gradient(increasing: bool) -> DynamicImage {
        let img = RgbImage::from_fn(9, 8, |x, _| {
            let step = if increasing { x } else { 8 - x };
            let v = (step * 30) as u8;
            Rgb([v, v, v])
        });
        DynamicImage::ImageRgb8(img)
    }

    fn encode(img: &DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut buffer = Cursor::new(Vec::new());
        img.write_to(&mut buffer, format).unwrap();
        buffer.into_inner()
    }

    #[test]
    fn test_opposite_gradients_give_complementary_hashes() {
        let hasher = PerceptualHasher::new();
        let up = hasher.hash(&encode(&gradient(true), ImageFormat::Png)).unwrap();
        let down = hasher.hash(&encode(&gradient(false), ImageFormat::Png)).unwrap();

        assert_ne!(up, down);
        for hash in [&up, &down] {
            assert!(
                hash.as_str() == "ffffffffffffffff" || hash.as_str() == "0000000000000000",
                "unexpected hash {}",
                hash
            );
        }
    }

    #[test]
    fn test_hash_is_deterministic() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_fn(64, 48, |x, y| {
            Rgb([(x * 3) as u8, (y * 5) as u8, ((x * y) % 251) as u8])
        }));
        let bytes = encode(&img, ImageFormat::Png);
        let hasher = PerceptualHasher::new();

        let first = hasher.hash(&bytes).unwrap();
        let second = hasher.hash(&bytes).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.as_str().len(), 16);
    }

    #[test]
    fn test_container_does_not_matter() {
        let img = gradient(true);
        let hasher = PerceptualHasher::new();

        let png = hasher.hash(&encode(&img, ImageFormat::Png)).unwrap();
        let bmp = hasher.hash(&encode(&img, ImageFormat::Bmp)).unwrap();
        assert_eq!(png, bmp);
    }

    #[test]
    fn test_garbage_fails_to_decode() {
        let result = PerceptualHasher::new().hash(b"definitely not an image");
        assert!(matches!(result, Err(FingerprintError::Decode { .. })));

        let empty = PerceptualHasher::new().hash(&[]);
        assert!(matches!(empty, Err(FingerprintError::Decode { .. })));
    }
}
