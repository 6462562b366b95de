pub mod fingerprinter;
pub mod hasher;

pub use fingerprinter::{thumbnail_url, FingerprintReport, ImageFailure, PostFingerprinter};
pub use hasher::PerceptualHasher;
