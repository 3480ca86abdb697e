#![forbid(unsafe_code)]

use image::imageops::{self, FilterType};
use image::{ColorType, GrayImage, RgbImage};

use rollcall_contracts::biometric::{FaceEmbedding, FACE_EMBEDDING_DIM};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BiometricConfig {
    /// Minimum variance of the Laplacian over the grayscale conversion.
    pub blur_threshold: f64,
    /// Euclidean distance below which a live sample matches the reference.
    pub match_distance_threshold: f64,
}

impl BiometricConfig {
    pub fn mvp_v1() -> Self {
        Self {
            blur_threshold: 100.0,
            match_distance_threshold: 0.55,
        }
    }
}

/// Typed per-stage failures. Every stage fails closed; none of these is
/// ever collapsed into a generic mismatch.
#[derive(Debug, Clone, PartialEq)]
pub enum BiometricReject {
    UndecodableImage,
    UnsupportedFormat,
    ImageTooBlurry { score: f64 },
    NoFaceDetected,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BiometricOutcome {
    Match { distance: f64 },
    Mismatch { distance: f64 },
}

impl BiometricOutcome {
    pub fn distance(&self) -> f64 {
        match self {
            BiometricOutcome::Match { distance } | BiometricOutcome::Mismatch { distance } => {
                *distance
            }
        }
    }
}

/// Black-box feature extractor. Returns one embedding per detected face in
/// the extractor's own deterministic order; empty means no face. The gate
/// always uses the first entry.
pub trait FaceEmbedder {
    fn embed(&self, image: &RgbImage) -> Vec<FaceEmbedding>;
}

/// Deterministic built-in extractor: 8x8 mean-luma grid, unit-normalized.
/// Treats the whole frame as one face. Serves tests and simulation the way
/// a profile-seed fallback serves a production extractor's absence.
#[derive(Debug, Default, Clone)]
pub struct LumaGridEmbedder;

const GRID_SIDE: u32 = 8;

impl FaceEmbedder for LumaGridEmbedder {
    fn embed(&self, image: &RgbImage) -> Vec<FaceEmbedding> {
        let gray = imageops::grayscale(image);
        let small = imageops::resize(&gray, GRID_SIDE, GRID_SIDE, FilterType::Triangle);
        let mut values: Vec<f32> = small.pixels().map(|p| f32::from(p[0]) / 255.0).collect();
        debug_assert_eq!(values.len(), FACE_EMBEDDING_DIM);
        let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut values {
                *v /= norm;
            }
        }
        FaceEmbedding::new(values).into_iter().collect()
    }
}

fn channel_count(color: ColorType) -> Option<u8> {
    match color {
        ColorType::L8 | ColorType::L16 => Some(1),
        ColorType::Rgb8 | ColorType::Rgb16 | ColorType::Rgb32F => Some(3),
        ColorType::Rgba8 | ColorType::Rgba16 | ColorType::Rgba32F => Some(4),
        _ => None,
    }
}

/// Variance of the 3x3 Laplacian (4-neighbor kernel) over the interior.
/// Images too small to have an interior score 0.
pub fn laplacian_variance(gray: &GrayImage) -> f64 {
    let (w, h) = gray.dimensions();
    if w < 3 || h < 3 {
        return 0.0;
    }
    let mut sum = 0.0_f64;
    let mut sum_sq = 0.0_f64;
    let n = f64::from(w - 2) * f64::from(h - 2);
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let c = i32::from(gray.get_pixel(x, y)[0]);
            let up = i32::from(gray.get_pixel(x, y - 1)[0]);
            let down = i32::from(gray.get_pixel(x, y + 1)[0]);
            let left = i32::from(gray.get_pixel(x - 1, y)[0]);
            let right = i32::from(gray.get_pixel(x + 1, y)[0]);
            let response = f64::from(up + down + left + right - 4 * c);
            sum += response;
            sum_sq += response * response;
        }
    }
    let mean = sum / n;
    sum_sq / n - mean * mean
}

/// Decode + quality gates, shared by registration and verification:
/// raw bytes -> pixel grid (`UndecodableImage`), channel normalization to
/// RGB with 1/3/4 input channels accepted (`UnsupportedFormat`), sharpness
/// gate (`ImageTooBlurry`).
pub fn decode_sample(bytes: &[u8], config: &BiometricConfig) -> Result<RgbImage, BiometricReject> {
    let decoded =
        image::load_from_memory(bytes).map_err(|_| BiometricReject::UndecodableImage)?;
    if channel_count(decoded.color()).is_none() {
        return Err(BiometricReject::UnsupportedFormat);
    }
    let rgb = decoded.to_rgb8();
    let score = laplacian_variance(&imageops::grayscale(&rgb));
    if score < config.blur_threshold {
        return Err(BiometricReject::ImageTooBlurry { score });
    }
    Ok(rgb)
}

/// Full sample pipeline through the extractor. The first detected face in
/// the extractor's own ordering is used; zero faces fail closed.
pub fn embed_sample(
    bytes: &[u8],
    embedder: &dyn FaceEmbedder,
    config: &BiometricConfig,
) -> Result<FaceEmbedding, BiometricReject> {
    let rgb = decode_sample(bytes, config)?;
    let mut faces = embedder.embed(&rgb);
    if faces.is_empty() {
        return Err(BiometricReject::NoFaceDetected);
    }
    Ok(faces.swap_remove(0))
}

pub fn euclidean_distance(a: &FaceEmbedding, b: &FaceEmbedding) -> f64 {
    a.values()
        .iter()
        .zip(b.values())
        .map(|(x, y)| {
            let d = f64::from(*x) - f64::from(*y);
            d * d
        })
        .sum::<f64>()
        .sqrt()
}

/// Gate decision for one live sample against a stored reference. The
/// numeric distance is exposed on both outcomes for observability.
pub fn verify_sample(
    reference: &FaceEmbedding,
    bytes: &[u8],
    embedder: &dyn FaceEmbedder,
    config: &BiometricConfig,
) -> Result<BiometricOutcome, BiometricReject> {
    let live = embed_sample(bytes, embedder, config)?;
    let distance = euclidean_distance(reference, &live);
    if distance < config.match_distance_threshold {
        Ok(BiometricOutcome::Match { distance })
    } else {
        Ok(BiometricOutcome::Mismatch { distance })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, GrayAlphaImage, Rgb};
    use std::io::Cursor;

    fn png_bytes(img: DynamicImage) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, image::ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    fn checkerboard() -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(32, 32, |x, y| {
            if (x + y) % 2 == 0 {
                Rgb([255, 255, 255])
            } else {
                Rgb([0, 0, 0])
            }
        }))
    }

    fn half_split(invert: bool) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(32, 32, |x, _| {
            let white = (x < 16) != invert;
            if white {
                Rgb([255, 255, 255])
            } else {
                Rgb([0, 0, 0])
            }
        }))
    }

    struct StaticEmbedder(Vec<FaceEmbedding>);

    impl FaceEmbedder for StaticEmbedder {
        fn embed(&self, _image: &RgbImage) -> Vec<FaceEmbedding> {
            self.0.clone()
        }
    }

    fn embedding(fill: f32) -> FaceEmbedding {
        FaceEmbedding::new(vec![fill; FACE_EMBEDDING_DIM]).unwrap()
    }

    #[test]
    fn garbage_bytes_are_undecodable() {
        let config = BiometricConfig::mvp_v1();
        assert_eq!(
            decode_sample(b"definitely not an image", &config),
            Err(BiometricReject::UndecodableImage)
        );
    }

    #[test]
    fn two_channel_input_is_unsupported() {
        let config = BiometricConfig::mvp_v1();
        let la = DynamicImage::ImageLumaA8(GrayAlphaImage::from_pixel(
            32,
            32,
            image::LumaA([128, 255]),
        ));
        assert_eq!(
            decode_sample(&png_bytes(la), &config),
            Err(BiometricReject::UnsupportedFormat)
        );
    }

    #[test]
    fn single_channel_input_is_normalized_and_accepted() {
        let config = BiometricConfig::mvp_v1();
        let gray = DynamicImage::ImageLuma8(GrayImage::from_fn(32, 32, |x, y| {
            if (x + y) % 2 == 0 {
                image::Luma([255])
            } else {
                image::Luma([0])
            }
        }));
        assert!(decode_sample(&png_bytes(gray), &config).is_ok());
    }

    #[test]
    fn uniform_image_fails_the_blur_gate() {
        let config = BiometricConfig::mvp_v1();
        let flat = DynamicImage::ImageRgb8(RgbImage::from_pixel(32, 32, Rgb([127, 127, 127])));
        match decode_sample(&png_bytes(flat), &config) {
            Err(BiometricReject::ImageTooBlurry { score }) => assert!(score < 100.0),
            other => panic!("expected ImageTooBlurry, got {other:?}"),
        }
    }

    #[test]
    fn sharp_image_passes_the_blur_gate() {
        let config = BiometricConfig::mvp_v1();
        assert!(decode_sample(&png_bytes(checkerboard()), &config).is_ok());
    }

    #[test]
    fn zero_faces_fail_closed() {
        let config = BiometricConfig::mvp_v1();
        let embedder = StaticEmbedder(vec![]);
        assert_eq!(
            embed_sample(&png_bytes(checkerboard()), &embedder, &config),
            Err(BiometricReject::NoFaceDetected)
        );
    }

    #[test]
    fn first_face_is_used_when_several_are_detected() {
        let config = BiometricConfig::mvp_v1();
        let embedder = StaticEmbedder(vec![embedding(0.5), embedding(0.0)]);
        let live = embed_sample(&png_bytes(checkerboard()), &embedder, &config).unwrap();
        assert_eq!(live, embedding(0.5));
    }

    #[test]
    fn identical_embeddings_match_at_distance_zero() {
        let config = BiometricConfig::mvp_v1();
        let embedder = LumaGridEmbedder;
        let bytes = png_bytes(checkerboard());
        let reference = embed_sample(&bytes, &embedder, &config).unwrap();
        match verify_sample(&reference, &bytes, &embedder, &config).unwrap() {
            BiometricOutcome::Match { distance } => assert!(distance < 1e-6),
            other => panic!("expected Match, got {other:?}"),
        }
    }

    #[test]
    fn distant_embeddings_report_a_mismatch_with_distance() {
        let config = BiometricConfig::mvp_v1();
        let embedder = LumaGridEmbedder;
        let reference =
            embed_sample(&png_bytes(half_split(false)), &embedder, &config).unwrap();
        match verify_sample(&reference, &png_bytes(half_split(true)), &embedder, &config).unwrap()
        {
            BiometricOutcome::Mismatch { distance } => {
                assert!(distance >= 0.55, "distance was {distance}")
            }
            other => panic!("expected Mismatch, got {other:?}"),
        }
    }

    #[test]
    fn grid_embeddings_are_unit_length() {
        let embedder = LumaGridEmbedder;
        let rgb = checkerboard().to_rgb8();
        let faces = embedder.embed(&rgb);
        assert_eq!(faces.len(), 1);
        let norm: f32 = faces[0].values().iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }
}
