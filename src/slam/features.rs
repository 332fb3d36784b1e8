use std::cmp::Ordering;

use image::{imageops::FilterType, GrayImage};
use imageproc::corners::{corners_fast9, Corner};
use imageproc::suppress::local_maxima;
use nalgebra::Point2;

use crate::{
    algorithms::brief::{self, Descriptor},
    config::ExtractorConfig,
};

/// Radius of the disc used for the intensity-centroid orientation.
const ORIENTATION_RADIUS: i64 = 15;

/// Detected corner location in level-0 pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Keypoint {
    pub x: f64,
    pub y: f64,
    /// FAST corner score.
    pub response: f32,
    /// Orientation in radians.
    pub angle: f32,
    /// Pyramid level the corner was detected on.
    pub level: u8,
}

impl Keypoint {
    pub fn point(&self) -> Point2<f64> {
        Point2::new(self.x, self.y)
    }
}

/// Feature object which holds a keypoint on the image
/// and its binary descriptor
#[derive(Clone, Debug, PartialEq)]
pub struct Feature {
    pub keypoint: Keypoint,
    pub descriptor: Descriptor,
}

/// All features of one frame, ordered by decreasing detector response.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FeatureSet {
    features: Vec<Feature>,
}

impl FeatureSet {
    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Feature> {
        self.features.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Feature> {
        self.features.iter()
    }

    pub fn as_slice(&self) -> &[Feature] {
        &self.features
    }
}

impl From<Vec<Feature>> for FeatureSet {
    fn from(features: Vec<Feature>) -> Self {
        Self { features }
    }
}

impl<'a> IntoIterator for &'a FeatureSet {
    type Item = &'a Feature;
    type IntoIter = std::slice::Iter<'a, Feature>;

    fn into_iter(self) -> Self::IntoIter {
        self.features.iter()
    }
}

/// A FAST corner waiting for a descriptor.
#[derive(Clone, Copy)]
struct Candidate {
    level: usize,
    corner: Corner,
}

/// Oriented FAST + steered BRIEF over an image pyramid.
#[derive(Clone, Debug, Default)]
pub struct FeatureExtractor {
    config: ExtractorConfig,
}

impl FeatureExtractor {
    pub fn new(config: ExtractorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    /// Detects at most `max_features` features, strongest first.
    ///
    /// Blank or tiny images simply produce an empty set.
    pub fn extract(&self, image: &GrayImage) -> FeatureSet {
        let pyramid = self.pyramid(image);

        let mut candidates: Vec<Candidate> = pyramid
            .iter()
            .enumerate()
            .flat_map(|(level, (level_image, _))| {
                self.fast_corners(level_image)
                    .into_iter()
                    .map(move |corner| Candidate { level, corner })
            })
            .collect();

        candidates.sort_by(rank);
        candidates.truncate(self.config.max_features);

        // apply a guassion blur to the image for computing BRIEF descriptors,
        // that way the image is not overly sesnsitive to high frequency noise.
        let mut smoothed: Vec<Option<GrayImage>> = vec![None; pyramid.len()];
        for candidate in &candidates {
            if smoothed[candidate.level].is_none() {
                smoothed[candidate.level] = Some(imageproc::filter::gaussian_blur_f32(
                    &pyramid[candidate.level].0,
                    self.config.blur_sigma,
                ));
            }
        }

        let features = candidates
            .iter()
            .filter_map(|&Candidate { level, corner }| {
                let (level_image, scale) = &pyramid[level];
                let smoothed_level = smoothed[level].as_ref()?;
                let angle = intensity_centroid_angle(level_image, corner.x, corner.y);

                Some(Feature {
                    keypoint: Keypoint {
                        x: corner.x as f64 * scale,
                        y: corner.y as f64 * scale,
                        response: corner.score,
                        angle,
                        level: level as u8,
                    },
                    descriptor: brief::compute_descriptor(corner.x, corner.y, angle, smoothed_level),
                })
            })
            .collect::<Vec<_>>();

        tracing::trace!(
            levels = pyramid.len(),
            features = features.len(),
            "extracted features"
        );

        FeatureSet::from(features)
    }

    /// Image pyramid as `(level image, level-to-original scale)`.
    /// Levels too small to hold a full patch are left out.
    fn pyramid(&self, image: &GrayImage) -> Vec<(GrayImage, f64)> {
        let min_side = 2 * self.config.edge_margin + 1;
        let (width, height) = image.dimensions();

        let mut levels = Vec::with_capacity(self.config.pyramid_levels);
        for level in 0..self.config.pyramid_levels {
            let scale = self.config.scale_factor.powi(level as i32);
            let level_width = (width as f64 / scale).round() as u32;
            let level_height = (height as f64 / scale).round() as u32;
            if level_width < min_side || level_height < min_side {
                break;
            }

            let level_image = if level == 0 {
                image.clone()
            } else {
                image::imageops::resize(image, level_width, level_height, FilterType::Triangle)
            };
            levels.push((level_image, scale));
        }

        levels
    }

    /// Uses FAST (Features from Accelerated Segment Test)
    /// as a keypoint detector for features like corners in a grayscale image
    fn fast_corners(&self, image: &GrayImage) -> Vec<Corner> {
        let margin = self.config.edge_margin;
        let (width, height) = image.dimensions();

        let corners = corners_fast9(image, self.config.fast_threshold);
        let corners = if self.config.nms_radius > 0 {
            local_maxima(&corners, self.config.nms_radius)
        } else {
            corners
        };

        corners
            .into_iter()
            .filter(|c| c.x >= margin && c.y >= margin && c.x + margin < width && c.y + margin < height)
            .collect()
    }
}

/// Strongest response first; ties broken by level, then row, then column.
fn rank(a: &Candidate, b: &Candidate) -> Ordering {
    b.corner
        .score
        .total_cmp(&a.corner.score)
        .then(a.level.cmp(&b.level))
        .then(a.corner.y.cmp(&b.corner.y))
        .then(a.corner.x.cmp(&b.corner.x))
}

/// Orientation from the intensity centroid of a disc around the corner (as in ORB).
fn intensity_centroid_angle(image: &GrayImage, x: u32, y: u32) -> f32 {
    let (width, height) = (image.width() as i64, image.height() as i64);
    let (cx, cy) = (x as i64, y as i64);

    let mut m01 = 0i64;
    let mut m10 = 0i64;
    for dy in -ORIENTATION_RADIUS..=ORIENTATION_RADIUS {
        for dx in -ORIENTATION_RADIUS..=ORIENTATION_RADIUS {
            if dx * dx + dy * dy > ORIENTATION_RADIUS * ORIENTATION_RADIUS {
                continue;
            }
            let (px, py) = (cx + dx, cy + dy);
            if px < 0 || py < 0 || px >= width || py >= height {
                continue;
            }
            let value = image.get_pixel(px as u32, py as u32).0[0] as i64;
            m10 += dx * value;
            m01 += dy * value;
        }
    }

    (m01 as f32).atan2(m10 as f32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    /// Deterministic blocky texture with plenty of corners.
    fn textured_image(width: u32, height: u32) -> GrayImage {
        GrayImage::from_fn(width, height, |x, y| {
            let cell = (x / 12) * 31 + (y / 12) * 17;
            let hash = cell.wrapping_add(1).wrapping_mul(2_654_435_761);
            Luma([(hash >> 24) as u8])
        })
    }

    #[test]
    fn blank_image_has_no_features() {
        let extractor = FeatureExtractor::default();
        let blank = GrayImage::from_pixel(320, 240, Luma([90]));
        assert!(extractor.extract(&blank).is_empty());
    }

    #[test]
    fn empty_image_has_no_features() {
        let extractor = FeatureExtractor::default();
        assert!(extractor.extract(&GrayImage::new(0, 0)).is_empty());
        assert!(extractor.extract(&GrayImage::new(10, 10)).is_empty());
    }

    #[test]
    fn feature_count_is_bounded_and_ranked() {
        let extractor = FeatureExtractor::new(ExtractorConfig {
            max_features: 50,
            ..Default::default()
        });
        let features = extractor.extract(&textured_image(320, 240));

        assert!(!features.is_empty());
        assert!(features.len() <= 50);
        for pair in features.as_slice().windows(2) {
            assert!(pair[0].keypoint.response >= pair[1].keypoint.response);
        }
    }

    #[test]
    fn extraction_is_deterministic() {
        let extractor = FeatureExtractor::default();
        let image = textured_image(200, 160);
        assert_eq!(extractor.extract(&image), extractor.extract(&image));
    }

    #[test]
    fn keypoints_lie_inside_the_image() {
        let extractor = FeatureExtractor::default();
        let features = extractor.extract(&textured_image(256, 192));
        for feature in &features {
            assert!(feature.keypoint.x >= 0.0 && feature.keypoint.x < 256.0);
            assert!(feature.keypoint.y >= 0.0 && feature.keypoint.y < 192.0);
        }
    }

    #[test]
    fn centroid_points_towards_bright_side() {
        let image = GrayImage::from_fn(64, 64, |x, _| Luma([if x > 32 { 255 } else { 0 }]));
        let angle = intensity_centroid_angle(&image, 32, 32);
        assert!(angle.abs() < 1e-3);
    }
}
