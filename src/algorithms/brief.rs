use image::GrayImage;
use once_cell::sync::Lazy;
use rand::{rngs::StdRng, SeedableRng};
use rand_distr::{Distribution, Normal};

/// Binary descriptor stored as packed bytes.
pub type BinaryDescriptor<const N: usize> = [u8; N];

/// Descriptor length used throughout the pipeline (256 bits, as ORB).
pub const DESCRIPTOR_SIZE: usize = 256 / u8::BITS as usize;

pub type Descriptor = BinaryDescriptor<DESCRIPTOR_SIZE>;

/// Largest offset (in either axis) of an unrotated sample point.
const SAMPLE_BOUND: f64 = 10.0;

/// Compute a steered BRIEF (Binary Robust Independent Elementary Features) descriptor
/// on a smoothed grayscale image at the target keypoint.
///
/// The sampling pattern is rotated by `angle` (radians) so that descriptors of the
/// same corner seen under in-plane rotation stay comparable.
///
/// ### CAUTION
/// const N Generic should be at most `256 / u8::BITS = 32`
pub fn compute_descriptor<const N: usize>(
    x: u32,
    y: u32,
    angle: f32,
    image: &GrayImage,
) -> BinaryDescriptor<N> {
    const BITS: usize = u8::BITS as _;
    debug_assert!(N * BITS <= BRIEF256_SAMPLES.len());

    let (sin, cos) = angle.sin_cos();
    let steer = |dx: i16, dy: i16| -> (i64, i64) {
        let (dx, dy) = (dx as f32, dy as f32);
        (
            x as i64 + (dx * cos - dy * sin).round() as i64,
            y as i64 + (dx * sin + dy * cos).round() as i64,
        )
    };

    let mut brief_descriptor = [0; N];
    for (i, byte) in brief_descriptor.iter_mut().enumerate() {
        for j in 0..BITS {
            let [p1x, p1y, p2x, p2y] = BRIEF256_SAMPLES[i * BITS + j];

            let (x1, y1) = steer(p1x, p1y);
            let (x2, y2) = steer(p2x, p2y);

            if intensity(image, x1, y1) < intensity(image, x2, y2) {
                *byte |= 1 << j;
            }
        }
    }

    brief_descriptor
}

/// Pixels outside of the image read as `0`.
/// Remember that these are Grayscale images, where pixel values are `u8`
fn intensity(image: &GrayImage, x: i64, y: i64) -> u8 {
    if x >= 0 && y >= 0 && (x as u64) < image.width() as u64 && (y as u64) < image.height() as u64 {
        image.get_pixel(x as u32, y as u32).0[0]
    } else {
        0
    }
}

/// Precomputed point-pair samples for 256 BRIEF bits.
/// The values remain consistent accross frames, because we want to achieve a similar level of entropy
/// to best match our previous encounters with points.
static BRIEF256_SAMPLES: Lazy<[[i16; 4]; 256]> = Lazy::new(|| {
    // use reproducible random numbers so that every run (and every frame) shares one pattern
    let mut rng = StdRng::seed_from_u64(42);

    // isotropic gaussian with sigma ~ patch / 5, clamped to (+-) 10 so that
    // any rotation of the pattern stays inside a 15 pixel radius
    let normal_dist: Normal<f64> =
        Normal::new(0.0, 4.0).expect("standard deviation is a finite positive constant");

    let mut sample = || {
        normal_dist
            .sample(&mut rng)
            .round()
            .clamp(-SAMPLE_BOUND, SAMPLE_BOUND) as i16
    };

    let mut samples = [[0; 4]; 256];
    for pair in samples.iter_mut() {
        *pair = [sample(), sample(), sample(), sample()];
    }

    samples
});

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn gradient_image() -> GrayImage {
        GrayImage::from_fn(64, 64, |x, y| Luma([((x * 7 + y * 13) % 251) as u8]))
    }

    #[test]
    fn descriptor_is_deterministic() {
        let image = gradient_image();
        let a: Descriptor = compute_descriptor(32, 32, 0.3, &image);
        let b: Descriptor = compute_descriptor(32, 32, 0.3, &image);
        assert_eq!(a, b);
    }

    #[test]
    fn uniform_patch_gives_zero_descriptor() {
        let image = GrayImage::from_pixel(64, 64, Luma([128]));
        let d: Descriptor = compute_descriptor(32, 32, 0.0, &image);
        assert!(d.iter().all(|&b| b == 0));
    }

    #[test]
    fn samples_stay_inside_patch() {
        for [a, b, c, d] in BRIEF256_SAMPLES.iter() {
            for v in [a, b, c, d] {
                assert!((*v as f64).abs() <= SAMPLE_BOUND);
            }
        }
    }
}
