//! Deterministic test-time augmentation.
//!
//! Quasi-random transforms come from a Halton low-discrepancy sequence, so a
//! given configuration always yields the same set of transforms and they
//! cover the augmentation ranges more evenly than random sampling would.
//!
//! ## Example
//!
//! ```rust,ignore
//! use model_eval::tta::{AugmentationParams, build_quasirandom_transforms};
//!
//! let params = AugmentationParams {
//!     rotation_range: (-10.0, 10.0),
//!     do_flip: true,
//!     ..AugmentationParams::default()
//! };
//! let (transforms, color_vecs) = build_quasirandom_transforms(8, 0.1, &params);
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};

use crate::error::{Error, Result};

/// Halton bases, one prime per dimension.
const HALTON_PRIMES: [u64; 10] = [2, 3, 5, 7, 11, 13, 17, 19, 23, 29];

/// Whether zoom may differ between the x and y axes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AllowStretch {
    /// `false`: isotropic zoom. `true`: x and y zoom drawn independently.
    Enabled(bool),
    /// Maximum stretch ratio between the axes.
    Ratio(f64),
}

impl Default for AllowStretch {
    fn default() -> Self {
        Self::Enabled(false)
    }
}

/// Augmentation ranges for quasi-random TTA.
///
/// Angles are in degrees, translation in pixels. The defaults describe the
/// identity transform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AugmentationParams {
    /// Zoom factors, sampled log-uniformly.
    pub zoom_range: (f64, f64),
    /// Rotation in degrees.
    pub rotation_range: (f64, f64),
    /// Shear in degrees.
    pub shear_range: (f64, f64),
    /// Translation in pixels, per axis.
    pub translation_range: (f64, f64),
    /// Mirror about half of the transforms.
    pub do_flip: bool,
    /// Anisotropic zoom.
    pub allow_stretch: AllowStretch,
    /// Leading Halton points to drop.
    pub skip: usize,
}

impl Default for AugmentationParams {
    fn default() -> Self {
        Self {
            zoom_range: (1.0, 1.0),
            rotation_range: (0.0, 0.0),
            shear_range: (0.0, 0.0),
            translation_range: (0.0, 0.0),
            do_flip: false,
            allow_stretch: AllowStretch::default(),
            skip: 0,
        }
    }
}

/// Prediction-time configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictionConfig {
    /// Ranges for quasi-random TTA.
    pub aug_params: AugmentationParams,
}

impl PredictionConfig {
    /// Load from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// A 2-D affine transform in homogeneous coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AffineTransform {
    matrix: [[f64; 3]; 3],
}

impl AffineTransform {
    /// The transform that maps every point to itself.
    #[must_use]
    pub fn identity() -> Self {
        Self {
            matrix: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
        }
    }

    /// Pure translation by `(tx, ty)`.
    #[must_use]
    pub fn translation(tx: f64, ty: f64) -> Self {
        Self {
            matrix: [[1.0, 0.0, tx], [0.0, 1.0, ty], [0.0, 0.0, 1.0]],
        }
    }

    /// Transform with the given homogeneous matrix.
    #[must_use]
    pub fn from_matrix(matrix: [[f64; 3]; 3]) -> Self {
        Self { matrix }
    }

    /// Homogeneous 3x3 matrix, row major.
    #[must_use]
    pub fn matrix(&self) -> &[[f64; 3]; 3] {
        &self.matrix
    }

    /// Map the point `(x, y)`.
    #[must_use]
    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        let m = &self.matrix;
        (
            m[0][0] * x + m[0][1] * y + m[0][2],
            m[1][0] * x + m[1][1] * y + m[1][2],
        )
    }

    /// `self` followed by `next`.
    #[must_use]
    pub fn then(&self, next: &Self) -> Self {
        let (a, b) = (&next.matrix, &self.matrix);
        let mut out = [[0.0; 3]; 3];
        for (i, row) in out.iter_mut().enumerate() {
            for (j, cell) in row.iter_mut().enumerate() {
                *cell = (0..3).map(|k| a[i][k] * b[k][j]).sum();
            }
        }
        Self { matrix: out }
    }

    /// The same transform applied about the center of a `width` x `height`
    /// image instead of its origin.
    #[must_use]
    pub fn centered(&self, width: usize, height: usize) -> Self {
        let (cx, cy) = (width as f64 / 2.0 - 0.5, height as f64 / 2.0 - 0.5);
        Self::translation(-cx, -cy)
            .then(self)
            .then(&Self::translation(cx, cy))
    }

    /// Whether this is exactly [`identity`](Self::identity).
    #[must_use]
    pub fn is_identity(&self) -> bool {
        *self == Self::identity()
    }
}

impl Default for AffineTransform {
    fn default() -> Self {
        Self::identity()
    }
}

/// Affine transform for one set of augmentation parameters.
///
/// `zoom` is `(x, y)`; the image is scaled by its inverse. Flipping is a
/// 180 degree rotation combined with a 180 degree shear.
#[must_use]
pub fn build_augmentation_transform(
    zoom: (f64, f64),
    rotation: f64,
    shear: f64,
    translation: (f64, f64),
    flip: bool,
) -> AffineTransform {
    let (rotation, shear) = if flip {
        (rotation + 180.0, shear + 180.0)
    } else {
        (rotation, shear)
    };
    let r = rotation.to_radians();
    let s = shear.to_radians();
    let (sx, sy) = (1.0 / zoom.0, 1.0 / zoom.1);

    AffineTransform::from_matrix([
        [sx * r.cos(), -sy * (r + s).sin(), translation.0],
        [sx * r.sin(), sy * (r + s).cos(), translation.1],
        [0.0, 0.0, 1.0],
    ])
}

/// Van der Corput radical inverse of `index` in `base`.
fn radical_inverse(mut index: u64, base: u64) -> f64 {
    let inv_base = 1.0 / base as f64;
    let mut factor = inv_base;
    let mut value = 0.0;
    while index > 0 {
        value += (index % base) as f64 * factor;
        index /= base;
        factor *= inv_base;
    }
    value
}

/// `n` points of the 10-dimensional Halton sequence, starting at index
/// `skip + 1`. Every coordinate lies strictly inside `(0, 1)`.
#[must_use]
pub fn halton_sequence(n: usize, skip: usize) -> Vec<[f64; 10]> {
    (skip + 1..=skip + n)
        .map(|index| HALTON_PRIMES.map(|base| radical_inverse(index as u64, base)))
        .collect()
}

fn lerp(range: (f64, f64), u: f64) -> f64 {
    range.0 + u * (range.1 - range.0)
}

/// Generate `n` deterministic (transform, color vector) pairs.
///
/// Color vectors are standard normal quantiles (via `statrs`) of the last
/// three Halton dimensions, scaled by `color_sigma`.
pub fn build_quasirandom_transforms(
    n: usize,
    color_sigma: f64,
    params: &AugmentationParams,
) -> (Vec<AffineTransform>, Vec<[f32; 3]>) {
    let log_zoom_range = (params.zoom_range.0.ln(), params.zoom_range.1.ln());
    let normal = Normal::standard();

    halton_sequence(n, params.skip)
        .into_iter()
        .map(|u| {
            let translation = (
                lerp(params.translation_range, u[0]),
                lerp(params.translation_range, u[1]),
            );
            let rotation = lerp(params.rotation_range, u[2]);
            let shear = lerp(params.shear_range, u[3]);
            let zoom = lerp(log_zoom_range, u[4]).exp();
            let zoom = match params.allow_stretch {
                AllowStretch::Enabled(false) => (zoom, zoom),
                AllowStretch::Enabled(true) => (zoom, lerp(log_zoom_range, u[5]).exp()),
                AllowStretch::Ratio(ratio) => {
                    let log_ratio = ratio.ln();
                    let stretch = lerp((-log_ratio, log_ratio), u[5]).exp();
                    (zoom * stretch, zoom / stretch)
                }
            };
            let flip = params.do_flip && u[6] > 0.5;

            let transform = build_augmentation_transform(zoom, rotation, shear, translation, flip);
            let color_vec =
                [u[7], u[8], u[9]].map(|v| (normal.inverse_cdf(v) * color_sigma) as f32);
            (transform, color_vec)
        })
        .unzip()
}

/// A square crop region, in pixels, optionally mirrored horizontally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropBox {
    /// First row.
    pub top: usize,
    /// First column.
    pub left: usize,
    /// One past the last row.
    pub bottom: usize,
    /// One past the last column.
    pub right: usize,
    /// Flip the crop horizontally.
    pub mirror: bool,
}

/// The 10-crop layout: four corners and the center, then the same five
/// boxes mirrored.
pub fn ten_crop_boxes(crop_size: usize, im_size: usize) -> Result<Vec<CropBox>> {
    if crop_size == 0 || crop_size > im_size {
        return Err(Error::Config(format!(
            "crop size {crop_size} must be in 1..={im_size}"
        )));
    }

    let far = im_size - crop_size;
    let center = far / 2;
    let origins = [(0, 0), (0, far), (far, 0), (far, far), (center, center)];

    Ok([false, true]
        .into_iter()
        .flat_map(|mirror| {
            origins.into_iter().map(move |(top, left)| CropBox {
                top,
                left,
                bottom: top + crop_size,
                right: left + crop_size,
                mirror,
            })
        })
        .collect())
}

/// Fail if `params` names anything outside `allowed`.
///
/// `context` prefixes the error message.
pub fn verify_args(params: &BTreeMap<String, f64>, allowed: &[&str], context: &str) -> Result<()> {
    let unknown: Vec<String> = params
        .keys()
        .filter(|key| !allowed.contains(&key.as_str()))
        .cloned()
        .collect();
    if unknown.is_empty() {
        return Ok(());
    }
    Err(Error::UnknownParams {
        context: context.to_string(),
        unknown,
        allowed: allowed.iter().map(|s| (*s).to_string()).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_radical_inverse() {
        assert_eq!(radical_inverse(1, 2), 0.5);
        assert_eq!(radical_inverse(2, 2), 0.25);
        assert_eq!(radical_inverse(3, 2), 0.75);
        assert!(close(radical_inverse(1, 3), 1.0 / 3.0));
        assert!(close(radical_inverse(5, 3), 2.0 / 3.0 + 1.0 / 9.0));
    }

    #[test]
    fn test_halton_skip() {
        let full = halton_sequence(5, 0);
        let skipped = halton_sequence(3, 2);
        assert_eq!(&full[2..], &skipped[..]);
        assert!(full.iter().flatten().all(|&v| v > 0.0 && v < 1.0));
    }

    #[test]
    fn test_identity_params_give_identity() {
        let (transforms, colors) =
            build_quasirandom_transforms(4, 0.0, &AugmentationParams::default());
        assert_eq!(transforms.len(), 4);
        assert!(transforms.iter().all(AffineTransform::is_identity));
        assert!(colors.iter().flatten().all(|&c| c == 0.0));
    }

    #[test]
    fn test_transforms_are_deterministic() {
        let params = AugmentationParams {
            zoom_range: (0.9, 1.1),
            rotation_range: (-30.0, 30.0),
            translation_range: (-5.0, 5.0),
            do_flip: true,
            ..AugmentationParams::default()
        };
        let a = build_quasirandom_transforms(6, 0.2, &params);
        let b = build_quasirandom_transforms(6, 0.2, &params);
        assert_eq!(a, b);
        assert!(a.0.iter().any(|t| !t.is_identity()));
        assert!(a.1.iter().flatten().any(|&c| c != 0.0));
    }

    #[test]
    fn test_stretch_ratio_keeps_area() {
        let params = AugmentationParams {
            allow_stretch: AllowStretch::Ratio(1.5),
            ..AugmentationParams::default()
        };
        let (transforms, _) = build_quasirandom_transforms(5, 0.0, &params);
        for t in &transforms {
            let m = t.matrix();
            let det = m[0][0] * m[1][1] - m[0][1] * m[1][0];
            assert!(close(det, 1.0));
        }
        assert!(transforms.iter().any(|t| !close(t.matrix()[0][0], t.matrix()[1][1])));
    }

    #[test]
    fn test_flip_mirrors_x() {
        let t = build_augmentation_transform((1.0, 1.0), 0.0, 0.0, (0.0, 0.0), true);
        let (x, y) = t.apply(3.0, 2.0);
        assert!(close(x, -3.0));
        assert!(close(y, 2.0));
    }

    #[test]
    fn test_zoom_scales_by_inverse() {
        let t = build_augmentation_transform((2.0, 4.0), 0.0, 0.0, (1.0, -1.0), false);
        let (x, y) = t.apply(4.0, 4.0);
        assert!(close(x, 3.0));
        assert!(close(y, 0.0));
    }

    #[test]
    fn test_centered_rotation_fixes_center() {
        let t = build_augmentation_transform((1.0, 1.0), 90.0, 0.0, (0.0, 0.0), false)
            .centered(11, 11);
        let (x, y) = t.apply(5.0, 5.0);
        assert!(close(x, 5.0));
        assert!(close(y, 5.0));
    }

    #[test]
    fn test_color_vecs_are_normal_quantiles() {
        let sigma = 0.3;
        let (_, colors) = build_quasirandom_transforms(2, sigma, &AugmentationParams::default());
        let points = halton_sequence(2, 0);
        let normal = Normal::standard();
        for (color, u) in colors.iter().zip(&points) {
            for (c, v) in color.iter().zip(&u[7..]) {
                let expected = (normal.inverse_cdf(*v) * sigma) as f32;
                assert_eq!(*c, expected);
            }
        }
        // First Halton point sits at 1/19, 1/23, 1/29: all below the median.
        assert!(colors[0].iter().all(|&c| c < 0.0));
        assert!((normal.inverse_cdf(0.975) - 1.959964).abs() < 1e-6);
    }

    #[test]
    fn test_ten_crop_layout() {
        let boxes = ten_crop_boxes(224, 256).unwrap();
        assert_eq!(boxes.len(), 10);
        let origins: Vec<_> = boxes[..5].iter().map(|b| (b.top, b.left)).collect();
        assert_eq!(origins, vec![(0, 0), (0, 32), (32, 0), (32, 32), (16, 16)]);
        assert!(boxes[..5].iter().all(|b| !b.mirror));
        assert!(boxes[5..].iter().all(|b| b.mirror));
        assert!(boxes.iter().all(|b| b.bottom - b.top == 224 && b.right - b.left == 224));
        assert_eq!(boxes[9].top, boxes[4].top);
    }

    #[test]
    fn test_ten_crop_too_large() {
        assert!(matches!(ten_crop_boxes(300, 256), Err(Error::Config(_))));
    }

    #[test]
    fn test_verify_args() {
        let mut params = BTreeMap::new();
        params.insert("sigma".to_string(), 0.5);
        assert!(verify_args(&params, &["sigma"], "ctx").is_ok());

        params.insert("hue".to_string(), 0.1);
        let err = verify_args(&params, &["sigma"], "standardizer:").unwrap_err();
        match &err {
            Error::UnknownParams { unknown, .. } => assert_eq!(unknown, &vec!["hue".to_string()]),
            other => panic!("unexpected {other:?}"),
        }
        assert!(err.to_string().contains("hue"));
    }

    #[test]
    fn test_config_json() {
        let json = r#"{"aug_params": {"rotation_range": [-10, 10], "allow_stretch": 1.3, "do_flip": true}}"#;
        let config: PredictionConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.aug_params.rotation_range, (-10.0, 10.0));
        assert_eq!(config.aug_params.allow_stretch, AllowStretch::Ratio(1.3));
        assert_eq!(config.aug_params.zoom_range, (1.0, 1.0));

        let json = r#"{"aug_params": {"allow_stretch": true}}"#;
        let config: PredictionConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.aug_params.allow_stretch, AllowStretch::Enabled(true));
    }
}
