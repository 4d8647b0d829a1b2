//! Image preparation for the pretrained classifier.
//!
//! The default network expects `[batch, 299, 299, channels]` float input in
//! `[-1, 1]`. [`preprocess_image`] takes raw `[0, 255]` pixels, resizes them
//! bilinearly, and rescales with `(x - 128) / 128`.

use imgref::ImgVec;
use ndarray::{Array4, ArrayView4, Ix4};
use rgb::RGB8;

use crate::classifier::INCEPTION_DEFAULT_IMAGE_SIZE;
use crate::error::{Error, Result};
use crate::tensor::Tensor;

/// Prepare a single image (rank 3) or a batch (rank 4) for evaluation.
///
/// Integer pixels are converted to `f32`. The result is always a
/// [`Tensor::Float32`] with the same rank as the input.
pub fn preprocess_image(images: &Tensor, height: usize, width: usize) -> Result<Tensor> {
    let is_single = match images.ndim() {
        3 => true,
        4 => false,
        _ => {
            return Err(Error::shape(
                "images",
                "rank 3 (single image) or rank 4 (batch)",
                images.shape(),
            ));
        }
    };

    let mut pixels = images.to_f32();
    if is_single {
        pixels.insert_axis_inplace(ndarray::Axis(0));
    }
    let batch = pixels.into_dimensionality::<Ix4>()?;

    let mut resized = resize_bilinear(batch.view(), height, width);
    resized.mapv_inplace(|v| (v - 128.0) / 128.0);

    let mut out = resized.into_dyn();
    if is_single {
        out.index_axis_inplace(ndarray::Axis(0), 0);
    }
    Ok(Tensor::Float32(out))
}

/// [`preprocess_image`] at the default network's input size.
pub fn preprocess_for_inception(images: &Tensor) -> Result<Tensor> {
    preprocess_image(
        images,
        INCEPTION_DEFAULT_IMAGE_SIZE,
        INCEPTION_DEFAULT_IMAGE_SIZE,
    )
}

/// Bilinear resize of an NHWC batch.
///
/// Source coordinates are `dst * in / out` with the last row and column
/// clamped, so corners are not aligned.
#[must_use]
pub fn resize_bilinear(images: ArrayView4<'_, f32>, height: usize, width: usize) -> Array4<f32> {
    let (n, in_h, in_w, channels) = images.dim();
    let mut out = Array4::<f32>::zeros((n, height, width, channels));
    if in_h == 0 || in_w == 0 {
        return out;
    }

    let y_scale = in_h as f32 / height as f32;
    let x_scale = in_w as f32 / width as f32;

    for y in 0..height {
        let in_y = y as f32 * y_scale;
        let top = in_y.floor() as usize;
        let bottom = (top + 1).min(in_h - 1);
        let dy = in_y - top as f32;

        for x in 0..width {
            let in_x = x as f32 * x_scale;
            let left = in_x.floor() as usize;
            let right = (left + 1).min(in_w - 1);
            let dx = in_x - left as f32;

            for b in 0..n {
                for c in 0..channels {
                    let tl = images[[b, top, left, c]];
                    let tr = images[[b, top, right, c]];
                    let bl = images[[b, bottom, left, c]];
                    let br = images[[b, bottom, right, c]];
                    let upper = tl + (tr - tl) * dx;
                    let lower = bl + (br - bl) * dx;
                    out[[b, y, x, c]] = upper + (lower - upper) * dy;
                }
            }
        }
    }

    out
}

/// Stack RGB8 images into a `[batch, height, width, 3]` uint8 tensor.
///
/// All images must share dimensions.
pub fn rgb8_batch(images: &[ImgVec<RGB8>]) -> Result<Tensor> {
    let Some(first) = images.first() else {
        return Err(Error::shape("images", "at least one image", [0usize; 0]));
    };
    let (width, height) = (first.width(), first.height());

    let mut batch = Array4::<u8>::zeros((images.len(), height, width, 3));
    for (i, img) in images.iter().enumerate() {
        if img.width() != width || img.height() != height {
            return Err(Error::shape(
                format!("images[{i}]"),
                format!("{width}x{height} like images[0]"),
                (img.width(), img.height()),
            ));
        }
        for (idx, px) in img.pixels().enumerate() {
            let (y, x) = (idx / width, idx % width);
            batch[[i, y, x, 0]] = px.r;
            batch[[i, y, x, 1]] = px.g;
            batch[[i, y, x, 2]] = px.b;
        }
    }

    Ok(Tensor::UInt8(batch.into_dyn()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array3, ArrayD, IxDyn};

    fn constant(shape: &[usize], value: u8) -> Tensor {
        Tensor::UInt8(ArrayD::from_elem(IxDyn(shape), value))
    }

    fn all_close(t: &Tensor, expected: f64) -> bool {
        t.to_f64().iter().all(|&v| (v - expected).abs() < 1e-6)
    }

    #[test]
    fn test_midpoint_maps_to_zero() {
        let out = preprocess_image(&constant(&[2, 8, 8, 3], 128), 4, 4).unwrap();
        assert_eq!(out.shape(), &[2, 4, 4, 3]);
        assert!(all_close(&out, 0.0));
    }

    #[test]
    fn test_extremes() {
        let white = preprocess_image(&constant(&[1, 5, 5, 3], 255), 7, 7).unwrap();
        assert!(all_close(&white, (255.0 - 128.0) / 128.0));

        let black = preprocess_image(&constant(&[1, 5, 5, 3], 0), 7, 7).unwrap();
        assert!(all_close(&black, -1.0));
    }

    #[test]
    fn test_single_image_keeps_rank() {
        let single = Tensor::Float32(Array3::<f32>::from_elem((6, 6, 3), 128.0).into_dyn());
        let out = preprocess_image(&single, 3, 3).unwrap();
        assert_eq!(out.shape(), &[3, 3, 3]);
        assert!(all_close(&out, 0.0));
    }

    #[test]
    fn test_rejects_rank_two() {
        let flat = constant(&[4, 4], 0);
        assert!(matches!(
            preprocess_image(&flat, 2, 2),
            Err(Error::Shape { .. })
        ));
    }

    #[test]
    fn test_bilinear_upsample_interpolates() {
        // 1x2 image [0, 10] resized to 1x4: samples at x = 0, 0.5, 1, 1.5
        let mut img = Array4::<f32>::zeros((1, 1, 2, 1));
        img[[0, 0, 1, 0]] = 10.0;
        let out = resize_bilinear(img.view(), 1, 4);
        let row: Vec<f32> = (0..4).map(|x| out[[0, 0, x, 0]]).collect();
        assert_eq!(row, vec![0.0, 5.0, 10.0, 10.0]);
    }

    #[test]
    fn test_rgb8_batch() {
        let a = ImgVec::new(vec![RGB8::new(1, 2, 3); 6], 3, 2);
        let b = ImgVec::new(vec![RGB8::new(4, 5, 6); 6], 3, 2);
        let batch = rgb8_batch(&[a, b]).unwrap();
        assert_eq!(batch.shape(), &[2, 2, 3, 3]);
        let values = batch.to_f64();
        assert_eq!(values[[1, 1, 2, 2]], 6.0);
    }

    #[test]
    fn test_rgb8_batch_mismatched_sizes() {
        let a = ImgVec::new(vec![RGB8::new(0, 0, 0); 6], 3, 2);
        let b = ImgVec::new(vec![RGB8::new(0, 0, 0); 4], 2, 2);
        assert!(rgb8_batch(&[a, b]).is_err());
    }
}
