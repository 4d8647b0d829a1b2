//! 10-crop layout command.

use anyhow::Result;
use model_eval::tta::ten_crop_boxes;

pub fn run(crop_size: usize, image_size: usize) -> Result<()> {
    let boxes = ten_crop_boxes(crop_size, image_size)?;

    println!(
        "{:>3}  {:>6}  {:>6}  {:>6}  {:>6}  mirror",
        "#", "top", "left", "bottom", "right"
    );
    for (i, b) in boxes.iter().enumerate() {
        println!(
            "{:>3}  {:>6}  {:>6}  {:>6}  {:>6}  {}",
            i + 1,
            b.top,
            b.left,
            b.bottom,
            b.right,
            if b.mirror { "yes" } else { "no" }
        );
    }

    Ok(())
}
