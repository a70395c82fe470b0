//! Binary morphology on masks

use std::collections::VecDeque;

use ndarray::{Array2, ArrayView2};

/// Elliptical structuring element of `width` x `height`
///
/// Row `i` is filled over `c - dx ..= c + dx` where `c = width / 2`,
/// `r = height / 2` and `dx = round(c * sqrt(1 - ((i - r) / r)^2))`.
/// The anchor is `(r, c)`.
pub fn ellipse_kernel(width: usize, height: usize) -> Array2<bool> {
    let (width, height) = (width.max(1), height.max(1));
    let r = (height / 2) as i64;
    let c = (width / 2) as i64;
    let inv_r2 = if r > 0 { 1.0 / (r * r) as f64 } else { 0.0 };

    let mut kernel = Array2::from_elem((height, width), false);
    for i in 0..height {
        let dy = i as i64 - r;
        if dy.abs() > r {
            continue;
        }
        let dx = (c as f64 * (((r * r - dy * dy) as f64) * inv_r2).sqrt()).round() as i64;
        let j1 = (c - dx).max(0) as usize;
        let j2 = (c + dx + 1).min(width as i64) as usize;
        for j in j1..j2 {
            kernel[[i, j]] = true;
        }
    }

    kernel
}

/// Dilate `mask` with `kernel` anchored at its center
///
/// Pixels outside the mask count as unset.
pub fn dilate(mask: ArrayView2<bool>, kernel: ArrayView2<bool>) -> Array2<bool> {
    let (rows, cols) = mask.dim();
    let (k_rows, k_cols) = kernel.dim();
    let (anchor_r, anchor_c) = ((k_rows / 2) as i64, (k_cols / 2) as i64);

    let offsets: Vec<(i64, i64)> = kernel
        .indexed_iter()
        .filter(|(_, &on)| on)
        .map(|((i, j), _)| (i as i64 - anchor_r, j as i64 - anchor_c))
        .collect();

    Array2::from_shape_fn((rows, cols), |(r, c)| {
        offsets.iter().any(|&(dy, dx)| {
            let (y, x) = (r as i64 + dy, c as i64 + dx);
            y >= 0 && x >= 0 && (y as usize) < rows && (x as usize) < cols && mask[[y as usize, x as usize]]
        })
    })
}

/// Clear 8-connected regions smaller than `min_size` pixels
pub fn remove_small_regions(mask: &mut Array2<bool>, min_size: f64) {
    let (rows, cols) = mask.dim();
    let mut visited = Array2::from_elem((rows, cols), false);
    let mut queue = VecDeque::new();
    let mut region = Vec::new();

    for start_r in 0..rows {
        for start_c in 0..cols {
            if !mask[[start_r, start_c]] || visited[[start_r, start_c]] {
                continue;
            }

            region.clear();
            visited[[start_r, start_c]] = true;
            queue.push_back((start_r, start_c));
            while let Some((r, c)) = queue.pop_front() {
                region.push((r, c));
                for nr in r.saturating_sub(1)..=(r + 1).min(rows - 1) {
                    for nc in c.saturating_sub(1)..=(c + 1).min(cols - 1) {
                        if mask[[nr, nc]] && !visited[[nr, nc]] {
                            visited[[nr, nc]] = true;
                            queue.push_back((nr, nc));
                        }
                    }
                }
            }

            if (region.len() as f64) < min_size {
                for &(r, c) in &region {
                    mask[[r, c]] = false;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mask_from(rows: &[&str]) -> Array2<bool> {
        let width = rows[0].len();
        Array2::from_shape_fn((rows.len(), width), |(r, c)| rows[r].as_bytes()[c] == b'#')
    }

    #[test]
    fn test_ellipse_kernel_shapes() {
        assert_eq!(ellipse_kernel(1, 1), mask_from(&["#"]));
        assert_eq!(ellipse_kernel(3, 3), mask_from(&[".#.", "###", ".#."]));
        assert_eq!(ellipse_kernel(5, 5), mask_from(&["..#..", "#####", "#####", "#####", "..#.."]));
        assert_eq!(ellipse_kernel(4, 4), mask_from(&["..#.", "####", "####", "####"]));
    }

    #[test]
    fn test_dilate_with_cross() {
        let mask = mask_from(&[".....", ".....", "..#..", ".....", "....."]);
        let dilated = dilate(mask.view(), ellipse_kernel(3, 3).view());
        assert_eq!(dilated, mask_from(&[".....", "..#..", ".###.", "..#..", "....."]));
    }

    #[test]
    fn test_dilate_clips_at_border() {
        let mask = mask_from(&["#..", "...", "..."]);
        let dilated = dilate(mask.view(), ellipse_kernel(3, 3).view());
        assert_eq!(dilated, mask_from(&["##.", "#..", "..."]));
    }

    #[test]
    fn test_remove_small_regions_uses_diagonal_neighbours() {
        let mut mask = mask_from(&["#....", ".#...", "....#", "....."]);
        remove_small_regions(&mut mask, 2.0);
        assert_eq!(mask, mask_from(&["#....", ".#...", ".....", "....."]));
    }
}
