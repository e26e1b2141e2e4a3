// r_swr.rs — software rasterizer for the polygon list

use crate::r_buffer::SwrBuffer;
use crate::r_local::Rect;
use crate::r_palette::{shade_to_level, DepthQTables};
use crate::r_poly::{PolyKind, PolyList, ScreenVertex};

/// Draw every entry of `list`, in list order, into `buf`. Nothing is
/// written outside `clip` or the buffer.
pub fn print_poly_list(list: &PolyList, buf: &mut SwrBuffer, depthq: &DepthQTables, clip: Rect) {
    let clip = Rect::new(
        clip.left.max(0),
        clip.top.max(0),
        clip.right.min(buf.width as i32),
        clip.bottom.min(buf.height as i32),
    );
    if clip.width() <= 0 || clip.height() <= 0 {
        return;
    }
    let pitch = buf.width as usize;

    for entry in list.entries() {
        match entry.kind {
            PolyKind::FlatRect { x0, y0, x1, y1, colour } => {
                let (x0, x1) = (x0.max(clip.left), x1.min(clip.right));
                let (y0, y1) = (y0.max(clip.top), y1.min(clip.bottom));
                if x0 >= x1 {
                    continue;
                }
                for y in y0..y1 {
                    let row = y as usize * pitch;
                    buf.bitmap[row + x0 as usize..row + x1 as usize].fill(colour);
                }
            }
            PolyKind::Flat { colour } => {
                let level = shade_to_level(average_shade(&entry.vertices));
                let colour = depthq.shade(level, colour);
                fill_convex(&entry.vertices, clip, |y, x0, x1| {
                    let row = y as usize * pitch;
                    buf.bitmap[row + x0 as usize..row + x1 as usize].fill(colour);
                });
            }
            PolyKind::Trans8 { level } => {
                let table = depthq.table(level);
                fill_convex(&entry.vertices, clip, |y, x0, x1| {
                    let row = y as usize * pitch;
                    for px in &mut buf.bitmap[row + x0 as usize..row + x1 as usize] {
                        *px = table[*px as usize];
                    }
                });
            }
        }
    }
}

fn average_shade(vertices: &[ScreenVertex]) -> i32 {
    if vertices.is_empty() {
        return 0;
    }
    (vertices.iter().map(|v| v.shade as i64).sum::<i64>() / vertices.len() as i64) as i32
}

/// Scan convert a convex polygon. Calls `span(y, x0, x1)` with a non-empty
/// half-open span already clipped to `clip`.
pub fn fill_convex<F: FnMut(i32, i32, i32)>(vertices: &[ScreenVertex], clip: Rect, mut span: F) {
    if vertices.len() < 3 {
        return;
    }
    let y_top = vertices.iter().map(|v| v.y).min().unwrap_or(0).max(clip.top);
    let y_bottom = vertices.iter().map(|v| v.y).max().unwrap_or(0).min(clip.bottom);

    for y in y_top..y_bottom {
        let mut left = i64::MAX;
        let mut right = i64::MIN;
        for (i, a) in vertices.iter().enumerate() {
            let b = &vertices[(i + 1) % vertices.len()];
            let (top, bottom) = if a.y <= b.y { (a, b) } else { (b, a) };
            if y < top.y || y >= bottom.y {
                continue;
            }
            let x = top.x as i64 + (y - top.y) as i64 * (bottom.x - top.x) as i64 / (bottom.y - top.y) as i64;
            left = left.min(x);
            right = right.max(x);
        }
        if left >= right {
            continue;
        }
        let x0 = left.max(clip.left as i64) as i32;
        let x1 = right.min(clip.right as i64) as i32;
        if x0 < x1 {
            span(y, x0, x1);
        }
    }
}

// ============================================================
// Tests
// ============================================================
