// r_buffer.rs — 8-bit CPU pixel buffers (render target and picture buffer)

use tr2_common::pcx::PcxError;

use crate::r_local::Rect;
use crate::r_palette::PALETTE_SIZE;

/// Errors from picture buffer management.
#[derive(Debug)]
pub enum PictureError {
    /// Memory for a width x height bitmap could not be reserved.
    Allocation { width: u32, height: u32 },
    /// The picture file did not decode.
    Decode(PcxError),
}

impl std::fmt::Display for PictureError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PictureError::Allocation { width, height } => {
                write!(f, "cannot allocate {}x{} picture buffer", width, height)
            }
            PictureError::Decode(e) => write!(f, "picture decode failed: {}", e),
        }
    }
}

impl std::error::Error for PictureError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PictureError::Decode(e) => Some(e),
            _ => None,
        }
    }
}

impl From<PcxError> for PictureError {
    fn from(e: PcxError) -> Self {
        PictureError::Decode(e)
    }
}

/// Indexed bitmap with a pitch equal to its width.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SwrBuffer {
    pub width: u32,
    pub height: u32,
    pub bitmap: Vec<u8>,
}

impl SwrBuffer {
    /// Zero-filled buffer. Allocation failure is reported, never aborts.
    pub fn try_new(width: u32, height: u32) -> Result<Self, PictureError> {
        let size = width as usize * height as usize;
        let mut bitmap = Vec::new();
        bitmap
            .try_reserve_exact(size)
            .map_err(|_| PictureError::Allocation { width, height })?;
        bitmap.resize(size, 0);
        Ok(Self { width, height, bitmap })
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0 || self.bitmap.is_empty()
    }

    pub fn clear(&mut self) {
        self.bitmap.fill(0);
    }

    /// Zero a rectangle, clipped to the buffer.
    pub fn clear_rect(&mut self, rect: Rect) {
        let x0 = rect.left.clamp(0, self.width as i32) as usize;
        let x1 = rect.right.clamp(0, self.width as i32) as usize;
        let y0 = rect.top.clamp(0, self.height as i32) as usize;
        let y1 = rect.bottom.clamp(0, self.height as i32) as usize;
        if x0 >= x1 {
            return;
        }
        let pitch = self.width as usize;
        for y in y0..y1 {
            self.bitmap[y * pitch + x0..y * pitch + x1].fill(0);
        }
    }

    /// Pass every pixel through a 256-entry table.
    pub fn remap(&mut self, table: &[u8; PALETTE_SIZE]) {
        for px in self.bitmap.iter_mut() {
            *px = table[*px as usize];
        }
    }

    /// Scale `src_rect` of `src` into `dst_rect` of `self` with nearest
    /// sampling. Rectangles use absolute right/bottom edges and are clamped
    /// to their buffers; `None` means the whole buffer. A rectangle whose
    /// right/bottom lies before its left/top mirrors that axis. Returns false
    /// when either side is empty.
    pub fn stretch_blt(&mut self, dst_rect: Option<Rect>, src: &SwrBuffer, src_rect: Option<Rect>) -> bool {
        if src.is_empty() || self.is_empty() {
            return false;
        }
        let Some((sx, sy, sw, sh)) = clamp_blt_rect(src_rect, src.width, src.height) else {
            return false;
        };
        let Some((dx, dy, dw, dh)) = clamp_blt_rect(dst_rect, self.width, self.height) else {
            return false;
        };

        let (sx, sw_abs, mirror_x) = normalise_span(sx, sw);
        let (sy, sh_abs, mirror_y) = normalise_span(sy, sh);
        let (dx, dw_abs, dmirror_x) = normalise_span(dx, dw);
        let (dy, dh_abs, dmirror_y) = normalise_span(dy, dh);
        let mirror_x = mirror_x != dmirror_x;
        let mirror_y = mirror_y != dmirror_y;

        let columns: Vec<usize> = (0..dw_abs as i64)
            .map(|i| {
                let step = i * sw_abs as i64 / dw_abs as i64;
                let col = if mirror_x { sw_abs as i64 - 1 - step } else { step };
                (sx as i64 + col) as usize
            })
            .collect();

        let src_pitch = src.width as usize;
        let dst_pitch = self.width as usize;
        for j in 0..dh_abs as i64 {
            let step = j * sh_abs as i64 / dh_abs as i64;
            let row = if mirror_y { sh_abs as i64 - 1 - step } else { step };
            let src_row = (sy as i64 + row) as usize * src_pitch;
            let dst_row = (dy as i64 + j) as usize * dst_pitch + dx as usize;
            for (i, &col) in columns.iter().enumerate() {
                self.bitmap[dst_row + i] = src.bitmap[src_row + col];
            }
        }
        true
    }
}

/// Clamp a rectangle to `width` x `height`. Returns (x, y, w, h) where the
/// extents may be negative for mirrored rectangles, or None if empty.
fn clamp_blt_rect(rect: Option<Rect>, width: u32, height: u32) -> Option<(i32, i32, i32, i32)> {
    let Some(rect) = rect else {
        return Some((0, 0, width as i32, height as i32));
    };
    let x = rect.left.clamp(0, width as i32);
    let y = rect.top.clamp(0, height as i32);
    let w = rect.right.clamp(0, width as i32) - x;
    let h = rect.bottom.clamp(0, height as i32) - y;
    if w == 0 || h == 0 {
        return None;
    }
    Some((x, y, w, h))
}

/// Turn a possibly negative span into (start, length, mirrored).
fn normalise_span(start: i32, extent: i32) -> (i32, i32, bool) {
    if extent < 0 {
        (start + extent, -extent, true)
    } else {
        (start, extent, false)
    }
}

// ============================================================
// Tests
// ============================================================
