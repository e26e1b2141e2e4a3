// r_bounds.rs — bounding box visibility classification

use tr2_common::phd_math::PhdMatrix;

use crate::r_local::{BoundingBox, Viewport};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ObjectVisibility {
    /// Nothing of the box can reach the screen.
    Offscreen,
    /// Partly visible or partly outside the depth range; polygons need
    /// clipping at draw time.
    Clipped,
    /// Every corner projects inside the viewport.
    FullyVisible,
}

impl ObjectVisibility {
    pub fn is_visible(self) -> bool {
        self != ObjectVisibility::Offscreen
    }
}

/// Project the eight corners of `bounds` through `m` and classify the
/// screen-space extent against the viewport.
///
/// A corner takes part in the extent only when its depth lies strictly
/// between the near and far planes. Extents are window-relative.
pub fn get_object_bounds(m: &PhdMatrix, bounds: &BoundingBox, vp: &Viewport) -> ObjectVisibility {
    if m.m23 >= vp.far_z {
        return ObjectVisibility::Offscreen;
    }

    let mut x_min = i64::MAX;
    let mut x_max = i64::MIN;
    let mut y_min = i64::MAX;
    let mut y_max = i64::MIN;
    let mut num_z = 0;

    for corner in bounds.corners() {
        let (xv, yv, zv) = m.transform(corner.x, corner.y, corner.z);
        if zv <= vp.near_z as i64 || zv >= vp.far_z as i64 {
            continue;
        }
        num_z += 1;
        // near_z is far above persp, so the divisor never reaches zero
        let zp = (zv / vp.persp as i64).max(1);
        let xs = xv / zp;
        let ys = yv / zp;
        x_min = x_min.min(xs);
        x_max = x_max.max(xs);
        y_min = y_min.min(ys);
        y_max = y_max.max(ys);
    }

    if num_z == 0 {
        return ObjectVisibility::Offscreen;
    }

    let (cx, cy) = (vp.center_x as i64, vp.center_y as i64);
    let (x_min, x_max) = (x_min + cx, x_max + cx);
    let (y_min, y_max) = (y_min + cy, y_max + cy);

    if x_min > vp.right as i64 || y_min > vp.bottom as i64 || x_max < vp.left as i64 || y_max < vp.top as i64 {
        return ObjectVisibility::Offscreen;
    }

    if num_z < 8 || x_min < 0 || y_min < 0 || x_max > vp.max_x() as i64 || y_max > vp.max_y() as i64 {
        return ObjectVisibility::Clipped;
    }

    ObjectVisibility::FullyVisible
}

// ============================================================
// Tests
// ============================================================
