// r_shadow.rs — blob shadows under moving objects

use tr2_common::phd_math::{phd_cos, phd_sin, MatrixStack, PhdVector, PHD_180, PHD_360, PHD_IONE};

use crate::r_local::{BoundingBox, ShadowMode, Viewport};
use crate::r_palette::SHADOW_DEPTHQ_LEVEL;
use crate::r_poly::{project_vertex, PolyList, ScreenVertex};

pub const CIRCLE_POINTS: usize = 32;
pub const OCTAGON_POINTS: usize = 8;

/// Where an object stands: world position, floor height under it and yaw.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ShadowCaster {
    pub x: i32,
    pub z: i32,
    pub floor: i32,
    pub yaw: i32,
}

/// Object-local floor outline of the shadow. `radius` scales the box's
/// x/z extent in 1/1024 units; y is always 0.
pub fn shadow_footprint(radius: i32, bounds: &BoundingBox, mode: ShadowMode) -> Vec<PhdVector> {
    let (x0, x1) = (bounds.x_min, bounds.x_max);
    let (z0, z1) = (bounds.z_min, bounds.z_max);

    let mid_x = (x0 + x1) / 2;
    let x_add = (x1 - x0) * radius / 0x400;
    let mid_z = (z0 + z1) / 2;
    let z_add = (z1 - z0) * radius / 0x400;

    match mode {
        ShadowMode::Circle => (0..CIRCLE_POINTS as i32)
            .map(|i| {
                let angle = (PHD_180 + i * PHD_360) / CIRCLE_POINTS as i32;
                PhdVector::new(
                    mid_x + (x_add * 2) * phd_sin(angle) / PHD_IONE,
                    0,
                    mid_z + (z_add * 2) * phd_cos(angle) / PHD_IONE,
                )
            })
            .collect(),
        ShadowMode::Octagon => vec![
            PhdVector::new(mid_x - x_add, 0, mid_z + z_add * 2),
            PhdVector::new(mid_x + x_add, 0, mid_z + z_add * 2),
            PhdVector::new(mid_x + x_add * 2, 0, mid_z + z_add),
            PhdVector::new(mid_x + x_add * 2, 0, mid_z - z_add),
            PhdVector::new(mid_x + x_add, 0, mid_z - z_add * 2),
            PhdVector::new(mid_x - x_add, 0, mid_z - z_add * 2),
            PhdVector::new(mid_x - x_add * 2, 0, mid_z - z_add),
            PhdVector::new(mid_x - x_add * 2, 0, mid_z + z_add),
        ],
    }
}

/// Project the shadow at the caster's floor and queue it as a darkening
/// polygon. Returns false when nothing of it is on screen.
pub fn print_shadow(
    stack: &mut MatrixStack,
    vp: &Viewport,
    list: &mut PolyList,
    radius: i32,
    bounds: &BoundingBox,
    caster: &ShadowCaster,
    mode: ShadowMode,
) -> bool {
    let footprint = shadow_footprint(radius, bounds, mode);

    let mut guard = stack.push_scoped();
    guard.translate_abs(caster.x, caster.floor, caster.z);
    guard.rot_y(caster.yaw);
    let m = *guard.current();

    let vertices: Vec<ScreenVertex> = footprint.iter().map(|p| project_vertex(&m, vp, p.x, p.y, p.z, 0)).collect();
    list.insert_trans8(&vertices, SHADOW_DEPTHQ_LEVEL)
}

// ============================================================
// Tests
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::r_poly::PolyKind;
    use tr2_common::phd_math::{PhdMatrix, PHD_90};

    fn bounds() -> BoundingBox {
        BoundingBox::new(-0x100, 0x100, -0x300, 0, -0x80, 0x80)
    }

    fn extent(points: &[PhdVector]) -> (i32, i32) {
        let xs = points.iter().map(|p| p.x);
        let zs = points.iter().map(|p| p.z);
        (
            xs.clone().max().unwrap() - xs.min().unwrap(),
            zs.clone().max().unwrap() - zs.min().unwrap(),
        )
    }

    #[test]
    fn test_octagon_extent_is_four_adds() {
        for radius in [0x100, 0x200, 0x333, 0x400] {
            let b = bounds();
            let x_add = (b.x_max - b.x_min) * radius / 0x400;
            let z_add = (b.z_max - b.z_min) * radius / 0x400;
            let points = shadow_footprint(radius, &b, ShadowMode::Octagon);
            assert_eq!(points.len(), OCTAGON_POINTS);
            assert_eq!(extent(&points), (4 * x_add, 4 * z_add));
        }
    }

    #[test]
    fn test_octagon_centred_on_box() {
        let b = BoundingBox::new(100, 300, 0, 0, 1000, 1400);
        let points = shadow_footprint(0x400, &b, ShadowMode::Octagon);
        assert_eq!(points[0], PhdVector::new(200 - 200, 0, 1200 + 800));
        assert!(points.iter().all(|p| p.y == 0));
    }

    #[test]
    fn test_circle_points() {
        let points = shadow_footprint(0x400, &bounds(), ShadowMode::Circle);
        assert_eq!(points.len(), CIRCLE_POINTS);
        // half a step past the start, so no point lies on an axis
        assert!(points.iter().all(|p| p.x != 0 && p.z != 0));
        let first = points[0];
        assert!(first.x > 0 && first.z > 0);
        let (ex, ez) = extent(&points);
        assert!(ex <= 4 * 0x200 && ex > 3 * 0x200);
        assert!(ez <= 4 * 0x100 && ez > 3 * 0x100);
    }

    #[test]
    fn test_print_shadow_in_front() {
        let vp = Viewport::new(0, 0, 640, 480, 80);
        let mut stack = MatrixStack::new();
        stack.set_w2v(PhdMatrix::IDENTITY, PhdVector::default());
        let mut list = PolyList::new();
        let caster = ShadowCaster { x: 0, z: 2048, floor: 512, yaw: PHD_90 };
        assert!(print_shadow(&mut stack, &vp, &mut list, 0x200, &bounds(), &caster, ShadowMode::Octagon));
        assert_eq!(stack.depth(), 1);
        assert_eq!(*stack.current(), PhdMatrix::IDENTITY);
        let entry = &list.entries()[0];
        assert_eq!(entry.kind, PolyKind::Trans8 { level: SHADOW_DEPTHQ_LEVEL });
        assert_eq!(entry.vertices.len(), OCTAGON_POINTS);
        // floor below the eye projects below the centre line
        assert!(entry.vertices.iter().all(|v| v.y > vp.center_y));
    }

    #[test]
    fn test_print_shadow_behind_camera_skipped() {
        let vp = Viewport::new(0, 0, 640, 480, 80);
        let mut stack = MatrixStack::new();
        let mut list = PolyList::new();
        let caster = ShadowCaster { x: 0, z: -2048, floor: 512, yaw: 0 };
        assert!(!print_shadow(&mut stack, &vp, &mut list, 0x200, &bounds(), &caster, ShadowMode::Circle));
        assert!(list.is_empty());
        assert_eq!(stack.depth(), 1);
    }
}
