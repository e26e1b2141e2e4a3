// r_poly.rs — projected vertices and the per-frame polygon list

use tr2_common::phd_math::{PhdMatrix, W2V_SHIFT};

use crate::r_local::Viewport;
use crate::r_palette::legacy_depthq_level;

bitflags::bitflags! {
    /// Which viewport edges or depth planes a projected vertex lies beyond.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct OutCode: u8 {
        const LEFT   = 0x01;
        const RIGHT  = 0x02;
        const TOP    = 0x04;
        const BOTTOM = 0x08;
        const NEAR   = 0x10;
        const FAR    = 0x20;
    }
}

/// A vertex in absolute screen coordinates with its view depth (world
/// units) and shade.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ScreenVertex {
    pub x: i32,
    pub y: i32,
    pub z: i32,
    pub shade: i32,
    pub clip: OutCode,
}

/// Project an object-local point through `m`.
pub fn project_vertex(m: &PhdMatrix, vp: &Viewport, x: i32, y: i32, z: i32, shade: i32) -> ScreenVertex {
    let (xv, yv, zv) = m.transform(x, y, z);
    let mut clip = OutCode::empty();
    if zv <= vp.near_z as i64 {
        clip |= OutCode::NEAR;
    } else if zv >= vp.far_z as i64 {
        clip |= OutCode::FAR;
    }

    let (sx, sy) = if clip.contains(OutCode::NEAR) {
        (vp.min_x + vp.center_x, vp.min_y + vp.center_y)
    } else {
        let zp = (zv / vp.persp as i64).max(1);
        (
            (xv / zp + (vp.min_x + vp.center_x) as i64).clamp(i32::MIN as i64 / 2, i32::MAX as i64 / 2) as i32,
            (yv / zp + (vp.min_y + vp.center_y) as i64).clamp(i32::MIN as i64 / 2, i32::MAX as i64 / 2) as i32,
        )
    };

    if sx < vp.min_x + vp.left {
        clip |= OutCode::LEFT;
    } else if sx > vp.min_x + vp.right {
        clip |= OutCode::RIGHT;
    }
    if sy < vp.min_y + vp.top {
        clip |= OutCode::TOP;
    } else if sy > vp.min_y + vp.bottom {
        clip |= OutCode::BOTTOM;
    }

    ScreenVertex {
        x: sx,
        y: sy,
        z: (zv >> W2V_SHIFT).clamp(0, i32::MAX as i64) as i32,
        shade,
        clip,
    }
}

/// True when a polygon over these vertices can put pixels on screen: no
/// vertex is behind the near plane and not all share an outside edge.
pub fn polygon_visible(vertices: &[ScreenVertex]) -> bool {
    if vertices.len() < 3 {
        return false;
    }
    let mut all = OutCode::all();
    for v in vertices {
        if v.clip.contains(OutCode::NEAR) {
            return false;
        }
        all &= v.clip;
    }
    all.is_empty()
}

// ============================================================
// Polygon list
// ============================================================

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PolyKind {
    /// Screen-aligned solid rectangle, right/bottom exclusive.
    FlatRect { x0: i32, y0: i32, x1: i32, y1: i32, colour: u8 },
    /// Solid colour polygon darkened by its vertex shades.
    Flat { colour: u8 },
    /// Darken whatever is behind with a depth-cue level.
    Trans8 { level: usize },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PolyEntry {
    /// Sort key: view depth in world units, larger is farther.
    pub depth: i32,
    pub kind: PolyKind,
    pub vertices: Vec<ScreenVertex>,
}

/// Polygons emitted for one frame, drawn back to front after `sort`.
#[derive(Default)]
pub struct PolyList {
    entries: Vec<PolyEntry>,
}

impl PolyList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new frame.
    pub fn init(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[PolyEntry] {
        &self.entries
    }

    /// Solid rectangle at an explicit depth (W2V-scaled, as the near and
    /// far planes are).
    pub fn insert_flat_rect(&mut self, x0: i32, y0: i32, x1: i32, y1: i32, z: i32, colour: u8) {
        if x1 <= x0 || y1 <= y0 {
            return;
        }
        self.entries.push(PolyEntry {
            depth: z >> W2V_SHIFT,
            kind: PolyKind::FlatRect { x0, y0, x1, y1, colour },
            vertices: Vec::new(),
        });
    }

    /// Returns false when the polygon cannot be seen and was not added.
    pub fn insert_poly(&mut self, vertices: &[ScreenVertex], colour: u8) -> bool {
        self.insert(vertices, PolyKind::Flat { colour })
    }

    /// Queue a darkening polygon. A shade index past the last depth-cue
    /// level is stored as the shadow level.
    pub fn insert_trans8(&mut self, vertices: &[ScreenVertex], level: usize) -> bool {
        let level = legacy_depthq_level(i32::try_from(level).unwrap_or(i32::MAX));
        self.insert(vertices, PolyKind::Trans8 { level })
    }

    fn insert(&mut self, vertices: &[ScreenVertex], kind: PolyKind) -> bool {
        if !polygon_visible(vertices) {
            return false;
        }
        let depth = vertices.iter().map(|v| v.z as i64).sum::<i64>() / vertices.len() as i64;
        self.entries.push(PolyEntry { depth: depth as i32, kind, vertices: vertices.to_vec() });
        true
    }

    /// Order farthest first. Equal depths keep insertion order.
    pub fn sort(&mut self) {
        self.entries.sort_by(|a, b| b.depth.cmp(&a.depth));
    }
}

// ============================================================
// Tests
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tr2_common::phd_math::MatrixStack;

    fn viewport() -> Viewport {
        Viewport::new(0, 0, 640, 480, 90)
    }

    fn vertex(x: i32, y: i32, z: i32) -> ScreenVertex {
        ScreenVertex { x, y, z, shade: 0, clip: OutCode::empty() }
    }

    #[test]
    fn test_project_centre() {
        let mut stack = MatrixStack::new();
        stack.translate_rel(0, 0, 1024);
        let v = project_vertex(stack.current(), &viewport(), 0, 0, 0, 7);
        assert_eq!((v.x, v.y, v.z, v.shade), (320, 240, 1024, 7));
        assert!(v.clip.is_empty());
    }

    #[test]
    fn test_project_offsets_by_window_origin() {
        let mut stack = MatrixStack::new();
        stack.translate_rel(0, 0, 1024);
        let vp = Viewport::new(100, 50, 640, 480, 90);
        let v = project_vertex(stack.current(), &vp, 0, 0, 0, 0);
        assert_eq!((v.x, v.y), (420, 290));
    }

    #[test]
    fn test_project_outcodes() {
        let vp = viewport();
        let m = PhdMatrix::IDENTITY;
        assert!(project_vertex(&m, &vp, 0, 0, 0, 0).clip.contains(OutCode::NEAR));
        assert!(project_vertex(&m, &vp, -4096, 0, 1024, 0).clip.contains(OutCode::LEFT));
        assert!(project_vertex(&m, &vp, 0, 4096, 1024, 0).clip.contains(OutCode::BOTTOM));
        assert!(project_vertex(&m, &vp, 0, 0, 0x6000, 0).clip.contains(OutCode::FAR));
    }

    #[test]
    fn test_polygon_visible_rules() {
        let a = vertex(0, 0, 100);
        let b = vertex(10, 0, 100);
        let c = vertex(0, 10, 100);
        assert!(polygon_visible(&[a, b, c]));
        assert!(!polygon_visible(&[a, b]));

        let left = |v: ScreenVertex| ScreenVertex { clip: OutCode::LEFT, ..v };
        assert!(!polygon_visible(&[left(a), left(b), left(c)]));
        // one edge left, another right: may still cross the screen
        assert!(polygon_visible(&[left(a), ScreenVertex { clip: OutCode::RIGHT, ..b }, c]));
        assert!(!polygon_visible(&[ScreenVertex { clip: OutCode::NEAR, ..a }, b, c]));
    }

    #[test]
    fn test_sort_back_to_front() {
        let mut list = PolyList::new();
        list.insert_poly(&[vertex(0, 0, 100), vertex(1, 0, 100), vertex(0, 1, 100)], 1);
        list.insert_poly(&[vertex(0, 0, 900), vertex(1, 0, 900), vertex(0, 1, 900)], 2);
        list.insert_flat_rect(0, 0, 4, 4, 500 << W2V_SHIFT, 3);
        list.sort();
        let depths: Vec<i32> = list.entries().iter().map(|e| e.depth).collect();
        assert_eq!(depths, vec![900, 500, 100]);
    }

    #[test]
    fn test_sort_is_stable() {
        let mut list = PolyList::new();
        list.insert_flat_rect(0, 0, 1, 1, 0, 1);
        list.insert_flat_rect(0, 0, 1, 1, 0, 2);
        list.sort();
        let colours: Vec<u8> = list
            .entries()
            .iter()
            .map(|e| match e.kind {
                PolyKind::FlatRect { colour, .. } => colour,
                _ => 0,
            })
            .collect();
        assert_eq!(colours, vec![1, 2]);
    }

    #[test]
    fn test_empty_rect_skipped_and_init_clears() {
        let mut list = PolyList::new();
        list.insert_flat_rect(5, 5, 5, 9, 0, 1);
        assert!(list.is_empty());
        list.insert_flat_rect(0, 0, 2, 2, 0, 1);
        assert_eq!(list.len(), 1);
        list.init();
        assert!(list.is_empty());
    }
}
