// r_local.rs — shared renderer types, constants and settings

use tr2_common::cvar::{CvarContext, CvarFlags, CVAR_ARCHIVE, CVAR_LATCH};
use tr2_common::phd_math::{PhdVector, W2V_SHIFT};

// ============================================================
// Constants
// ============================================================

/// Length of the wobble cycle driving flicker and animated lighting.
pub const WIBBLE_SIZE: i32 = 32;

pub const TICKS_PER_FRAME: i32 = 2;
pub const TICKS_PER_SECOND: i32 = 60;
/// Time for a sunset room to go fully dark.
pub const SUNSET_TIMEOUT: i32 = TICKS_PER_SECOND * 60 * 20;

/// Maximum simultaneous dynamic lights.
pub const MAX_DYNAMICS: usize = 10;

/// Darkest shade value; fog saturates here.
pub const MAX_SHADE: i32 = 0x1FFF;
/// Shade of an unlit-by-anything static mesh (neutral).
pub const NEUTRAL_SHADE: i32 = 0x1000;

/// Distance where depth-cue fog reaches full darkness.
pub const DEPTHQ_END: i32 = 0x5000;
pub const DEPTHQ_RANGE: i32 = 0x2000;
/// Distance where depth-cue fog begins.
pub const DEPTHQ_START: i32 = DEPTHQ_END - DEPTHQ_RANGE;

pub const DEFAULT_NEAR_Z: i32 = 20;
pub const DEFAULT_FAR_Z: i32 = DEPTHQ_END;

// ============================================================
// Geometry
// ============================================================

/// Object-local axis-aligned box.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BoundingBox {
    pub x_min: i32,
    pub x_max: i32,
    pub y_min: i32,
    pub y_max: i32,
    pub z_min: i32,
    pub z_max: i32,
}

impl BoundingBox {
    pub const fn new(x_min: i32, x_max: i32, y_min: i32, y_max: i32, z_min: i32, z_max: i32) -> Self {
        Self { x_min, x_max, y_min, y_max, z_min, z_max }
    }

    pub fn corners(&self) -> [PhdVector; 8] {
        [
            PhdVector::new(self.x_min, self.y_min, self.z_min),
            PhdVector::new(self.x_max, self.y_min, self.z_min),
            PhdVector::new(self.x_max, self.y_max, self.z_min),
            PhdVector::new(self.x_min, self.y_max, self.z_min),
            PhdVector::new(self.x_min, self.y_min, self.z_max),
            PhdVector::new(self.x_max, self.y_min, self.z_max),
            PhdVector::new(self.x_max, self.y_max, self.z_max),
            PhdVector::new(self.x_min, self.y_max, self.z_max),
        ]
    }
}

/// Screen rectangle, edges inclusive of left/top, exclusive of right/bottom.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    pub const fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self { left, top, right, bottom }
    }

    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }
}

/// The 3D viewport: window placement, projection centre, clip edges
/// (inclusive, relative to the window) and depth range.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Viewport {
    pub min_x: i32,
    pub min_y: i32,
    pub width: i32,
    pub height: i32,
    pub center_x: i32,
    pub center_y: i32,
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
    /// Near plane, W2V-scaled.
    pub near_z: i32,
    /// Far plane, W2V-scaled.
    pub far_z: i32,
    /// Perspective divisor.
    pub persp: i32,
}

impl Viewport {
    /// Viewport at (`min_x`, `min_y`) of the given size with a horizontal
    /// field of view in degrees.
    pub fn new(min_x: i32, min_y: i32, width: i32, height: i32, fov_degrees: i32) -> Self {
        let half = (fov_degrees.clamp(10, 160) as f64).to_radians() / 2.0;
        let persp = ((width / 2) as f64 / half.tan()).round() as i32;
        Self {
            min_x,
            min_y,
            width,
            height,
            center_x: width / 2,
            center_y: height / 2,
            left: 0,
            top: 0,
            right: width - 1,
            bottom: height - 1,
            near_z: DEFAULT_NEAR_Z << W2V_SHIFT,
            far_z: DEFAULT_FAR_Z << W2V_SHIFT,
            persp: persp.max(1),
        }
    }

    pub fn max_x(&self) -> i32 {
        self.width - 1
    }

    pub fn max_y(&self) -> i32 {
        self.height - 1
    }

    /// Window rectangle in screen coordinates.
    pub fn rect(&self) -> Rect {
        Rect::new(self.min_x, self.min_y, self.min_x + self.width, self.min_y + self.height)
    }

    /// Scale a 640x480-based UI unit to this resolution.
    pub fn render_scale(&self, unit: i32) -> i32 {
        let (base_w, base_h) = (640i64, 480i64);
        let scale_x = if self.width as i64 > base_w {
            (self.width as i64 * unit as i64 / base_w) as i32
        } else {
            unit
        };
        let scale_y = if self.height as i64 > base_h {
            (self.height as i64 * unit as i64 / base_h) as i32
        } else {
            unit
        };
        scale_x.min(scale_y)
    }
}

// ============================================================
// Rooms and lights
// ============================================================

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct RoomFlags: u16 {
        const UNDERWATER  = 0x01;
        const SKYBOX      = 0x08;
        /// Vertex lights were changed by a dynamic light and must be reset.
        const DYNAMIC_LIT = 0x10;
        const OUTSIDE     = 0x20;
    }
}

/// Static light placed in a room at level load.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RoomLight {
    pub pos: PhdVector,
    pub intensity1: i32,
    pub intensity2: i32,
    pub falloff1: i32,
    pub falloff2: i32,
}

/// Room geometry vertex with cached lighting. Coordinates are room-local.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RoomVertex {
    pub x: i32,
    pub y: i32,
    pub z: i32,
    /// Light value baked at level load.
    pub light_base: i32,
    /// Phase into the room light table for animated light modes.
    pub light_table_value: u8,
    /// Light used for drawing this frame.
    pub light_adder: i32,
}

#[derive(Clone, Debug, Default)]
pub struct Room {
    /// World position of the room origin (x, z) and floor reference (y).
    pub x: i32,
    pub y: i32,
    pub z: i32,
    /// Sector counts along world x and z.
    pub x_sectors: i32,
    pub z_sectors: i32,
    pub ambient: i32,
    /// Index into the room light shades (0 = static lighting).
    pub light_mode: usize,
    pub lights: Vec<RoomLight>,
    pub vertices: Vec<RoomVertex>,
    pub flags: RoomFlags,
}

/// Transient point light created by an effect.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DynamicLight {
    pub pos: PhdVector,
    /// log2 of the peak shade.
    pub intensity: i32,
    /// log2 of the radius.
    pub falloff: i32,
    /// Frames this light survives `age`; 0 means this frame only.
    pub frames_left: u32,
}

impl DynamicLight {
    pub fn radius(&self) -> i32 {
        1i32.wrapping_shl(self.falloff as u32)
    }

    /// Shade this light adds at the given offset from it, or None when out
    /// of range. The axis test runs before the squared distance.
    pub fn shade_at(&self, dx: i32, dy: i32, dz: i32) -> Option<i32> {
        let radius = self.radius();
        let near = radius.wrapping_neg();
        if dx < near || dx > radius || dy < near || dy > radius || dz < near || dz > radius {
            return None;
        }
        let distance = dx
            .wrapping_mul(dx)
            .wrapping_add(dy.wrapping_mul(dy))
            .wrapping_add(dz.wrapping_mul(dz));
        if distance > radius.wrapping_mul(radius) {
            return None;
        }
        let shift = self.falloff.wrapping_mul(2).wrapping_sub(self.intensity) as u32;
        Some(1i32.wrapping_shl(self.intensity as u32).wrapping_sub(distance.wrapping_shr(shift)))
    }
}

/// The frame's transient light list with a fixed capacity.
#[derive(Clone, Debug, Default)]
pub struct DynamicLights {
    lights: Vec<DynamicLight>,
}

impl DynamicLights {
    pub fn new() -> Self {
        Self { lights: Vec::with_capacity(MAX_DYNAMICS) }
    }

    /// Add a light. Returns false when the list is full.
    pub fn add(&mut self, light: DynamicLight) -> bool {
        if self.lights.len() >= MAX_DYNAMICS {
            log::debug!("dynamic light list full, light at {:?} dropped", light.pos);
            return false;
        }
        self.lights.push(light);
        true
    }

    pub fn clear(&mut self) {
        self.lights.clear();
    }

    /// Drop expired lights and count down the rest. Called once per frame.
    pub fn age(&mut self) {
        self.lights.retain_mut(|l| {
            if l.frames_left == 0 {
                return false;
            }
            l.frames_left -= 1;
            true
        });
    }

    pub fn len(&self) -> usize {
        self.lights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lights.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DynamicLight> {
        self.lights.iter()
    }
}

// ============================================================
// Settings
// ============================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderMode {
    Software,
    Hardware,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShadowMode {
    Octagon,
    Circle,
}

/// Distance fog.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FogParams {
    pub start: i32,
    pub end: i32,
}

impl Default for FogParams {
    fn default() -> Self {
        Self { start: DEPTHQ_START, end: DEPTHQ_END }
    }
}

impl FogParams {
    /// Shade added at view depth `depth` (world units). With the default
    /// range this is exactly `depth - start`.
    pub fn shade(&self, depth: i32) -> i32 {
        if depth <= self.start {
            return 0;
        }
        let range = self.end - self.start;
        if range <= 0 {
            return depth - self.start;
        }
        ((depth - self.start) as i64 * (MAX_SHADE + 1) as i64 / range as i64) as i32
    }
}

/// Render configuration, read from cvars.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderSettings {
    pub render_mode: RenderMode,
    pub fullscreen: bool,
    pub triple_buffering: bool,
    pub zbuffer: bool,
    pub dont_sort_primitives: bool,
    /// 8-bit windowed display: the system keeps palette ends.
    pub windowed_vga: bool,
    pub shadow_mode: ShadowMode,
    pub fog: FogParams,
    /// Dim the captured background on the pause screen.
    pub pause_background: bool,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            render_mode: RenderMode::Software,
            fullscreen: true,
            triple_buffering: false,
            zbuffer: true,
            dont_sort_primitives: false,
            windowed_vga: false,
            shadow_mode: ShadowMode::Circle,
            fog: FogParams::default(),
            pause_background: true,
        }
    }
}

impl RenderSettings {
    /// Create every render cvar with its default value.
    pub fn register_cvars(cvars: &mut CvarContext) {
        let archive = CVAR_ARCHIVE;
        cvars.get("r_mode", "0", archive | CVAR_LATCH);
        cvars.get("r_fullscreen", "1", archive | CVAR_LATCH);
        cvars.get("r_triple_buffer", "0", archive | CVAR_LATCH);
        cvars.get("r_zbuffer", "1", archive);
        cvars.get("r_dont_sort", "0", archive);
        cvars.get("r_windowed_vga", "0", CvarFlags::empty());
        cvars.get("r_shadow_mode", "1", archive);
        cvars.get("r_fog_start", &DEPTHQ_START.to_string(), archive);
        cvars.get("r_fog_end", &DEPTHQ_END.to_string(), archive);
        cvars.get("r_pause_background", "1", archive);
    }

    pub fn from_cvars(cvars: &CvarContext) -> Self {
        let flag = |name: &str| cvars.variable_value(name) != 0.0;
        let fog_start = cvars.variable_value("r_fog_start") as i32;
        let fog_end = cvars.variable_value("r_fog_end") as i32;
        Self {
            render_mode: if cvars.variable_value("r_mode") as i32 == 1 {
                RenderMode::Hardware
            } else {
                RenderMode::Software
            },
            fullscreen: flag("r_fullscreen"),
            triple_buffering: flag("r_triple_buffer"),
            zbuffer: flag("r_zbuffer"),
            dont_sort_primitives: flag("r_dont_sort"),
            windowed_vga: flag("r_windowed_vga"),
            shadow_mode: if cvars.variable_value("r_shadow_mode") as i32 == 0 {
                ShadowMode::Octagon
            } else {
                ShadowMode::Circle
            },
            fog: if fog_end > fog_start {
                FogParams { start: fog_start, end: fog_end }
            } else {
                FogParams::default()
            },
            pause_background: flag("r_pause_background"),
        }
    }
}

// ============================================================
// Tests
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;

    // ============================================================
    // Viewport
    // ============================================================

    #[test]
    fn test_viewport_edges() {
        let vp = Viewport::new(0, 0, 640, 480, 80);
        assert_eq!((vp.center_x, vp.center_y), (320, 240));
        assert_eq!((vp.right, vp.bottom), (639, 479));
        assert_eq!(vp.max_x(), 639);
        assert_eq!(vp.rect(), Rect::new(0, 0, 640, 480));
    }

    #[test]
    fn test_viewport_persp_90_degrees() {
        // tan(45) = 1 so the divisor is half the width
        let vp = Viewport::new(0, 0, 640, 480, 90);
        assert_eq!(vp.persp, 320);
    }

    #[test]
    fn test_render_scale() {
        assert_eq!(Viewport::new(0, 0, 640, 480, 80).render_scale(100), 100);
        assert_eq!(Viewport::new(0, 0, 1280, 960, 80).render_scale(100), 200);
        // limited by the smaller axis
        assert_eq!(Viewport::new(0, 0, 1920, 720, 80).render_scale(100), 150);
        assert_eq!(Viewport::new(0, 0, 320, 240, 80).render_scale(100), 100);
    }

    // ============================================================
    // Dynamic lights
    // ============================================================

    fn light(x: i32, y: i32, z: i32) -> DynamicLight {
        DynamicLight { pos: PhdVector::new(x, y, z), intensity: 12, falloff: 10, frames_left: 0 }
    }

    #[test]
    fn test_dynamic_light_shade_at_centre() {
        assert_eq!(light(0, 0, 0).shade_at(0, 0, 0), Some(1 << 12));
    }

    #[test]
    fn test_dynamic_light_shade_falloff() {
        // distance 512^2 = 0x40000, shift 2*10-12 = 8 => 0x400
        assert_eq!(light(0, 0, 0).shade_at(512, 0, 0), Some(0x1000 - 0x400));
    }

    #[test]
    fn test_dynamic_light_out_of_box() {
        assert_eq!(light(0, 0, 0).shade_at(1025, 0, 0), None);
    }

    #[test]
    fn test_dynamic_light_out_of_sphere() {
        // inside the box but beyond the radius diagonally
        assert_eq!(light(0, 0, 0).shade_at(1000, 1000, 0), None);
    }

    #[test]
    fn test_dynamic_light_malformed_values_wrap() {
        // falloff 31 wraps the radius to i32::MIN, so nothing is in range
        let wide = DynamicLight { falloff: 31, intensity: 40, ..light(0, 0, 0) };
        assert_eq!(wide.radius(), i32::MIN);
        assert_eq!(wide.shade_at(0, 0, 0), None);
        assert_eq!(wide.shade_at(i32::MAX, i32::MIN, 0), None);

        // shift amounts are masked to 5 bits: 1 << (99 & 31)
        let odd = DynamicLight { falloff: -3, intensity: 99, ..light(0, 0, 0) };
        assert_eq!(odd.shade_at(0, 0, 0), Some(8));
    }

    #[test]
    fn test_dynamic_list_capacity() {
        let mut list = DynamicLights::new();
        for i in 0..MAX_DYNAMICS {
            assert!(list.add(light(i as i32, 0, 0)));
        }
        assert!(!list.add(light(0, 0, 0)));
        assert_eq!(list.len(), MAX_DYNAMICS);
    }

    #[test]
    fn test_dynamic_list_age() {
        let mut list = DynamicLights::new();
        list.add(light(0, 0, 0));
        list.add(DynamicLight { frames_left: 2, ..light(1, 0, 0) });
        list.age();
        assert_eq!(list.len(), 1);
        list.age();
        assert_eq!(list.len(), 1);
        list.age();
        assert!(list.is_empty());
    }

    // ============================================================
    // Fog
    // ============================================================

    #[test]
    fn test_fog_default_matches_depth_offset() {
        let fog = FogParams::default();
        assert_eq!(fog.shade(DEPTHQ_START), 0);
        assert_eq!(fog.shade(DEPTHQ_START + 100), 100);
        assert_eq!(fog.shade(DEPTHQ_END), DEPTHQ_RANGE);
    }

    #[test]
    fn test_fog_custom_range_scales() {
        let fog = FogParams { start: 0x1000, end: 0x2000 };
        assert_eq!(fog.shade(0x1800), 0x1000);
    }

    // ============================================================
    // Settings
    // ============================================================

    #[test]
    fn test_settings_defaults_from_cvars() {
        let mut cvars = CvarContext::new();
        RenderSettings::register_cvars(&mut cvars);
        assert_eq!(RenderSettings::from_cvars(&cvars), RenderSettings::default());
    }

    #[test]
    fn test_settings_hardware_after_latch() {
        let mut cvars = CvarContext::new();
        RenderSettings::register_cvars(&mut cvars);
        cvars.set("r_mode", "1");
        cvars.set("r_shadow_mode", "0");
        let s = RenderSettings::from_cvars(&cvars);
        assert_eq!(s.render_mode, RenderMode::Software);
        assert_eq!(s.shadow_mode, ShadowMode::Octagon);
        cvars.get_latched_vars();
        assert_eq!(RenderSettings::from_cvars(&cvars).render_mode, RenderMode::Hardware);
    }

    #[test]
    fn test_settings_bad_fog_range_falls_back() {
        let mut cvars = CvarContext::new();
        RenderSettings::register_cvars(&mut cvars);
        cvars.set("r_fog_start", "9000");
        cvars.set("r_fog_end", "100");
        assert_eq!(RenderSettings::from_cvars(&cvars).fog, FogParams::default());
    }
}
