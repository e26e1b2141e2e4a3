// r_light.rs — point lighting, room vertex light tables and light animation

use rand::Rng;
use tr2_common::phd_math::{
    get_vector_angles, phd_cos, phd_sin, PhdMatrix, PhdVector, PHD_360, PHD_IONE, W2V_SHIFT, WALL_L,
};

use crate::r_local::{
    DynamicLights, FogParams, Room, RoomFlags, MAX_SHADE, NEUTRAL_SHADE, SUNSET_TIMEOUT, TICKS_PER_FRAME,
    WIBBLE_SIZE,
};

/// Room light modes: 0 static, 1 flicker, 2 pulse, 3 sunset.
pub const NUM_LIGHT_MODES: usize = 4;

/// Peak vertex light change of the animated room light tables.
pub const ROOMLIGHT_UNIT: i32 = 0x40;

const WIBBLE: usize = WIBBLE_SIZE as usize;

/// Lighting state for the frame: the shade pair consumed by vertex shading,
/// the animated light mode shades and the transient light list.
pub struct Lighting {
    /// Base shade for the current object (0 brightest, 0x1FFF darkest).
    pub ls_adder: i32,
    /// Directional scale; 0 means flat shading.
    pub ls_divider: i32,
    /// World-space direction from the brightest light to the lit point,
    /// length PHD_IONE / 4.
    pub ls_vector: PhdVector,
    /// Current interpolation factor (0..=31) of each light mode.
    pub room_light_shades: [i32; NUM_LIGHT_MODES],
    pub wibble_offset: i32,
    pub dynamics: DynamicLights,
    pub fog: FogParams,
    pub sunset_enabled: bool,
    room_light_tables: Box<[[i32; WIBBLE]; WIBBLE]>,
}

impl Default for Lighting {
    fn default() -> Self {
        Self::new(FogParams::default())
    }
}

impl Lighting {
    pub fn new(fog: FogParams) -> Self {
        Self {
            ls_adder: 0,
            ls_divider: 0,
            ls_vector: PhdVector::default(),
            room_light_shades: [0; NUM_LIGHT_MODES],
            wibble_offset: 0,
            dynamics: DynamicLights::new(),
            fog,
            sunset_enabled: false,
            room_light_tables: build_room_light_tables(),
        }
    }

    /// Shade of a light mode. Unknown modes read as unlit (0).
    fn mode_shade(&self, mode: usize) -> i32 {
        self.room_light_shades.get(mode).copied().unwrap_or(0)
    }

    // ============================================================
    // Per-object lighting
    // ============================================================

    /// Light a point in `room` and leave the result in `ls_adder`,
    /// `ls_divider` and `ls_vector`. `m` is the object's current matrix and
    /// supplies the fog depth.
    pub fn calculate_light(&mut self, x: i32, y: i32, z: i32, room: &Room, m: &PhdMatrix) {
        let mut brightest = 0i32;
        let mut brightest_offset = (0i32, 0i32, 0i32);

        let light_shade = (room.light_mode != 0).then(|| self.mode_shade(room.light_mode));
        for light in &room.lights {
            let dx = x.wrapping_sub(light.pos.x);
            let dy = y.wrapping_sub(light.pos.y);
            let dz = z.wrapping_sub(light.pos.z);
            let distance = sqr_sum(dx, dy, dz) >> 12;

            let shade1 = static_shade(light.falloff1, light.intensity1, distance);
            let shade = match light_shade {
                Some(wobble) => {
                    let shade2 = static_shade(light.falloff2, light.intensity2, distance);
                    shade1.wrapping_add(shade2.wrapping_sub(shade1).wrapping_mul(wobble) / (WIBBLE_SIZE - 1))
                }
                None => shade1,
            };

            if shade > brightest {
                brightest = shade;
                brightest_offset = (dx, dy, dz);
            }
        }

        let mut adder = brightest;
        for light in self.dynamics.iter() {
            let dx = x.wrapping_sub(light.pos.x);
            let dy = y.wrapping_sub(light.pos.y);
            let dz = z.wrapping_sub(light.pos.z);
            let Some(shade) = light.shade_at(dx, dy, dz) else {
                continue;
            };
            if shade > brightest {
                brightest = shade;
                brightest_offset = (dx, dy, dz);
            }
            adder = adder.wrapping_add(shade);
        }

        adder /= 2;
        if adder == 0 {
            self.ls_adder = room.ambient;
            self.ls_divider = 0;
        } else {
            self.ls_adder = room.ambient.wrapping_sub(adder);
            self.ls_divider = (1 << (W2V_SHIFT + 12)) / adder;
            let (yaw, pitch) = get_vector_angles(brightest_offset.0, brightest_offset.1, brightest_offset.2);
            self.rotate_light(pitch, yaw);
        }

        self.ls_adder = self.apply_fog(self.ls_adder, m);
    }

    /// Flat lighting from a precomputed shade (0x1000 is neutral).
    pub fn calculate_static_light(&mut self, adder: i32, m: &PhdMatrix) {
        self.ls_divider = 0;
        self.ls_adder = self.apply_fog(adder - NEUTRAL_SHADE, m);
    }

    /// Flat lighting for a static mesh: its baked shade (interpolated by the
    /// room light mode) brightened by any dynamic light in range.
    pub fn calculate_static_mesh_light(
        &mut self,
        x: i32,
        y: i32,
        z: i32,
        shade1: i32,
        shade2: i32,
        room: &Room,
        m: &PhdMatrix,
    ) {
        let mut adder = shade1;
        if room.light_mode != 0 {
            let wobble = self.mode_shade(room.light_mode);
            adder = adder.wrapping_add(shade2.wrapping_sub(shade1).wrapping_mul(wobble) / (WIBBLE_SIZE - 1));
        }

        for light in self.dynamics.iter() {
            let dx = x.wrapping_sub(light.pos.x);
            let dy = y.wrapping_sub(light.pos.y);
            let dz = z.wrapping_sub(light.pos.z);
            if let Some(shade) = light.shade_at(dx, dy, dz) {
                adder = adder.wrapping_sub(shade);
                if adder < 0 {
                    adder = 0;
                    break;
                }
            }
        }

        self.calculate_static_light(adder, m);
    }

    fn apply_fog(&self, adder: i32, m: &PhdMatrix) -> i32 {
        let adder = adder.saturating_add(self.fog.shade(m.depth()));
        adder.min(MAX_SHADE)
    }

    /// Point `ls_vector` along the given pitch and yaw.
    pub fn rotate_light(&mut self, pitch: i32, yaw: i32) {
        let cos_pitch = phd_cos(pitch);
        self.ls_vector = PhdVector {
            x: (cos_pitch * phd_sin(yaw)) >> (W2V_SHIFT + 2),
            y: -phd_sin(pitch) >> 2,
            z: (cos_pitch * phd_cos(yaw)) >> (W2V_SHIFT + 2),
        };
    }

    /// Shade of a vertex with the given world-space unit normal
    /// (length PHD_IONE) under the current lighting.
    pub fn vertex_shade(&self, normal: PhdVector) -> i32 {
        if self.ls_divider == 0 {
            return self.ls_adder.clamp(0, MAX_SHADE);
        }
        let v = self.ls_vector;
        let dot = v.x as i64 * normal.x as i64 + v.y as i64 * normal.y as i64 + v.z as i64 * normal.z as i64;
        (self.ls_adder as i64 + dot / self.ls_divider as i64).clamp(0, MAX_SHADE as i64) as i32
    }

    /// Shade of a vertex carrying a baked light value. After static
    /// lighting `ls_adder` is an offset onto that value.
    pub fn baked_vertex_shade(&self, light: i32) -> i32 {
        self.ls_adder.saturating_add(light).clamp(0, MAX_SHADE)
    }

    // ============================================================
    // Room vertex lights
    // ============================================================

    /// Refresh the room's per-vertex light values. Animated rooms are
    /// rebuilt from their light table every call; static rooms are only
    /// reset when the previous frame's dynamic lights touched them.
    pub fn light_room(&self, room: &mut Room) {
        if room.light_mode != 0 {
            let shade = self.mode_shade(room.light_mode).clamp(0, WIBBLE_SIZE - 1) as usize;
            let table = &self.room_light_tables[shade];
            for v in room.vertices.iter_mut() {
                v.light_adder = v.light_base.wrapping_add(table[v.light_table_value as usize % WIBBLE]);
            }
        } else if room.flags.contains(RoomFlags::DYNAMIC_LIT) {
            for v in room.vertices.iter_mut() {
                v.light_adder = v.light_base;
            }
            room.flags.remove(RoomFlags::DYNAMIC_LIT);
        }

        let x_min = WALL_L;
        let z_min = WALL_L;
        let x_max = WALL_L.wrapping_mul(room.x_sectors.wrapping_sub(1));
        let z_max = WALL_L.wrapping_mul(room.z_sectors.wrapping_sub(1));

        for light in self.dynamics.iter() {
            let x_pos = light.pos.x.wrapping_sub(room.x);
            let y_pos = light.pos.y;
            let z_pos = light.pos.z.wrapping_sub(room.z);
            let radius = light.radius();

            if x_pos.wrapping_add(radius) < x_min
                || z_pos.wrapping_add(radius) < z_min
                || x_pos.wrapping_sub(radius) > x_max
                || z_pos.wrapping_sub(radius) > z_max
            {
                continue;
            }

            room.flags.insert(RoomFlags::DYNAMIC_LIT);
            for v in room.vertices.iter_mut().filter(|v| v.light_adder != 0) {
                let (dx, dy, dz) = (v.x.wrapping_sub(x_pos), v.y.wrapping_sub(y_pos), v.z.wrapping_sub(z_pos));
                if let Some(shade) = light.shade_at(dx, dy, dz) {
                    v.light_adder = v.light_adder.wrapping_sub(shade).max(0);
                }
            }
        }
    }

    // ============================================================
    // Animation
    // ============================================================

    /// Advance the wobble and the light mode shades by `ticks`. `timer` is
    /// the level play time in frames and drives the sunset mode.
    pub fn animate_light_shades<R: Rng + ?Sized>(&mut self, ticks: i32, timer: i32, rng: &mut R) {
        self.wibble_offset = (self.wibble_offset + ticks / TICKS_PER_FRAME).rem_euclid(WIBBLE_SIZE);
        self.room_light_shades[1] = (rng.gen::<u32>() & (WIBBLE_SIZE as u32 - 1)) as i32;
        self.room_light_shades[2] =
            (WIBBLE_SIZE - 1) * (phd_sin(self.wibble_offset * PHD_360 / WIBBLE_SIZE) + PHD_IONE) / 2 / PHD_IONE;

        if self.sunset_enabled {
            let sunset = timer.saturating_mul(TICKS_PER_FRAME).clamp(0, SUNSET_TIMEOUT);
            self.room_light_shades[3] = (WIBBLE_SIZE - 1) * sunset / SUNSET_TIMEOUT;
        }
    }

    pub fn age_dynamic_lights(&mut self) {
        self.dynamics.age();
    }
}

/// `falloff² * intensity / (falloff² + distance)` with the falloff square
/// scaled down by 12 bits. A zero denominator contributes nothing.
fn static_shade(falloff: i32, intensity: i32, distance: i32) -> i32 {
    let falloff = falloff.wrapping_mul(falloff) >> 12;
    let denominator = falloff.wrapping_add(distance);
    if denominator == 0 {
        return 0;
    }
    falloff.wrapping_mul(intensity).wrapping_div(denominator)
}

fn sqr_sum(dx: i32, dy: i32, dz: i32) -> i32 {
    dx.wrapping_mul(dx).wrapping_add(dy.wrapping_mul(dy)).wrapping_add(dz.wrapping_mul(dz))
}

/// Vertex light offsets indexed by [mode shade][vertex phase]. Shade 0 is
/// flat; shade 31 swings a full `ROOMLIGHT_UNIT` either way.
fn build_room_light_tables() -> Box<[[i32; WIBBLE]; WIBBLE]> {
    let mut tables = Box::new([[0i32; WIBBLE]; WIBBLE]);
    for (shade, table) in tables.iter_mut().enumerate() {
        for (phase, entry) in table.iter_mut().enumerate() {
            *entry = (phase as i32 - WIBBLE_SIZE / 2) * shade as i32 * ROOMLIGHT_UNIT / (WIBBLE_SIZE - 1);
        }
    }
    tables
}

// ============================================================
// Tests
// ============================================================
