// phd_math.rs — Fixed-point trigonometry and the model-to-view matrix stack
//
// All values are integers. Matrix rotation entries carry a 14-bit fraction
// (W2V_SHIFT) and angles use 16-bit units where 0x10000 is a full turn.

use std::ops::{Deref, DerefMut};
use std::sync::OnceLock;

// ============================================================
// Constants
// ============================================================

pub const W2V_SHIFT: i32 = 14;
pub const PHD_ONE: i32 = 0x10000;
pub const PHD_IONE: i32 = 1 << W2V_SHIFT;

pub const PHD_360: i32 = 0x10000;
pub const PHD_180: i32 = 0x8000;
pub const PHD_90: i32 = 0x4000;
pub const PHD_45: i32 = 0x2000;

/// One world "block" (a room sector edge).
pub const WALL_L: i32 = 0x400;

const SIN_TABLE_SIZE: usize = 0x401;

// ============================================================
// Trigonometry
// ============================================================

/// Quarter-wave sine table, 14-bit fixed point.
fn sin_table() -> &'static [i32; SIN_TABLE_SIZE] {
    static TABLE: OnceLock<[i32; SIN_TABLE_SIZE]> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut table = [0i32; SIN_TABLE_SIZE];
        for (i, entry) in table.iter_mut().enumerate() {
            let rad = i as f64 * std::f64::consts::FRAC_PI_2 / 1024.0;
            *entry = (rad.sin() * PHD_IONE as f64).round() as i32;
        }
        table
    })
}

/// Fixed-point sine. Any i32 is accepted; only the low 16 bits matter.
pub fn phd_sin(angle: i32) -> i32 {
    let a = ((angle as u16) >> 4) as usize;
    let table = sin_table();
    match a & 0xC00 {
        0x000 => table[a],
        0x400 => table[0x800 - a],
        0x800 => -table[a - 0x800],
        _ => -table[0x1000 - a],
    }
}

/// Fixed-point cosine.
pub fn phd_cos(angle: i32) -> i32 {
    phd_sin(angle.wrapping_add(PHD_90))
}

/// Angle of the vector (x, y) measured from the +x axis, in 16-bit units.
pub fn phd_atan(x: i32, y: i32) -> i32 {
    if x == 0 && y == 0 {
        return 0;
    }
    let rad = (y as f64).atan2(x as f64);
    let angle = (rad * PHD_180 as f64 / std::f64::consts::PI).round() as i32;
    angle as i16 as i32
}

/// Integer square root (floor).
pub fn phd_sqrt(n: i64) -> i32 {
    if n <= 0 {
        return 0;
    }
    let mut root = (n as f64).sqrt() as i64;
    while root * root > n {
        root -= 1;
    }
    while (root + 1) * (root + 1) <= n {
        root += 1;
    }
    root as i32
}

/// Yaw and pitch of an offset vector, as used for directional lighting.
/// Yaw 0 points along +z; a positive y component yields a negative pitch.
pub fn get_vector_angles(x: i32, y: i32, z: i32) -> (i32, i32) {
    let yaw = phd_atan(z, x);
    let horizontal = phd_sqrt(x as i64 * x as i64 + z as i64 * z as i64);
    let mut pitch = phd_atan(horizontal, y);
    if (y > 0 && pitch > 0) || (y < 0 && pitch < 0) {
        pitch = -pitch;
    }
    (yaw, pitch)
}

// ============================================================
// Vectors
// ============================================================

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PhdVector {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl PhdVector {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }
}

// ============================================================
// Matrix
// ============================================================

/// 3x4 model-to-view matrix. Rotation part is 14-bit fixed point; the
/// translation column is view-space position shifted left by W2V_SHIFT.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PhdMatrix {
    pub m00: i32,
    pub m01: i32,
    pub m02: i32,
    pub m03: i32,
    pub m10: i32,
    pub m11: i32,
    pub m12: i32,
    pub m13: i32,
    pub m20: i32,
    pub m21: i32,
    pub m22: i32,
    pub m23: i32,
}

impl Default for PhdMatrix {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl PhdMatrix {
    #[rustfmt::skip]
    pub const IDENTITY: PhdMatrix = PhdMatrix {
        m00: PHD_IONE, m01: 0, m02: 0, m03: 0,
        m10: 0, m11: PHD_IONE, m12: 0, m13: 0,
        m20: 0, m21: 0, m22: PHD_IONE, m23: 0,
    };

    /// Transform an object-local point to view space (still W2V-scaled).
    /// Accumulates in 64 bits so large rooms cannot wrap.
    pub fn transform(&self, x: i32, y: i32, z: i32) -> (i64, i64, i64) {
        let (x, y, z) = (x as i64, y as i64, z as i64);
        (
            self.m00 as i64 * x + self.m01 as i64 * y + self.m02 as i64 * z + self.m03 as i64,
            self.m10 as i64 * x + self.m11 as i64 * y + self.m12 as i64 * z + self.m13 as i64,
            self.m20 as i64 * x + self.m21 as i64 * y + self.m22 as i64 * z + self.m23 as i64,
        )
    }

    /// Rotate a direction by the rotation part only, result unshifted.
    pub fn rotate(&self, x: i32, y: i32, z: i32) -> PhdVector {
        let (x, y, z) = (x as i64, y as i64, z as i64);
        PhdVector {
            x: ((self.m00 as i64 * x + self.m01 as i64 * y + self.m02 as i64 * z) >> W2V_SHIFT) as i32,
            y: ((self.m10 as i64 * x + self.m11 as i64 * y + self.m12 as i64 * z) >> W2V_SHIFT) as i32,
            z: ((self.m20 as i64 * x + self.m21 as i64 * y + self.m22 as i64 * z) >> W2V_SHIFT) as i32,
        }
    }

    /// View-space depth of the matrix origin in world units.
    pub fn depth(&self) -> i32 {
        self.m23 >> W2V_SHIFT
    }
}

// ============================================================
// Matrix stack
// ============================================================

/// Implicit transform stack. The bottom entry is the world-to-view matrix;
/// `camera` holds the world position the view translation is relative to.
#[derive(Clone, Debug)]
pub struct MatrixStack {
    stack: Vec<PhdMatrix>,
    camera: PhdVector,
}

impl Default for MatrixStack {
    fn default() -> Self {
        Self::new()
    }
}

impl MatrixStack {
    pub fn new() -> Self {
        Self {
            stack: vec![PhdMatrix::IDENTITY],
            camera: PhdVector::default(),
        }
    }

    /// Reset the stack to a single world-to-view matrix.
    pub fn set_w2v(&mut self, w2v: PhdMatrix, camera: PhdVector) {
        self.stack.clear();
        self.stack.push(w2v);
        self.camera = camera;
    }

    /// Top of stack.
    pub fn current(&self) -> &PhdMatrix {
        // the stack is never empty: pop refuses to remove the base entry
        &self.stack[self.stack.len() - 1]
    }

    fn current_mut(&mut self) -> &mut PhdMatrix {
        let top = self.stack.len() - 1;
        &mut self.stack[top]
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn push(&mut self) {
        let top = *self.current();
        self.stack.push(top);
    }

    pub fn pop(&mut self) {
        if self.stack.len() > 1 {
            self.stack.pop();
        } else {
            log::warn!("matrix stack underflow ignored");
        }
    }

    /// Push and return a guard that pops when dropped.
    pub fn push_scoped(&mut self) -> MatrixGuard<'_> {
        self.push();
        MatrixGuard { stack: self }
    }

    /// Replace the top of stack.
    pub fn load(&mut self, m: PhdMatrix) {
        *self.current_mut() = m;
    }

    /// Reset the rotation of the top matrix to identity.
    #[rustfmt::skip]
    pub fn unit(&mut self) {
        let m = self.current_mut();
        m.m00 = PHD_IONE; m.m01 = 0; m.m02 = 0;
        m.m10 = 0; m.m11 = PHD_IONE; m.m12 = 0;
        m.m20 = 0; m.m21 = 0; m.m22 = PHD_IONE;
    }

    /// Position the top matrix at an absolute world location.
    pub fn translate_abs(&mut self, x: i32, y: i32, z: i32) {
        let dx = x.wrapping_sub(self.camera.x);
        let dy = y.wrapping_sub(self.camera.y);
        let dz = z.wrapping_sub(self.camera.z);
        let m = self.current_mut();
        m.m03 = m.m00.wrapping_mul(dx).wrapping_add(m.m01.wrapping_mul(dy)).wrapping_add(m.m02.wrapping_mul(dz));
        m.m13 = m.m10.wrapping_mul(dx).wrapping_add(m.m11.wrapping_mul(dy)).wrapping_add(m.m12.wrapping_mul(dz));
        m.m23 = m.m20.wrapping_mul(dx).wrapping_add(m.m21.wrapping_mul(dy)).wrapping_add(m.m22.wrapping_mul(dz));
    }

    /// Move the top matrix by an offset in its own local frame.
    pub fn translate_rel(&mut self, x: i32, y: i32, z: i32) {
        let m = self.current_mut();
        m.m03 = m.m03.wrapping_add(m.m00.wrapping_mul(x).wrapping_add(m.m01.wrapping_mul(y)).wrapping_add(m.m02.wrapping_mul(z)));
        m.m13 = m.m13.wrapping_add(m.m10.wrapping_mul(x).wrapping_add(m.m11.wrapping_mul(y)).wrapping_add(m.m12.wrapping_mul(z)));
        m.m23 = m.m23.wrapping_add(m.m20.wrapping_mul(x).wrapping_add(m.m21.wrapping_mul(y)).wrapping_add(m.m22.wrapping_mul(z)));
    }

    pub fn rot_x(&mut self, rx: i32) {
        if rx as i16 == 0 {
            return;
        }
        let (s, c) = (phd_sin(rx), phd_cos(rx));
        let m = self.current_mut();
        let r0 = (m.m01 * c + m.m02 * s) >> W2V_SHIFT;
        let r1 = (m.m02 * c - m.m01 * s) >> W2V_SHIFT;
        m.m01 = r0;
        m.m02 = r1;
        let r0 = (m.m11 * c + m.m12 * s) >> W2V_SHIFT;
        let r1 = (m.m12 * c - m.m11 * s) >> W2V_SHIFT;
        m.m11 = r0;
        m.m12 = r1;
        let r0 = (m.m21 * c + m.m22 * s) >> W2V_SHIFT;
        let r1 = (m.m22 * c - m.m21 * s) >> W2V_SHIFT;
        m.m21 = r0;
        m.m22 = r1;
    }

    pub fn rot_y(&mut self, ry: i32) {
        if ry as i16 == 0 {
            return;
        }
        let (s, c) = (phd_sin(ry), phd_cos(ry));
        let m = self.current_mut();
        let r0 = (m.m00 * c - m.m02 * s) >> W2V_SHIFT;
        let r1 = (m.m02 * c + m.m00 * s) >> W2V_SHIFT;
        m.m00 = r0;
        m.m02 = r1;
        let r0 = (m.m10 * c - m.m12 * s) >> W2V_SHIFT;
        let r1 = (m.m12 * c + m.m10 * s) >> W2V_SHIFT;
        m.m10 = r0;
        m.m12 = r1;
        let r0 = (m.m20 * c - m.m22 * s) >> W2V_SHIFT;
        let r1 = (m.m22 * c + m.m20 * s) >> W2V_SHIFT;
        m.m20 = r0;
        m.m22 = r1;
    }

    pub fn rot_z(&mut self, rz: i32) {
        if rz as i16 == 0 {
            return;
        }
        let (s, c) = (phd_sin(rz), phd_cos(rz));
        let m = self.current_mut();
        let r0 = (m.m00 * c + m.m01 * s) >> W2V_SHIFT;
        let r1 = (m.m01 * c - m.m00 * s) >> W2V_SHIFT;
        m.m00 = r0;
        m.m01 = r1;
        let r0 = (m.m10 * c + m.m11 * s) >> W2V_SHIFT;
        let r1 = (m.m11 * c - m.m10 * s) >> W2V_SHIFT;
        m.m10 = r0;
        m.m11 = r1;
        let r0 = (m.m20 * c + m.m21 * s) >> W2V_SHIFT;
        let r1 = (m.m21 * c - m.m20 * s) >> W2V_SHIFT;
        m.m20 = r0;
        m.m21 = r1;
    }

    /// Yaw, then pitch, then roll; entities are oriented in this order.
    pub fn rot_yxz(&mut self, ry: i32, rx: i32, rz: i32) {
        self.rot_y(ry);
        self.rot_x(rx);
        self.rot_z(rz);
    }
}

/// Scoped push: the matrix pushed on creation is popped on drop, so an
/// early return cannot leave the stack unbalanced.
pub struct MatrixGuard<'a> {
    stack: &'a mut MatrixStack,
}

impl Deref for MatrixGuard<'_> {
    type Target = MatrixStack;

    fn deref(&self) -> &MatrixStack {
        self.stack
    }
}

impl DerefMut for MatrixGuard<'_> {
    fn deref_mut(&mut self) -> &mut MatrixStack {
        self.stack
    }
}

impl Drop for MatrixGuard<'_> {
    fn drop(&mut self) {
        self.stack.pop();
    }
}

// ============================================================
// Tests
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;

    // ============================================================
    // Trigonometry
    // ============================================================

    #[test]
    fn test_sin_cardinal_angles() {
        assert_eq!(phd_sin(0), 0);
        assert_eq!(phd_sin(PHD_90), PHD_IONE);
        assert_eq!(phd_sin(PHD_180), 0);
        assert_eq!(phd_sin(PHD_180 + PHD_90), -PHD_IONE);
        assert_eq!(phd_sin(PHD_360), 0);
    }

    #[test]
    fn test_cos_cardinal_angles() {
        assert_eq!(phd_cos(0), PHD_IONE);
        assert_eq!(phd_cos(PHD_90), 0);
        assert_eq!(phd_cos(PHD_180), -PHD_IONE);
    }

    #[test]
    fn test_sin_45_degrees() {
        // 0x4000 * sqrt(2)/2 = 11585.2
        assert_eq!(phd_sin(PHD_45), 11585);
        assert_eq!(phd_cos(PHD_45), 11585);
    }

    #[test]
    fn test_sin_negative_angle_wraps() {
        assert_eq!(phd_sin(-PHD_90), -PHD_IONE);
    }

    #[test]
    fn test_atan_axes() {
        assert_eq!(phd_atan(1, 0), 0);
        assert_eq!(phd_atan(0, 1), PHD_90);
        assert_eq!(phd_atan(0, -1), -PHD_90);
        assert_eq!(phd_atan(0, 0), 0);
    }

    #[test]
    fn test_sqrt_floor() {
        assert_eq!(phd_sqrt(0), 0);
        assert_eq!(phd_sqrt(15), 3);
        assert_eq!(phd_sqrt(16), 4);
        assert_eq!(phd_sqrt(1 << 40), 1 << 20);
        assert_eq!(phd_sqrt(-5), 0);
    }

    #[test]
    fn test_vector_angles_straight_down() {
        // light above the point: offset points down (+y in this world)
        let (yaw, pitch) = get_vector_angles(0, 100, 0);
        assert_eq!(yaw, 0);
        assert_eq!(pitch, -PHD_90);
    }

    #[test]
    fn test_vector_angles_along_x() {
        let (yaw, pitch) = get_vector_angles(100, 0, 0);
        assert_eq!(yaw, PHD_90);
        assert_eq!(pitch, 0);
    }

    // ============================================================
    // Matrix stack
    // ============================================================

    #[test]
    fn test_push_pop_restores() {
        let mut stack = MatrixStack::new();
        stack.translate_rel(10, 20, 30);
        let before = *stack.current();
        stack.push();
        stack.translate_rel(1, 1, 1);
        assert_ne!(*stack.current(), before);
        stack.pop();
        assert_eq!(*stack.current(), before);
    }

    #[test]
    fn test_pop_never_removes_base() {
        let mut stack = MatrixStack::new();
        stack.pop();
        stack.pop();
        assert_eq!(stack.depth(), 1);
    }

    #[test]
    fn test_guard_pops_on_drop() {
        let mut stack = MatrixStack::new();
        {
            let mut guard = stack.push_scoped();
            guard.translate_rel(100, 0, 0);
            assert_eq!(guard.depth(), 2);
        }
        assert_eq!(stack.depth(), 1);
        assert_eq!(stack.current().m03, 0);
    }

    #[test]
    fn test_guard_pops_on_early_return() {
        fn draw(stack: &mut MatrixStack, bail: bool) -> Option<()> {
            let mut guard = stack.push_scoped();
            guard.translate_rel(5, 5, 5);
            if bail {
                return None;
            }
            Some(())
        }
        let mut stack = MatrixStack::new();
        assert!(draw(&mut stack, true).is_none());
        assert_eq!(stack.depth(), 1);
    }

    #[test]
    fn test_translate_rel_identity() {
        let mut stack = MatrixStack::new();
        stack.translate_rel(3, 4, 5);
        let m = stack.current();
        assert_eq!(m.m03, 3 << W2V_SHIFT);
        assert_eq!(m.m13, 4 << W2V_SHIFT);
        assert_eq!(m.m23, 5 << W2V_SHIFT);
        assert_eq!(m.depth(), 5);
    }

    #[test]
    fn test_translate_abs_relative_to_camera() {
        let mut stack = MatrixStack::new();
        stack.set_w2v(PhdMatrix::IDENTITY, PhdVector::new(1000, 0, 1000));
        stack.translate_abs(1000, 0, 3048);
        assert_eq!(stack.current().depth(), 2048);
    }

    #[test]
    fn test_rot_y_quarter_turn() {
        let mut stack = MatrixStack::new();
        stack.rot_y(PHD_90);
        // local +z now maps to view +x
        let v = stack.current().rotate(0, 0, 1024);
        assert_eq!(v, PhdVector::new(1024, 0, 0));
    }

    #[test]
    fn test_rot_zero_is_noop() {
        let mut stack = MatrixStack::new();
        stack.rot_yxz(0, 0, 0);
        assert_eq!(*stack.current(), PhdMatrix::IDENTITY);
    }

    #[test]
    fn test_unit_resets_rotation_only() {
        let mut stack = MatrixStack::new();
        stack.translate_rel(7, 0, 0);
        stack.rot_x(PHD_45);
        stack.unit();
        let m = stack.current();
        assert_eq!(m.m00, PHD_IONE);
        assert_eq!(m.m11, PHD_IONE);
        assert_eq!(m.m03, 7 << W2V_SHIFT);
    }
}
