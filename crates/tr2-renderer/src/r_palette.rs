// r_palette.rs — 256-colour palettes, palette fades and depth-cue tables

use bytemuck::{Pod, Zeroable};
use rayon::prelude::*;
use tr2_common::pcx::PCX_PALETTE_SIZE;

pub const PALETTE_SIZE: usize = 256;

/// Palette entries kept by the windowing system at each end of the table
/// when running windowed on an 8-bit desktop.
pub const WINDOWED_RESERVED_ENTRIES: usize = 10;

pub const DEPTHQ_LEVELS: usize = 32;
/// Depth-cue level that leaves colours unchanged.
pub const DEPTHQ_NEUTRAL_LEVEL: usize = 15;
/// Depth-cue level used for shadows and dimmed backgrounds (50% darker).
pub const SHADOW_DEPTHQ_LEVEL: usize = 24;

// ============================================================
// Palette
// ============================================================

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct Rgb888 {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
}

impl Rgb888 {
    pub const BLACK: Rgb888 = Rgb888 { red: 0, green: 0, blue: 0 };

    pub const fn new(red: u8, green: u8, blue: u8) -> Self {
        Self { red, green, blue }
    }

    /// Packed 0x00RRGGBB.
    pub fn to_rgb32(self) -> u32 {
        (self.red as u32) << 16 | (self.green as u32) << 8 | self.blue as u32
    }

    fn distance_sq(self, r: i32, g: i32, b: i32) -> i32 {
        let dr = self.red as i32 - r;
        let dg = self.green as i32 - g;
        let db = self.blue as i32 - b;
        dr * dr + dg * dg + db * db
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct Palette {
    pub entries: [Rgb888; PALETTE_SIZE],
}

impl Default for Palette {
    fn default() -> Self {
        Self { entries: [Rgb888::BLACK; PALETTE_SIZE] }
    }
}

impl std::fmt::Debug for Palette {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Palette({:?}..)", &self.entries[..4])
    }
}

impl Palette {
    /// Palette from a PCX trailer (or any packed RGB triple table).
    pub fn from_rgb_bytes(raw: &[u8; PCX_PALETTE_SIZE]) -> Self {
        let mut pal = Self::default();
        pal.entries.copy_from_slice(bytemuck::cast_slice(&raw[..]));
        pal
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.entries)
    }

    /// Index of the closest entry to (r, g, b). Index 0 is the transparent
    /// slot and is never returned.
    pub fn nearest(&self, r: i32, g: i32, b: i32) -> u8 {
        let mut best = 1usize;
        let mut best_dist = i32::MAX;
        for (i, entry) in self.entries.iter().enumerate().skip(1) {
            let dist = entry.distance_sq(r, g, b);
            if dist < best_dist {
                best_dist = dist;
                best = i;
                if dist == 0 {
                    break;
                }
            }
        }
        best as u8
    }
}

/// Entries of the palette that may be changed on the display.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PaletteRange {
    pub start: usize,
    pub end: usize,
}

impl PaletteRange {
    pub const FULL: PaletteRange = PaletteRange { start: 0, end: PALETTE_SIZE };

    pub fn for_display(windowed_vga: bool) -> Self {
        if windowed_vga {
            PaletteRange {
                start: WINDOWED_RESERVED_ENTRIES,
                end: PALETTE_SIZE - WINDOWED_RESERVED_ENTRIES,
            }
        } else {
            Self::FULL
        }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

// ============================================================
// Fades
// ============================================================

/// Interpolates the display palette from a snapshot toward a target, one
/// step per displayed frame. Entries outside `range` are never touched.
pub struct PaletteFader {
    snapshot: Palette,
    target: Palette,
    steps: i32,
    step: i32,
    range: PaletteRange,
}

impl PaletteFader {
    pub fn new(current: &Palette, target: &Palette, steps: i32, range: PaletteRange) -> Self {
        Self {
            snapshot: current.clone(),
            target: target.clone(),
            steps: steps.max(1),
            step: 0,
            range,
        }
    }

    pub fn steps(&self) -> i32 {
        self.steps
    }

    pub fn is_finished(&self) -> bool {
        self.step >= self.steps
    }

    /// Write the next interpolated palette into `display`. Returns false once
    /// every step has been applied.
    pub fn next_step(&mut self, display: &mut Palette) -> bool {
        if self.is_finished() {
            return false;
        }
        self.step += 1;
        let (j, n) = (self.step, self.steps);
        for i in self.range.start..self.range.end {
            let from = self.snapshot.entries[i];
            let to = self.target.entries[i];
            display.entries[i] = Rgb888 {
                red: lerp_channel(from.red, to.red, j, n),
                green: lerp_channel(from.green, to.green, j, n),
                blue: lerp_channel(from.blue, to.blue, j, n),
            };
        }
        true
    }
}

fn lerp_channel(from: u8, to: u8, j: i32, n: i32) -> u8 {
    (from as i32 + (to as i32 - from as i32) * j / n) as u8
}

/// Copy `target` into `display` within `range` in one go.
pub fn apply_palette(display: &mut Palette, target: &Palette, range: PaletteRange) {
    display.entries[range.start..range.end].copy_from_slice(&target.entries[range.start..range.end]);
}

/// Outcome of a palette fade.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FadeOutcome {
    /// All steps were presented.
    Completed,
    /// The input poll asked to stop; the palette is left mid-fade.
    Cancelled,
    /// The active backend has no palette to fade.
    Skipped,
}

// ============================================================
// Depth-cue tables
// ============================================================

/// Per-level colour remap tables. Level 0 is the lightest, level 15 leaves
/// colours unchanged and level 31 is black.
pub struct DepthQTables {
    levels: Box<[[u8; PALETTE_SIZE]; DEPTHQ_LEVELS]>,
}

impl DepthQTables {
    pub fn build(palette: &Palette) -> Self {
        let mut levels = Box::new([[0u8; PALETTE_SIZE]; DEPTHQ_LEVELS]);
        // every level is a full nearest-colour search over the palette
        levels[..].par_iter_mut().enumerate().for_each(|(level, table)| {
            let scale = (DEPTHQ_LEVELS - 1 - level) as i32;
            for i in 1..PALETTE_SIZE {
                if level == DEPTHQ_NEUTRAL_LEVEL {
                    table[i] = i as u8;
                    continue;
                }
                let c = palette.entries[i];
                let r = (c.red as i32 * scale / 16).min(255);
                let g = (c.green as i32 * scale / 16).min(255);
                let b = (c.blue as i32 * scale / 16).min(255);
                table[i] = palette.nearest(r, g, b);
            }
        });
        Self { levels }
    }

    /// Levels past the end of the table read as the shadow level.
    pub fn table(&self, level: usize) -> &[u8; PALETTE_SIZE] {
        &self.levels[table_level(level)]
    }

    pub fn shade(&self, level: usize, colour: u8) -> u8 {
        self.table(level)[colour as usize]
    }
}

/// Level for a legacy shade index. The legacy content uses 32 for "half
/// dark" shadows, which is level 24; anything past the table is clamped
/// to that level explicitly.
pub fn legacy_depthq_level(index: i32) -> usize {
    table_level(index.max(0) as usize)
}

fn table_level(level: usize) -> usize {
    if level < DEPTHQ_LEVELS {
        level
    } else {
        SHADOW_DEPTHQ_LEVEL
    }
}

/// Depth-cue level for a 13-bit shade value.
pub fn shade_to_level(shade: i32) -> usize {
    (shade.clamp(0, 0x1FFF) >> 8) as usize
}

/// Scale an RGB colour the way a depth-cue level would, without the
/// palette search. The hardware path uses this for vertex colours.
pub fn shade_rgb(colour: Rgb888, level: usize) -> Rgb888 {
    let scale = (DEPTHQ_LEVELS - 1 - table_level(level)) as u32;
    let f = |c: u8| (c as u32 * scale / 16).min(255) as u8;
    Rgb888::new(f(colour.red), f(colour.green), f(colour.blue))
}

// ============================================================
// Remapping between palettes
// ============================================================

/// For each index of `from`, the nearest index of `to`. Index 0 stays 0.
pub fn build_remap(from: &Palette, to: &Palette) -> [u8; PALETTE_SIZE] {
    let mut remap = [0u8; PALETTE_SIZE];
    for (i, slot) in remap.iter_mut().enumerate().skip(1) {
        let c = from.entries[i];
        *slot = if to.entries[i] == c {
            i as u8
        } else {
            to.nearest(c.red as i32, c.green as i32, c.blue as i32)
        };
    }
    remap
}

/// Convert a bitmap drawn with `from` so it displays the same with `to`.
pub fn sync_surface_palettes(bitmap: &mut [u8], from: &Palette, to: &Palette) {
    let remap = build_remap(from, to);
    for px in bitmap.iter_mut() {
        *px = remap[*px as usize];
    }
}

// ============================================================
// Tests
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::grey_palette;

    fn solid_palette(c: u8) -> Palette {
        Palette { entries: [Rgb888::new(c, c, c); PALETTE_SIZE] }
    }

    // ============================================================
    // Palette basics
    // ============================================================

    #[test]
    fn test_from_rgb_bytes() {
        let mut raw = [0u8; PCX_PALETTE_SIZE];
        raw[3] = 1;
        raw[4] = 2;
        raw[5] = 3;
        let pal = Palette::from_rgb_bytes(&raw);
        assert_eq!(pal.entries[1], Rgb888::new(1, 2, 3));
        assert_eq!(pal.as_bytes().len(), PCX_PALETTE_SIZE);
    }

    #[test]
    fn test_nearest_skips_transparent_slot() {
        let pal = grey_palette();
        assert_eq!(pal.nearest(0, 0, 0), 1);
        assert_eq!(pal.nearest(100, 100, 100), 100);
        assert_eq!(pal.nearest(300, 300, 300), 255);
    }

    #[test]
    fn test_windowed_range() {
        let r = PaletteRange::for_display(true);
        assert_eq!((r.start, r.end), (10, 246));
        assert_eq!(r.len(), 236);
        assert_eq!(PaletteRange::for_display(false), PaletteRange::FULL);
    }

    // ============================================================
    // Fades
    // ============================================================

    #[test]
    fn test_fade_identity_is_stable() {
        let a = grey_palette();
        let mut display = a.clone();
        let mut fader = PaletteFader::new(&display, &a, 7, PaletteRange::FULL);
        while fader.next_step(&mut display) {
            assert_eq!(display, a);
        }
    }

    #[test]
    fn test_fade_ends_exactly_on_target() {
        let a = solid_palette(3);
        let b = grey_palette();
        let mut display = a.clone();
        let mut fader = PaletteFader::new(&display, &b, 7, PaletteRange::FULL);
        let mut steps = 0;
        while fader.next_step(&mut display) {
            steps += 1;
        }
        assert_eq!(steps, 7);
        assert_eq!(display, b);
    }

    #[test]
    fn test_fade_is_monotonic() {
        let a = solid_palette(0);
        let b = solid_palette(200);
        let mut display = a.clone();
        let mut fader = PaletteFader::new(&display, &b, 9, PaletteRange::FULL);
        let mut last = 0u8;
        while fader.next_step(&mut display) {
            let v = display.entries[50].red;
            assert!(v >= last);
            last = v;
        }
        assert_eq!(last, 200);
    }

    #[test]
    fn test_fade_down_is_monotonic() {
        let a = solid_palette(250);
        let b = solid_palette(5);
        let mut display = a.clone();
        let mut fader = PaletteFader::new(&display, &b, 4, PaletteRange::FULL);
        let mut seen = Vec::new();
        while fader.next_step(&mut display) {
            seen.push(display.entries[0].green);
        }
        // 250 + (-245 * j / 4): 189, 128, 67, 5
        assert_eq!(seen, vec![189, 128, 67, 5]);
    }

    #[test]
    fn test_fade_skips_reserved_entries() {
        let a = solid_palette(0);
        let b = solid_palette(100);
        let mut display = a.clone();
        let mut fader = PaletteFader::new(&display, &b, 2, PaletteRange::for_display(true));
        while fader.next_step(&mut display) {}
        assert_eq!(display.entries[9].red, 0);
        assert_eq!(display.entries[10].red, 100);
        assert_eq!(display.entries[245].red, 100);
        assert_eq!(display.entries[246].red, 0);
    }

    #[test]
    fn test_apply_palette_respects_range() {
        let mut display = solid_palette(1);
        apply_palette(&mut display, &solid_palette(9), PaletteRange { start: 5, end: 6 });
        assert_eq!(display.entries[4].red, 1);
        assert_eq!(display.entries[5].red, 9);
        assert_eq!(display.entries[6].red, 1);
    }

    // ============================================================
    // Depth-cue
    // ============================================================

    #[test]
    fn test_depthq_neutral_level_is_identity() {
        let tables = DepthQTables::build(&grey_palette());
        for i in 0..PALETTE_SIZE {
            assert_eq!(tables.shade(DEPTHQ_NEUTRAL_LEVEL, i as u8), i as u8);
        }
    }

    #[test]
    fn test_depthq_darkest_level_is_black() {
        let tables = DepthQTables::build(&grey_palette());
        // nearest to black that is not the transparent slot
        assert_eq!(tables.shade(31, 200), 1);
        assert_eq!(tables.shade(31, 0), 0);
    }

    #[test]
    fn test_depthq_shadow_level_halves() {
        let tables = DepthQTables::build(&grey_palette());
        // 200 * (31 - 24) / 16 = 87
        assert_eq!(tables.shade(SHADOW_DEPTHQ_LEVEL, 200), 87);
    }

    #[test]
    fn test_legacy_level_clamp() {
        assert_eq!(legacy_depthq_level(32), SHADOW_DEPTHQ_LEVEL);
        assert_eq!(legacy_depthq_level(40), SHADOW_DEPTHQ_LEVEL);
        assert_eq!(legacy_depthq_level(24), 24);
        assert_eq!(legacy_depthq_level(-3), 0);
    }

    #[test]
    fn test_table_past_end_reads_shadow_level() {
        let tables = DepthQTables::build(&grey_palette());
        assert_eq!(tables.table(32), tables.table(SHADOW_DEPTHQ_LEVEL));
        assert_eq!(tables.shade(32, 200), 87);
        assert_eq!(shade_rgb(Rgb888::new(32, 32, 32), 32), shade_rgb(Rgb888::new(32, 32, 32), SHADOW_DEPTHQ_LEVEL));
    }

    #[test]
    fn test_shade_to_level() {
        assert_eq!(shade_to_level(0), 0);
        assert_eq!(shade_to_level(0x1000), 16);
        assert_eq!(shade_to_level(0x1FFF), 31);
        assert_eq!(shade_to_level(0x7FFF), 31);
        assert_eq!(shade_to_level(-5), 0);
    }

    #[test]
    fn test_shade_rgb_neutral() {
        let c = Rgb888::new(10, 20, 30);
        assert_eq!(shade_rgb(c, DEPTHQ_NEUTRAL_LEVEL), c);
        assert_eq!(shade_rgb(c, 31), Rgb888::BLACK);
    }

    // ============================================================
    // Remapping
    // ============================================================

    #[test]
    fn test_sync_surface_palettes() {
        let from = grey_palette();
        let mut to = grey_palette();
        // move grey 100 to slot 7 in the destination palette
        to.entries[100] = Rgb888::new(255, 0, 0);
        to.entries[7] = Rgb888::new(100, 100, 100);
        let mut bitmap = vec![0u8, 100, 50];
        sync_surface_palettes(&mut bitmap, &from, &to);
        assert_eq!(bitmap, vec![0, 7, 50]);
    }
}
