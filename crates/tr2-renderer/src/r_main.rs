// r_main.rs — frame composer: per-frame setup, object submission, pictures and HUD
//
// RenderContext owns every piece of render state (matrix stack, palettes,
// lighting, polygon list, picture buffer) and the backend chosen from the
// settings at construction. The display device is passed in per call.

use rand::Rng;
use tr2_common::pcx::pcx_decode;
use tr2_common::phd_math::{MatrixStack, PhdMatrix, PhdVector};

use crate::r_backend::{create_backend, ClearFlags, DisplayDevice, RenderBackend};
use crate::r_bounds::{self, ObjectVisibility};
use crate::r_buffer::{PictureError, SwrBuffer};
use crate::r_light::Lighting;
use crate::r_local::{BoundingBox, RenderMode, RenderSettings, Room, Viewport, NEUTRAL_SHADE, TICKS_PER_FRAME};
use crate::r_palette::{
    apply_palette, sync_surface_palettes, DepthQTables, FadeOutcome, Palette, PaletteFader, PaletteRange,
    SHADOW_DEPTHQ_LEVEL,
};
use crate::r_poly::{project_vertex, PolyList, ScreenVertex};
use crate::r_shadow::{self, ShadowCaster};

/// Frames of the fade-in when a level or the title starts.
pub const SCREEN_FADE_STEPS: i32 = 30;

/// Animated textures advance once per this many ticks.
const TEXTURE_ANIM_TICKS: i32 = TICKS_PER_FRAME * 5;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LevelType {
    Title,
    Level,
}

/// Palette indices of the fixed interface colours.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct InvColours {
    pub black: u8,
    pub gray: u8,
    pub white: u8,
    pub red: u8,
    pub orange: u8,
    pub blue: u8,
}

impl InvColours {
    pub fn from_palette(pal: &Palette) -> Self {
        Self {
            black: pal.nearest(0, 0, 0),
            gray: pal.nearest(0x80, 0x80, 0x80),
            white: pal.nearest(0xFF, 0xFF, 0xFF),
            red: pal.nearest(0xFF, 0, 0),
            orange: pal.nearest(0xFF, 0x80, 0),
            blue: pal.nearest(0, 0, 0xFF),
        }
    }
}

/// Camera-medium effects consumed by the rasterizer setup.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WaterEffects {
    /// The water palette is on the display.
    pub is_wet: bool,
    pub water: bool,
    pub shade: bool,
    pub wibble: bool,
}

/// Flat-colour object texture.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ObjectTexture {
    pub colour: u8,
}

/// Cycles texture ranges: every step each range moves its entries one slot
/// down and wraps the first to the end.
#[derive(Clone, Debug, Default)]
pub struct TextureAnimator {
    tick_comp: i32,
    pub ranges: Vec<Vec<usize>>,
}

impl TextureAnimator {
    pub fn new(ranges: Vec<Vec<usize>>) -> Self {
        Self { tick_comp: 0, ranges }
    }

    /// Accumulate `ticks` and rotate the ranges once for every whole step.
    /// Returns the number of steps taken.
    pub fn animate<T: Clone>(&mut self, ticks: i32, textures: &mut [T]) -> u32 {
        self.tick_comp += ticks;
        let mut steps = 0;
        while self.tick_comp > TEXTURE_ANIM_TICKS {
            for range in &self.ranges {
                rotate_range(textures, range);
            }
            self.tick_comp -= TEXTURE_ANIM_TICKS;
            steps += 1;
        }
        steps
    }
}

fn rotate_range<T: Clone>(textures: &mut [T], range: &[usize]) {
    if range.len() < 2 || range.iter().any(|&i| i >= textures.len()) {
        return;
    }
    let first = textures[range[0]].clone();
    for pair in range.windows(2) {
        textures[pair[0]] = textures[pair[1]].clone();
    }
    textures[range[range.len() - 1]] = first;
}

// ============================================================
// Scene input
// ============================================================

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MeshFace {
    /// Indices into the mesh vertices, in drawing order.
    pub vertices: Vec<usize>,
    pub texture: usize,
}

/// Object-local geometry. `normals` pairs with `vertices` (length PHD_IONE);
/// a vertex without a normal is shaded flat. A vertex with an entry in
/// `lights` is an unlit vertex and takes that baked shade instead.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Mesh {
    pub vertices: Vec<PhdVector>,
    pub normals: Vec<PhdVector>,
    pub lights: Vec<i32>,
    pub faces: Vec<MeshFace>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ShadowSpec {
    pub radius: i32,
    /// Floor height under the object.
    pub floor: i32,
}

/// One object handed over by the scene walker.
#[derive(Clone, Copy, Debug)]
pub struct SceneObject<'a> {
    pub pos: PhdVector,
    pub rot_x: i32,
    pub rot_y: i32,
    pub rot_z: i32,
    pub room: usize,
    pub bounds: BoundingBox,
    pub mesh: Option<&'a Mesh>,
    /// Baked shade pair of a static mesh; dynamic objects use room lights.
    pub static_shade: Option<(i32, i32)>,
    pub shadow: Option<ShadowSpec>,
}

// ============================================================
// Render context
// ============================================================

pub struct RenderContext {
    pub settings: RenderSettings,
    backend: Box<dyn RenderBackend>,
    pub viewport: Viewport,
    pub matrices: MatrixStack,
    pub lighting: Lighting,
    pub poly_list: PolyList,
    /// What the display shows now; fades mutate it in place.
    pub display_palette: Palette,
    game_palette: Palette,
    pub water_palette: Palette,
    /// Palette the picture buffer is drawn with.
    pub pic_palette: Palette,
    depthq: DepthQTables,
    pub inv_colours: InvColours,
    picture: Option<SwrBuffer>,
    background_ready: bool,
    background_captured: bool,
    /// Set when the device lost its buffers; the next frame clears them all.
    pub need_reset_buffers: bool,
    pub effects: WaterEffects,
    pub textures: Vec<ObjectTexture>,
    pub texture_animator: TextureAnimator,
}

impl RenderContext {
    pub fn new(
        settings: RenderSettings,
        screen_width: u32,
        screen_height: u32,
        viewport: Viewport,
        game_palette: Palette,
    ) -> Result<Self, PictureError> {
        let backend = create_backend(&settings, screen_width, screen_height)?;
        Ok(Self {
            settings,
            backend,
            viewport,
            matrices: MatrixStack::new(),
            lighting: Lighting::new(settings.fog),
            poly_list: PolyList::new(),
            display_palette: Palette::default(),
            depthq: DepthQTables::build(&game_palette),
            inv_colours: InvColours::from_palette(&game_palette),
            water_palette: game_palette.clone(),
            pic_palette: game_palette.clone(),
            game_palette,
            picture: None,
            background_ready: false,
            background_captured: false,
            need_reset_buffers: false,
            effects: WaterEffects::default(),
            textures: Vec::new(),
            texture_animator: TextureAnimator::default(),
        })
    }

    pub fn mode(&self) -> RenderMode {
        self.backend.mode()
    }

    pub fn backend(&self) -> &dyn RenderBackend {
        self.backend.as_ref()
    }

    pub fn game_palette(&self) -> &Palette {
        &self.game_palette
    }

    /// Replace the level palette and everything derived from it.
    pub fn set_game_palette(&mut self, palette: Palette) {
        self.depthq = DepthQTables::build(&palette);
        self.inv_colours = InvColours::from_palette(&palette);
        self.game_palette = palette;
    }

    pub fn depthq(&self) -> &DepthQTables {
        &self.depthq
    }

    pub fn picture(&self) -> Option<&SwrBuffer> {
        self.picture.as_ref()
    }

    /// Hardware background state: (ready to draw, taken from the screen).
    pub fn background_state(&self) -> (bool, bool) {
        (self.background_ready, self.background_captured)
    }

    // ============================================================
    // Frame
    // ============================================================

    /// Clear what this frame needs and start an empty polygon list.
    pub fn initialise_poly_list(&mut self, device: &mut dyn DisplayDevice, clear_back_buffer: bool) {
        let mut clear_back_buffer = clear_back_buffer;
        if self.need_reset_buffers {
            let flags = self.backend.reset_clear_flags(&self.settings);
            self.backend.clear_buffers(device, flags, &self.viewport);
            clear_back_buffer = false;
            self.need_reset_buffers = false;
        }

        let flags = self.backend.frame_clear_flags(&self.settings, clear_back_buffer);
        self.backend.clear_buffers(device, flags, &self.viewport);
        self.backend.begin_scene(device);
        self.poly_list.init();
    }

    /// Draw the frame's polygons. False when the frame was dropped.
    /// Paletted backends see the display palette. The hardware path has no
    /// palette of its own and colours from the game or water palette.
    pub fn output_poly_list(&mut self, device: &mut dyn DisplayDevice) -> bool {
        let palette = if self.backend.uses_palette() {
            &self.display_palette
        } else if self.effects.is_wet {
            &self.water_palette
        } else {
            &self.game_palette
        };
        self.backend.output_poly_list(
            device,
            &mut self.poly_list,
            &self.settings,
            palette,
            &self.depthq,
            &self.viewport,
        )
    }

    /// Wait for the frame tick and present the viewport. Returns the ticks
    /// that passed.
    pub fn dump_screen(&mut self, device: &mut dyn DisplayDevice) -> i32 {
        let ticks = device.sync_ticks(TICKS_PER_FRAME);
        device.present(Some(self.viewport.rect()));
        ticks
    }

    pub fn clear_screen(&mut self, device: &mut dyn DisplayDevice) {
        self.screen_clear(device, false);
    }

    pub fn screen_clear(&mut self, device: &mut dyn DisplayDevice, phd_win_size: bool) {
        let mut flags = self.backend.screen_clear_flags();
        if phd_win_size {
            flags |= ClearFlags::PHD_WIN_SIZE;
        }
        self.backend.clear_buffers(device, flags, &self.viewport);
    }

    /// Fade in the game palette: instantly without a level, otherwise
    /// over `SCREEN_FADE_STEPS` frames.
    pub fn initialise_screen<F: FnMut() -> bool>(
        &mut self,
        device: &mut dyn DisplayDevice,
        level: Option<LevelType>,
        poll_cancel: F,
    ) -> FadeOutcome {
        let steps = if level.is_some() { SCREEN_FADE_STEPS } else { 0 };
        let target = self.game_palette.clone();
        self.fade_to_palette(device, steps, &target, poll_cancel)
    }

    // ============================================================
    // Palette fades
    // ============================================================

    fn upload_display_palette(&self, device: &mut dyn DisplayDevice, range: PaletteRange) {
        device.set_palette(range.start, &self.display_palette.entries[range.start..range.end]);
    }

    /// Move the display palette to `target` over `steps` presented frames,
    /// or at once when `steps <= 1`. `poll_cancel` is checked before each
    /// step; a true result leaves the palette where it is.
    pub fn fade_to_palette<F: FnMut() -> bool>(
        &mut self,
        device: &mut dyn DisplayDevice,
        steps: i32,
        target: &Palette,
        mut poll_cancel: F,
    ) -> FadeOutcome {
        if !self.backend.uses_palette() {
            return FadeOutcome::Skipped;
        }
        let range = PaletteRange::for_display(self.settings.windowed_vga);

        if steps <= 1 {
            apply_palette(&mut self.display_palette, target, range);
            self.upload_display_palette(device, range);
            self.initialise_poly_list(device, false);
            self.output_poly_list(device);
            return FadeOutcome::Completed;
        }

        let mut fader = PaletteFader::new(&self.display_palette, target, steps, range);
        while !fader.is_finished() {
            if poll_cancel() {
                log::debug!("palette fade cancelled");
                return FadeOutcome::Cancelled;
            }
            fader.next_step(&mut self.display_palette);
            self.upload_display_palette(device, range);
            self.initialise_poly_list(device, false);
            self.output_poly_list(device);
            self.dump_screen(device);
        }
        FadeOutcome::Completed
    }

    // ============================================================
    // Geometry
    // ============================================================

    /// Classify a box under the current matrix.
    pub fn get_object_bounds(&self, bounds: &BoundingBox) -> ObjectVisibility {
        r_bounds::get_object_bounds(self.matrices.current(), bounds, &self.viewport)
    }

    /// Black rectangle behind everything, in viewport coordinates.
    pub fn insert_back_polygon(&mut self, x0: i32, y0: i32, x1: i32, y1: i32) {
        let vp = self.viewport;
        self.poly_list.insert_flat_rect(
            vp.min_x + x0,
            vp.min_y + y0,
            vp.min_x + x1,
            vp.min_y + y1,
            vp.far_z + 1,
            self.inv_colours.black,
        );
    }

    pub fn print_shadow(&mut self, radius: i32, bounds: &BoundingBox, caster: &ShadowCaster) -> bool {
        r_shadow::print_shadow(
            &mut self.matrices,
            &self.viewport,
            &mut self.poly_list,
            radius,
            bounds,
            caster,
            self.settings.shadow_mode,
        )
    }

    // ============================================================
    // Lighting
    // ============================================================

    pub fn calculate_light(&mut self, x: i32, y: i32, z: i32, room: &Room) {
        self.lighting.calculate_light(x, y, z, room, self.matrices.current());
    }

    pub fn calculate_static_light(&mut self, adder: i32) {
        self.lighting.calculate_static_light(adder, self.matrices.current());
    }

    pub fn calculate_static_mesh_light(&mut self, x: i32, y: i32, z: i32, shade1: i32, shade2: i32, room: &Room) {
        self.lighting
            .calculate_static_mesh_light(x, y, z, shade1, shade2, room, self.matrices.current());
    }

    pub fn light_room(&self, room: &mut Room) {
        self.lighting.light_room(room);
    }

    // ============================================================
    // Objects
    // ============================================================

    /// Shadow, classify, light and emit every object. Returns how many
    /// objects put polygons in the list.
    pub fn render_objects(&mut self, objects: &[SceneObject<'_>], rooms: &[Room]) -> usize {
        let vp = self.viewport;
        let mut drawn = 0;

        for obj in objects {
            let Some(room) = rooms.get(obj.room) else {
                log::warn!("object at {:?} is in missing room {}", obj.pos, obj.room);
                continue;
            };

            if let Some(shadow) = obj.shadow {
                let caster = ShadowCaster { x: obj.pos.x, z: obj.pos.z, floor: shadow.floor, yaw: obj.rot_y };
                self.print_shadow(shadow.radius, &obj.bounds, &caster);
            }

            let m = {
                let mut guard = self.matrices.push_scoped();
                guard.translate_abs(obj.pos.x, obj.pos.y, obj.pos.z);
                guard.rot_yxz(obj.rot_y, obj.rot_x, obj.rot_z);
                *guard.current()
            };
            if !r_bounds::get_object_bounds(&m, &obj.bounds, &vp).is_visible() {
                continue;
            }

            let mut rot = MatrixStack::new();
            rot.rot_yxz(obj.rot_y, obj.rot_x, obj.rot_z);
            let rotation = *rot.current();

            match obj.static_shade {
                Some((shade1, shade2)) => {
                    self.lighting
                        .calculate_static_mesh_light(obj.pos.x, obj.pos.y, obj.pos.z, shade1, shade2, room, &m)
                }
                None => {
                    let b = &obj.bounds;
                    let mid = rotation.rotate((b.x_min + b.x_max) / 2, (b.y_min + b.y_max) / 2, (b.z_min + b.z_max) / 2);
                    self.lighting
                        .calculate_light(obj.pos.x + mid.x, obj.pos.y + mid.y, obj.pos.z + mid.z, room, &m);
                }
            }

            if let Some(mesh) = obj.mesh {
                let static_lit = obj.static_shade.is_some();
                if emit_mesh(mesh, &m, &rotation, &vp, &self.lighting, static_lit, &self.textures, &mut self.poly_list) > 0 {
                    drawn += 1;
                }
            }
        }
        drawn
    }

    // ============================================================
    // HUD
    // ============================================================

    /// Health bar in the top left corner; `percent` is 0..=100.
    pub fn draw_health_bar(&mut self, percent: i32) {
        let x0 = self.viewport.min_x + self.viewport.render_scale(8);
        let c = self.inv_colours;
        self.insert_bar(x0, percent, c.red, c.orange);
    }

    /// Air bar in the top right corner; `percent` is 0..=100.
    pub fn draw_air_bar(&mut self, percent: i32) {
        let vp = self.viewport;
        let x0 = vp.min_x + vp.width - vp.render_scale(8) - vp.render_scale(100);
        let c = self.inv_colours;
        self.insert_bar(x0, percent, c.blue, c.white);
    }

    fn insert_bar(&mut self, x0: i32, percent: i32, colour: u8, highlight: u8) {
        let vp = self.viewport;
        let width = vp.render_scale(100);
        let height = vp.render_scale(5);
        let pixel = vp.render_scale(1);
        let x1 = x0 + width;
        let y0 = vp.min_y + vp.render_scale(8);
        let y1 = y0 + height;
        let bar = width * percent.clamp(0, 100) / 100;

        self.effects.shade = false;

        let c = self.inv_colours;
        let z = vp.near_z;
        let list = &mut self.poly_list;
        list.insert_flat_rect(x0 - pixel * 2, y0 - pixel * 2, x1 + pixel * 2, y1 + pixel * 2, z + 50, c.white);
        list.insert_flat_rect(x0 - pixel, y0 - pixel, x1 + pixel * 2, y1 + pixel * 2, z + 40, c.gray);
        list.insert_flat_rect(x0 - pixel, y0 - pixel, x1 + pixel, y1 + pixel, z + 30, c.black);
        if bar > 0 {
            list.insert_flat_rect(x0, y0, x0 + bar, y1, z + 20, colour);
            list.insert_flat_rect(x0, y0 + pixel, x0 + bar, y0 + pixel * 2, z + 10, highlight);
        }
    }

    // ============================================================
    // Water and animation
    // ============================================================

    /// Camera under water (or looking into it from above when false).
    pub fn setup_below_water(&mut self, device: &mut dyn DisplayDevice, underwater: bool) {
        if self.effects.is_wet != underwater {
            let target = if underwater { self.water_palette.clone() } else { self.game_palette.clone() };
            self.fade_to_palette(device, 1, &target, || false);
            self.effects.is_wet = underwater;
        }
        self.effects.water = true;
        self.effects.shade = true;
        self.effects.wibble = !underwater;
    }

    pub fn setup_above_water(&mut self, underwater: bool) {
        self.effects.water = false;
        self.effects.shade = underwater;
        self.effects.wibble = underwater;
    }

    /// Advance light animation and animated textures by `ticks`. `timer` is
    /// the level play time in frames.
    pub fn animate_textures<R: Rng + ?Sized>(&mut self, ticks: i32, timer: i32, rng: &mut R) {
        self.lighting.animate_light_shades(ticks, timer, rng);
        self.texture_animator.animate(ticks, &mut self.textures);
    }

    // ============================================================
    // Pictures
    // ============================================================

    /// Make sure the picture buffer matches the viewport size. On failure
    /// the previous buffer is kept.
    fn ensure_picture_buffer(&mut self) -> Result<(), PictureError> {
        let width = self.viewport.width.max(0) as u32;
        let height = self.viewport.height.max(0) as u32;
        if matches!(&self.picture, Some(p) if p.width == width && p.height == height) {
            return Ok(());
        }
        match SwrBuffer::try_new(width, height) {
            Ok(buf) => {
                log::debug!("picture buffer allocated at {}x{}", width, height);
                self.picture = Some(buf);
                Ok(())
            }
            Err(e) => {
                log::warn!("{}", e);
                Err(e)
            }
        }
    }

    /// Load a PCX picture as the background. A non-title picture also
    /// becomes the game palette.
    pub fn display_picture(
        &mut self,
        device: &mut dyn DisplayDevice,
        pcx: &[u8],
        is_title: bool,
    ) -> Result<(), PictureError> {
        let image = pcx_decode(pcx)?;
        let source = SwrBuffer { width: image.width, height: image.height, bitmap: image.pixels };
        let palette = Palette::from_rgb_bytes(&image.palette);

        match self.backend.mode() {
            RenderMode::Software => {
                self.ensure_picture_buffer()?;
                if let Some(picture) = self.picture.as_mut() {
                    picture.stretch_blt(None, &source, None);
                }
            }
            RenderMode::Hardware => {
                device.upload_background(&source, &palette);
                self.background_ready = true;
                self.background_captured = false;
            }
        }

        if !is_title {
            self.set_game_palette(palette.clone());
        }
        self.pic_palette = palette;
        Ok(())
    }

    /// Remap the picture buffer so it shows correctly with the game palette.
    pub fn sync_picture_buffer_palette(&mut self) {
        let Some(picture) = self.picture.as_mut() else {
            return;
        };
        sync_surface_palettes(&mut picture.bitmap, &self.pic_palette, &self.game_palette);
        self.pic_palette = self.game_palette.clone();
    }

    pub fn dont_display_picture(&mut self, device: &mut dyn DisplayDevice) {
        if self.backend.mode() == RenderMode::Hardware {
            device.free_background();
            self.background_ready = false;
            self.background_captured = false;
        }
    }

    /// Grab the rendered view as the background, dimmed by half unless this
    /// is the pause screen with background dimming off.
    pub fn copy_screen_to_buffer(&mut self, device: &mut dyn DisplayDevice, paused: bool) -> Result<(), PictureError> {
        if self.backend.mode() == RenderMode::Hardware {
            if device.capture_background() {
                self.background_ready = true;
                self.background_captured = true;
            } else {
                log::debug!("device cannot capture the background");
            }
            return Ok(());
        }

        self.ensure_picture_buffer()?;
        let (Some(picture), Some(render)) = (self.picture.as_mut(), self.backend.render_buffer()) else {
            return Ok(());
        };
        picture.stretch_blt(None, render, Some(self.viewport.rect()));
        if !paused || self.settings.pause_background {
            picture.remap(self.depthq.table(SHADOW_DEPTHQ_LEVEL));
        }
        self.pic_palette = self.game_palette.clone();
        Ok(())
    }

    /// Draw the background picture into the viewport.
    pub fn copy_buffer_to_screen(&mut self, device: &mut dyn DisplayDevice) {
        if self.backend.mode() == RenderMode::Hardware {
            if self.background_ready {
                device.enable_zbuffer(false, false);
                device.draw_background(self.viewport.rect());
                device.enable_zbuffer(true, true);
            }
            return;
        }

        if self.picture.is_none() {
            return;
        }
        if self.game_palette != self.pic_palette {
            self.sync_picture_buffer_palette();
        }
        self.backend.clear_buffers(device, ClearFlags::RENDER, &self.viewport);
        let rect = self.viewport.rect();
        if let (Some(picture), Some(render)) = (self.picture.as_ref(), self.backend.render_buffer_mut()) {
            render.stretch_blt(Some(rect), picture, None);
        }
    }
}

/// Project a mesh and queue its faces. Returns the number of faces added.
/// Under static lighting a vertex without a baked light counts as neutral.
fn emit_mesh(
    mesh: &Mesh,
    m: &PhdMatrix,
    rotation: &PhdMatrix,
    vp: &Viewport,
    lighting: &Lighting,
    static_lit: bool,
    textures: &[ObjectTexture],
    list: &mut PolyList,
) -> usize {
    let projected: Vec<ScreenVertex> = mesh
        .vertices
        .iter()
        .enumerate()
        .map(|(i, v)| {
            let shade = match mesh.lights.get(i) {
                Some(&light) => lighting.baked_vertex_shade(light),
                None if static_lit => lighting.baked_vertex_shade(NEUTRAL_SHADE),
                None => {
                    let normal = mesh.normals.get(i).map_or(PhdVector::default(), |n| rotation.rotate(n.x, n.y, n.z));
                    lighting.vertex_shade(normal)
                }
            };
            project_vertex(m, vp, v.x, v.y, v.z, shade)
        })
        .collect();

    let mut emitted = 0;
    let mut face_vertices = Vec::with_capacity(4);
    for face in &mesh.faces {
        let Some(texture) = textures.get(face.texture) else {
            continue;
        };
        if face.vertices.iter().any(|&i| i >= projected.len()) {
            continue;
        }
        face_vertices.clear();
        face_vertices.extend(face.vertices.iter().map(|&i| projected[i]));
        if list.insert_poly(&face_vertices, texture.colour) {
            emitted += 1;
        }
    }
    emitted
}

// ============================================================
// Tests
// ============================================================
