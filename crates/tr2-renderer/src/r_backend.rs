// r_backend.rs — display device seam and the software/hardware backends
//
// The display device is whatever owns the real screen surfaces. The two
// backends sit on top of it: the software backend rasterizes into an 8-bit
// CPU buffer and palette-expands it into a locked 32-bit surface, the
// hardware backend hands shaded primitives to the device.

use crate::r_buffer::{PictureError, SwrBuffer};
use crate::r_local::{Rect, RenderMode, RenderSettings, Viewport};
use crate::r_palette::{shade_rgb, shade_to_level, DepthQTables, Palette, Rgb888};
use crate::r_poly::{PolyKind, PolyList, ScreenVertex};
use crate::r_swr;

bitflags::bitflags! {
    /// Buffers to clear.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct ClearFlags: u32 {
        const PRIMARY          = 0x001;
        const BACK             = 0x002;
        const THIRD            = 0x004;
        const ZBUFFER          = 0x008;
        /// The software render buffer.
        const RENDER           = 0x010;
        const PICTURE          = 0x020;
        const WINDOWED_PRIMARY = 0x040;
        /// Restrict the clear to the 3D viewport.
        const PHD_WIN_SIZE     = 0x100;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LockMode {
    /// Fail with `StillDrawing` instead of waiting for the device.
    NoWait,
    Wait,
}

/// Surface lock failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LockError {
    /// The device is still using the surface; retrying may succeed.
    StillDrawing,
    /// The surface is gone (mode switch, device loss).
    Lost,
}

impl std::fmt::Display for LockError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LockError::StillDrawing => write!(f, "surface is still drawing"),
            LockError::Lost => write!(f, "surface lost"),
        }
    }
}

impl std::error::Error for LockError {}

/// A locked 32-bit (0x00RRGGBB) surface. `pitch` is in pixels.
pub struct LockedSurface<'a> {
    pub pixels: &'a mut [u32],
    pub pitch: usize,
    pub width: u32,
    pub height: u32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HwVertex {
    pub x: i32,
    pub y: i32,
    /// View depth in world units.
    pub z: i32,
    pub colour: Rgb888,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HwPrimitive {
    Rect { x0: i32, y0: i32, x1: i32, y1: i32, z: i32, colour: Rgb888 },
    Polygon { vertices: Vec<HwVertex> },
    /// Multiply what is behind by `factor`.
    Darken { vertices: Vec<HwVertex>, factor: Rgb888 },
}

/// The external display device.
pub trait DisplayDevice {
    fn begin_scene(&mut self);
    fn end_scene(&mut self);

    /// Clear device buffers. `rect` limits the clear when set.
    fn clear(&mut self, flags: ClearFlags, rect: Option<Rect>, colour: u32);

    /// Lock the capture surface, run `f` on it and unlock. The lock never
    /// outlives the call.
    fn lock_surface(&mut self, mode: LockMode, f: &mut dyn FnMut(&mut LockedSurface<'_>)) -> Result<(), LockError>;

    /// Upload palette entries starting at `first`.
    fn set_palette(&mut self, first: usize, entries: &[Rgb888]);

    /// Show the finished frame; `rect` limits the update.
    fn present(&mut self, rect: Option<Rect>);

    fn enable_zbuffer(&mut self, write: bool, compare: bool);

    fn draw_primitives(&mut self, primitives: &[HwPrimitive]);

    /// Wait until `ticks` game ticks have passed since the last call and
    /// return how many did.
    fn sync_ticks(&mut self, ticks: i32) -> i32 {
        ticks
    }

    // ========== Hardware backgrounds ==========

    fn upload_background(&mut self, _picture: &SwrBuffer, _palette: &Palette) {}

    fn draw_background(&mut self, _rect: Rect) {}

    fn free_background(&mut self) {}

    /// Grab the current back buffer as the background. Returns false when
    /// the device cannot.
    fn capture_background(&mut self) -> bool {
        false
    }
}

/// One of the two rendering pipelines, chosen once from the settings.
pub trait RenderBackend {
    fn mode(&self) -> RenderMode;

    /// Buffers cleared after the device lost them.
    fn reset_clear_flags(&self, settings: &RenderSettings) -> ClearFlags;

    /// Buffers cleared at the start of every frame.
    fn frame_clear_flags(&self, settings: &RenderSettings, clear_back_buffer: bool) -> ClearFlags;

    /// Buffers cleared by a plain screen clear.
    fn screen_clear_flags(&self) -> ClearFlags;

    /// Whether the display palette drives what is seen.
    fn uses_palette(&self) -> bool;

    /// Clear CPU-side buffers and pass the rest to the device.
    fn clear_buffers(&mut self, device: &mut dyn DisplayDevice, flags: ClearFlags, vp: &Viewport);

    fn begin_scene(&mut self, device: &mut dyn DisplayDevice);

    /// Draw the frame's polygons. Returns false when the frame was dropped.
    fn output_poly_list(
        &mut self,
        device: &mut dyn DisplayDevice,
        list: &mut PolyList,
        settings: &RenderSettings,
        palette: &Palette,
        depthq: &DepthQTables,
        vp: &Viewport,
    ) -> bool;

    fn render_buffer(&self) -> Option<&SwrBuffer>;

    fn render_buffer_mut(&mut self) -> Option<&mut SwrBuffer>;
}

pub fn create_backend(settings: &RenderSettings, screen_width: u32, screen_height: u32) -> Result<Box<dyn RenderBackend>, PictureError> {
    log::info!("render mode: {:?}", settings.render_mode);
    Ok(match settings.render_mode {
        RenderMode::Software => Box::new(SoftwareBackend::new(screen_width, screen_height)?),
        RenderMode::Hardware => Box::new(HardwareBackend::new()),
    })
}

// ============================================================
// Software
// ============================================================

pub struct SoftwareBackend {
    render: SwrBuffer,
}

impl SoftwareBackend {
    pub fn new(width: u32, height: u32) -> Result<Self, PictureError> {
        Ok(Self { render: SwrBuffer::try_new(width, height)? })
    }
}

/// Palette-expand `src` into the locked surface. Index 0 is always black.
fn copy_to_surface(src: &SwrBuffer, palette: &Palette, surface: &mut LockedSurface<'_>) {
    let width = src.width.min(surface.width) as usize;
    let height = src.height.min(surface.height) as usize;
    let rgb: Vec<u32> = palette
        .entries
        .iter()
        .enumerate()
        .map(|(i, c)| if i == 0 { 0 } else { c.to_rgb32() })
        .collect();
    for y in 0..height {
        let src_row = &src.bitmap[y * src.width as usize..][..width];
        let dst_row = &mut surface.pixels[y * surface.pitch..][..width];
        for (dst, &idx) in dst_row.iter_mut().zip(src_row) {
            *dst = rgb[idx as usize];
        }
    }
}

impl RenderBackend for SoftwareBackend {
    fn mode(&self) -> RenderMode {
        RenderMode::Software
    }

    fn reset_clear_flags(&self, settings: &RenderSettings) -> ClearFlags {
        if settings.fullscreen {
            let mut flags = ClearFlags::BACK | ClearFlags::PRIMARY | ClearFlags::RENDER;
            if settings.triple_buffering {
                flags |= ClearFlags::THIRD;
            }
            flags
        } else {
            ClearFlags::WINDOWED_PRIMARY | ClearFlags::RENDER
        }
    }

    fn frame_clear_flags(&self, _settings: &RenderSettings, clear_back_buffer: bool) -> ClearFlags {
        let mut flags = ClearFlags::PHD_WIN_SIZE;
        if clear_back_buffer {
            flags |= ClearFlags::BACK | ClearFlags::RENDER;
        }
        flags
    }

    fn screen_clear_flags(&self) -> ClearFlags {
        ClearFlags::RENDER
    }

    fn uses_palette(&self) -> bool {
        true
    }

    fn clear_buffers(&mut self, device: &mut dyn DisplayDevice, flags: ClearFlags, vp: &Viewport) {
        let rect = flags.contains(ClearFlags::PHD_WIN_SIZE).then(|| vp.rect());
        if flags.contains(ClearFlags::RENDER) {
            match rect {
                Some(rect) => self.render.clear_rect(rect),
                None => self.render.clear(),
            }
        }
        let device_flags = flags - ClearFlags::RENDER - ClearFlags::PHD_WIN_SIZE;
        if !device_flags.is_empty() {
            device.clear(device_flags, rect, 0);
        }
    }

    fn begin_scene(&mut self, _device: &mut dyn DisplayDevice) {}

    fn output_poly_list(
        &mut self,
        device: &mut dyn DisplayDevice,
        list: &mut PolyList,
        _settings: &RenderSettings,
        palette: &Palette,
        depthq: &DepthQTables,
        vp: &Viewport,
    ) -> bool {
        list.sort();
        let render = &mut self.render;

        let mut rendered = false;
        let first = device.lock_surface(LockMode::NoWait, &mut |surface: &mut LockedSurface<'_>| {
            r_swr::print_poly_list(list, render, depthq, vp.rect());
            rendered = true;
            copy_to_surface(render, palette, surface);
        });
        match first {
            Ok(()) => true,
            Err(LockError::StillDrawing) => {
                if !rendered {
                    r_swr::print_poly_list(list, render, depthq, vp.rect());
                }
                let retry = device.lock_surface(LockMode::Wait, &mut |surface: &mut LockedSurface<'_>| {
                    copy_to_surface(render, palette, surface);
                });
                if let Err(e) = retry {
                    log::debug!("frame dropped: {}", e);
                    return false;
                }
                true
            }
            Err(e) => {
                log::debug!("frame dropped: {}", e);
                false
            }
        }
    }

    fn render_buffer(&self) -> Option<&SwrBuffer> {
        Some(&self.render)
    }

    fn render_buffer_mut(&mut self) -> Option<&mut SwrBuffer> {
        Some(&mut self.render)
    }
}

// ============================================================
// Hardware
// ============================================================

#[derive(Default)]
pub struct HardwareBackend {
    primitives: Vec<HwPrimitive>,
}

impl HardwareBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn hw_vertex(v: &ScreenVertex, colour: Rgb888) -> HwVertex {
        HwVertex { x: v.x, y: v.y, z: v.z, colour }
    }

    fn build_primitives(&mut self, list: &PolyList, palette: &Palette) {
        self.primitives.clear();
        for entry in list.entries() {
            let prim = match entry.kind {
                PolyKind::FlatRect { x0, y0, x1, y1, colour } => HwPrimitive::Rect {
                    x0,
                    y0,
                    x1,
                    y1,
                    z: entry.depth,
                    colour: palette.entries[colour as usize],
                },
                PolyKind::Flat { colour } => {
                    let base = palette.entries[colour as usize];
                    HwPrimitive::Polygon {
                        vertices: entry
                            .vertices
                            .iter()
                            .map(|v| Self::hw_vertex(v, shade_rgb(base, shade_to_level(v.shade))))
                            .collect(),
                    }
                }
                PolyKind::Trans8 { level } => HwPrimitive::Darken {
                    vertices: entry.vertices.iter().map(|v| Self::hw_vertex(v, Rgb888::BLACK)).collect(),
                    factor: shade_rgb(Rgb888::new(255, 255, 255), level),
                },
            };
            self.primitives.push(prim);
        }
    }
}

impl RenderBackend for HardwareBackend {
    fn mode(&self) -> RenderMode {
        RenderMode::Hardware
    }

    fn reset_clear_flags(&self, settings: &RenderSettings) -> ClearFlags {
        if settings.fullscreen {
            let mut flags = ClearFlags::BACK | ClearFlags::PRIMARY;
            if settings.triple_buffering {
                flags |= ClearFlags::THIRD;
            }
            flags
        } else {
            ClearFlags::WINDOWED_PRIMARY | ClearFlags::BACK
        }
    }

    fn frame_clear_flags(&self, settings: &RenderSettings, clear_back_buffer: bool) -> ClearFlags {
        let mut flags = ClearFlags::PHD_WIN_SIZE;
        if clear_back_buffer {
            flags |= ClearFlags::BACK;
        }
        if settings.zbuffer {
            flags |= ClearFlags::ZBUFFER;
        }
        flags
    }

    fn screen_clear_flags(&self) -> ClearFlags {
        ClearFlags::BACK
    }

    fn uses_palette(&self) -> bool {
        false
    }

    fn clear_buffers(&mut self, device: &mut dyn DisplayDevice, flags: ClearFlags, vp: &Viewport) {
        let rect = flags.contains(ClearFlags::PHD_WIN_SIZE).then(|| vp.rect());
        let device_flags = flags - ClearFlags::RENDER - ClearFlags::PHD_WIN_SIZE;
        if !device_flags.is_empty() {
            device.clear(device_flags, rect, 0);
        }
    }

    fn begin_scene(&mut self, device: &mut dyn DisplayDevice) {
        device.begin_scene();
        device.enable_zbuffer(true, true);
    }

    fn output_poly_list(
        &mut self,
        device: &mut dyn DisplayDevice,
        list: &mut PolyList,
        settings: &RenderSettings,
        palette: &Palette,
        _depthq: &DepthQTables,
        _vp: &Viewport,
    ) -> bool {
        if !settings.zbuffer || !settings.dont_sort_primitives {
            list.sort();
        }
        self.build_primitives(list, palette);
        device.draw_primitives(&self.primitives);
        device.end_scene();
        true
    }

    fn render_buffer(&self) -> Option<&SwrBuffer> {
        None
    }

    fn render_buffer_mut(&mut self) -> Option<&mut SwrBuffer> {
        None
    }
}

// ============================================================
// Tests
// ============================================================
