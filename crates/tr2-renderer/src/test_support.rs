// test_support.rs — recording display device for unit tests

use std::collections::VecDeque;

use crate::r_backend::{ClearFlags, DisplayDevice, HwPrimitive, LockError, LockMode, LockedSurface};
use crate::r_buffer::SwrBuffer;
use crate::r_local::Rect;
use crate::r_palette::{Palette, Rgb888, PALETTE_SIZE};

/// Grey ramp: entry i = (i, i, i).
pub fn grey_palette() -> Palette {
    let mut pal = Palette::default();
    for (i, e) in pal.entries.iter_mut().enumerate() {
        *e = Rgb888::new(i as u8, i as u8, i as u8);
    }
    pal
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeviceEvent {
    BeginScene,
    EndScene,
    Clear(ClearFlags, Option<Rect>),
    Lock(LockMode),
    SetPalette { first: usize, len: usize },
    Present(Option<Rect>),
    EnableZBuffer(bool, bool),
    Draw(usize),
    SyncTicks(i32),
    UploadBackground(u32, u32),
    DrawBackground(Rect),
    FreeBackground,
    CaptureBackground,
}

/// Records every call. Lock results are taken from `lock_results` in
/// order, succeeding once it runs out.
pub struct RecordingDevice {
    pub events: Vec<DeviceEvent>,
    pub lock_results: VecDeque<Result<(), LockError>>,
    pub surface: Vec<u32>,
    pub width: u32,
    pub height: u32,
    pub palette: Palette,
    /// Every palette upload, in order.
    pub palette_history: Vec<Palette>,
    pub primitives: Vec<HwPrimitive>,
    pub can_capture: bool,
}

impl RecordingDevice {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            events: Vec::new(),
            lock_results: VecDeque::new(),
            surface: vec![0; width as usize * height as usize],
            width,
            height,
            palette: Palette::default(),
            palette_history: Vec::new(),
            primitives: Vec::new(),
            can_capture: false,
        }
    }

    pub fn count(&self, pred: impl Fn(&DeviceEvent) -> bool) -> usize {
        self.events.iter().filter(|e| pred(e)).count()
    }
}

impl DisplayDevice for RecordingDevice {
    fn begin_scene(&mut self) {
        self.events.push(DeviceEvent::BeginScene);
    }

    fn end_scene(&mut self) {
        self.events.push(DeviceEvent::EndScene);
    }

    fn clear(&mut self, flags: ClearFlags, rect: Option<Rect>, _colour: u32) {
        self.events.push(DeviceEvent::Clear(flags, rect));
    }

    fn lock_surface(&mut self, mode: LockMode, f: &mut dyn FnMut(&mut LockedSurface<'_>)) -> Result<(), LockError> {
        self.events.push(DeviceEvent::Lock(mode));
        self.lock_results.pop_front().unwrap_or(Ok(()))?;
        let mut surface = LockedSurface {
            pixels: &mut self.surface,
            pitch: self.width as usize,
            width: self.width,
            height: self.height,
        };
        f(&mut surface);
        Ok(())
    }

    fn set_palette(&mut self, first: usize, entries: &[Rgb888]) {
        self.events.push(DeviceEvent::SetPalette { first, len: entries.len() });
        let end = (first + entries.len()).min(PALETTE_SIZE);
        self.palette.entries[first..end].copy_from_slice(&entries[..end - first]);
        self.palette_history.push(self.palette.clone());
    }

    fn present(&mut self, rect: Option<Rect>) {
        self.events.push(DeviceEvent::Present(rect));
    }

    fn enable_zbuffer(&mut self, write: bool, compare: bool) {
        self.events.push(DeviceEvent::EnableZBuffer(write, compare));
    }

    fn draw_primitives(&mut self, primitives: &[HwPrimitive]) {
        self.events.push(DeviceEvent::Draw(primitives.len()));
        self.primitives = primitives.to_vec();
    }

    fn sync_ticks(&mut self, ticks: i32) -> i32 {
        self.events.push(DeviceEvent::SyncTicks(ticks));
        ticks
    }

    fn upload_background(&mut self, picture: &SwrBuffer, _palette: &Palette) {
        self.events.push(DeviceEvent::UploadBackground(picture.width, picture.height));
    }

    fn draw_background(&mut self, rect: Rect) {
        self.events.push(DeviceEvent::DrawBackground(rect));
    }

    fn free_background(&mut self) {
        self.events.push(DeviceEvent::FreeBackground);
    }

    fn capture_background(&mut self) -> bool {
        self.events.push(DeviceEvent::CaptureBackground);
        self.can_capture
    }
}
