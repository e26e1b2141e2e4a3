#![allow(clippy::too_many_arguments, clippy::manual_range_contains, clippy::new_without_default)]
// Rendering and lighting core: visibility, lighting, shadows, palettes and
// the software/hardware output paths.

pub mod r_local;
pub mod r_buffer;
pub mod r_palette;
pub mod r_bounds;
pub mod r_light;
pub mod r_shadow;
pub mod r_poly;
pub mod r_swr;
pub mod r_backend;
pub mod r_main;

#[cfg(test)]
mod test_support;
