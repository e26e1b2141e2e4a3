// pcx.rs — 8-bit PCX picture decoding
//
// Full-screen backgrounds (title, loading and pause screens) are stored as
// single-plane, 8 bits per pixel, run-length encoded PCX files with a
// 256-colour palette trailer.

use bytemuck::{Pod, Zeroable};

// ============================================================
// Format
// ============================================================

/// PCX header as stored on disk (little-endian).
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
#[repr(C)]
pub struct PcxHeader {
    pub manufacturer: u8,
    pub version: u8,
    pub rle: u8,
    pub bpp: u8,
    pub x_min: u16,
    pub y_min: u16,
    pub x_max: u16,
    pub y_max: u16,
    pub h_dpi: u16,
    pub v_dpi: u16,
    pub header_palette: [u8; 48],
    pub reserved: u8,
    pub planes: u8,
    pub bytes_per_line: u16,
    pub palette_info: u16,
    pub filler: [u8; 58],
}

/// PCX header size in bytes
pub const PCX_HEADER_SIZE: usize = 128;
/// PCX palette size in bytes (at end of file)
pub const PCX_PALETTE_SIZE: usize = 768;

pub const PCX_MANUFACTURER: u8 = 10;
pub const PCX_MIN_VERSION: u8 = 5;
/// Longest run a single RLE header byte can encode.
pub const PCX_MAX_RUN: usize = 0x3F;

/// Why a PCX buffer was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PcxError {
    /// Buffer smaller than a header plus palette trailer.
    TooSmall(usize),
    BadManufacturer(u8),
    BadVersion(u8),
    BadBitsPerPixel(u8),
    BadPlanes(u8),
    NotRle(u8),
    /// Width or height is zero (or xMax < xMin).
    EmptyImage,
    /// Caller buffer cannot hold width*height bytes.
    DestinationTooSmall { needed: usize, got: usize },
    /// The RLE stream ran into the palette trailer before the last row, or
    /// is too short to encode the declared size at all.
    Truncated,
    /// The bitmap for the declared size could not be allocated.
    Allocation(usize),
}

impl std::fmt::Display for PcxError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PcxError::TooSmall(len) => write!(f, "PCX buffer too small ({} bytes)", len),
            PcxError::BadManufacturer(m) => write!(f, "bad PCX manufacturer byte {}", m),
            PcxError::BadVersion(v) => write!(f, "unsupported PCX version {}", v),
            PcxError::BadBitsPerPixel(b) => write!(f, "unsupported PCX depth {} bpp", b),
            PcxError::BadPlanes(p) => write!(f, "unsupported PCX plane count {}", p),
            PcxError::NotRle(e) => write!(f, "PCX encoding {} is not RLE", e),
            PcxError::EmptyImage => write!(f, "PCX image has zero size"),
            PcxError::DestinationTooSmall { needed, got } => {
                write!(f, "PCX destination holds {} bytes, {} needed", got, needed)
            }
            PcxError::Truncated => write!(f, "PCX pixel data truncated"),
            PcxError::Allocation(bytes) => write!(f, "cannot allocate {} bytes for PCX pixels", bytes),
        }
    }
}

impl std::error::Error for PcxError {}

/// Decoded picture.
pub struct PcxImage {
    /// Palette-indexed pixel data, `width` bytes per row.
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// 768-byte RGB palette (256 colors * 3 bytes)
    pub palette: [u8; PCX_PALETTE_SIZE],
}

// ============================================================
// Header validation
// ============================================================

fn read_header(raw: &[u8]) -> Result<(PcxHeader, u32, u32), PcxError> {
    if raw.len() < PCX_HEADER_SIZE + PCX_PALETTE_SIZE {
        return Err(PcxError::TooSmall(raw.len()));
    }

    let mut header: PcxHeader = bytemuck::pod_read_unaligned(&raw[..PCX_HEADER_SIZE]);
    header.x_min = u16::from_le(header.x_min);
    header.y_min = u16::from_le(header.y_min);
    header.x_max = u16::from_le(header.x_max);
    header.y_max = u16::from_le(header.y_max);
    header.bytes_per_line = u16::from_le(header.bytes_per_line);

    if header.manufacturer != PCX_MANUFACTURER {
        return Err(PcxError::BadManufacturer(header.manufacturer));
    }
    if header.version < PCX_MIN_VERSION {
        return Err(PcxError::BadVersion(header.version));
    }
    if header.bpp != 8 {
        return Err(PcxError::BadBitsPerPixel(header.bpp));
    }
    if header.rle != 1 {
        return Err(PcxError::NotRle(header.rle));
    }
    if header.planes != 1 {
        return Err(PcxError::BadPlanes(header.planes));
    }

    let width = header.x_max as i32 - header.x_min as i32 + 1;
    let height = header.y_max as i32 - header.y_min as i32 + 1;
    if width <= 0 || height <= 0 {
        return Err(PcxError::EmptyImage);
    }

    Ok((header, width as u32, height as u32))
}

/// Validate the header and return the picture dimensions without decoding.
pub fn pcx_resolution(raw: &[u8]) -> Result<(u32, u32), PcxError> {
    read_header(raw).map(|(_, w, h)| (w, h))
}

// ============================================================
// Decoding
// ============================================================

/// Zeroed bitmap for a decode. Sizes the stream cannot reach are refused
/// before anything is allocated.
fn alloc_bitmap(raw: &[u8], width: u32, height: u32) -> Result<Vec<u8>, PcxError> {
    let stream = raw.len() - PCX_HEADER_SIZE - PCX_PALETTE_SIZE;
    let width = width as usize;
    let encoded = (width + width % 2).saturating_mul(height as usize);
    if encoded > stream.saturating_mul(PCX_MAX_RUN) {
        return Err(PcxError::Truncated);
    }

    let needed = width * height as usize;
    let mut pixels = Vec::new();
    pixels.try_reserve_exact(needed).map_err(|_| PcxError::Allocation(needed))?;
    pixels.resize(needed, 0);
    Ok(pixels)
}

/// Decode the RLE stream into `dst` (exactly width*height bytes).
///
/// Encoded rows are padded to an even length. A run longer than the space
/// left in its row is cut at the row end; nothing carries into the next row.
fn decode_rle(raw: &[u8], width: u32, height: u32, dst: &mut [u8]) -> Result<(), PcxError> {
    let end = raw.len() - PCX_PALETTE_SIZE;
    let width = width as usize;
    let pitch = width + width % 2;
    let mut src = PCX_HEADER_SIZE;

    for row in dst.chunks_exact_mut(width).take(height as usize) {
        let mut w = 0usize;
        while w < pitch {
            if src >= end {
                return Err(PcxError::Truncated);
            }
            let data_byte = raw[src];
            src += 1;

            if (data_byte & 0xC0) == 0xC0 {
                let n = (data_byte & 0x3F) as usize;
                if src >= end {
                    return Err(PcxError::Truncated);
                }
                let pixel = raw[src];
                src += 1;
                if w < width {
                    let count = n.min(width - w);
                    row[w..w + count].fill(pixel);
                }
                w += n;
            } else {
                if w < width {
                    row[w] = data_byte;
                }
                w += 1;
            }
        }
    }

    Ok(())
}

fn read_palette(raw: &[u8]) -> [u8; PCX_PALETTE_SIZE] {
    let mut palette = [0u8; PCX_PALETTE_SIZE];
    palette.copy_from_slice(&raw[raw.len() - PCX_PALETTE_SIZE..]);
    palette
}

/// Decode a PCX image from raw bytes.
pub fn pcx_decode(raw: &[u8]) -> Result<PcxImage, PcxError> {
    let (_, width, height) = match read_header(raw) {
        Ok(v) => v,
        Err(e) => {
            log::debug!("pcx_decode: {}", e);
            return Err(e);
        }
    };

    let mut pixels = alloc_bitmap(raw, width, height)?;
    if let Err(e) = decode_rle(raw, width, height, &mut pixels) {
        log::debug!("pcx_decode: {}", e);
        return Err(e);
    }

    Ok(PcxImage {
        pixels,
        width,
        height,
        palette: read_palette(raw),
    })
}

/// Decode into a caller-supplied bitmap (and optionally palette).
///
/// Nothing is written to `dst` or `palette` unless the whole image decodes.
pub fn pcx_decode_into(
    raw: &[u8],
    dst: &mut [u8],
    palette: Option<&mut [u8; PCX_PALETTE_SIZE]>,
) -> Result<(u32, u32), PcxError> {
    let (_, width, height) = read_header(raw)?;
    let needed = width as usize * height as usize;
    if dst.len() < needed {
        return Err(PcxError::DestinationTooSmall { needed, got: dst.len() });
    }

    let mut scratch = alloc_bitmap(raw, width, height)?;
    decode_rle(raw, width, height, &mut scratch)?;
    dst[..needed].copy_from_slice(&scratch);

    if let Some(pal) = palette {
        *pal = read_palette(raw);
    }
    Ok((width, height))
}

// =============================================================================
// Tests
// =============================================================================
