use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use image::RgbaImage;
use rayon::prelude::*;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::geometry::{Affine, CombineMode, Outline, OutlineData, Rect, Region};
use crate::log_info;
use crate::masked::MaskedBuffer;
use crate::selection::{Selection, SelectionData};

// ============================================================================
// PIXELSEL DOCUMENT FORMATS
// ============================================================================

const MAGIC_REGION: &str = "PSR1";
const MAGIC_OUTLINE: &str = "PSO1";
const MAGIC_SELECTION: &str = "PSS1";
const MAGIC_MASKED: &str = "PSM1";

/// Default edge length of a stored masked-buffer tile.
pub const DEFAULT_TILE_SIZE: u32 = 64;

/// Maximum buffer dimension accepted from disk (per axis).
const MAX_BUFFER_DIM: u32 = 32_768;

/// A region as the flat list of its scan rectangles (`[x, y, w, h]`).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RegionBlob {
    pub rects: Vec<[i32; 4]>,
}

impl From<&Region> for RegionBlob {
    fn from(region: &Region) -> Self {
        Self {
            rects: region.scans().iter().map(|r| [r.x, r.y, r.width, r.height]).collect(),
        }
    }
}

impl RegionBlob {
    /// Replay the rectangles into a region. Rectangles with a negative size
    /// are rejected.
    pub fn to_region(&self) -> Result<Region, PersistError> {
        let mut rects = Vec::with_capacity(self.rects.len());
        for &[x, y, w, h] in &self.rects {
            if w < 0 || h < 0 {
                return Err(PersistError::InvalidFormat(format!(
                    "region rectangle ({}, {}, {}, {}) has a negative size",
                    x, y, w, h
                )));
            }
            rects.push(Rect::new(x, y, w, h));
        }
        Ok(Region::from_rects(&rects))
    }
}

#[derive(Serialize, Deserialize)]
struct RegionFile {
    magic: String,
    region: RegionBlob,
}

#[derive(Serialize, Deserialize)]
struct OutlineFile {
    magic: String,
    outline: OutlineData,
}

#[derive(Serialize, Deserialize)]
struct SelectionFile {
    magic: String,
    clip_rect: [i32; 4],
    base_path: OutlineData,
    continuation: OutlineData,
    continuation_mode: u8,
    cumulative_transform: Affine,
    interim_transform: Affine,
}

/// Masked buffer stored as sparse tiles; fully transparent tiles are omitted.
#[derive(Serialize, Deserialize)]
struct MaskedFile {
    magic: String,
    region: RegionBlob,
    width: u32,
    height: u32,
    tile_size: u32,
    tiles: Vec<TileData>,
}

#[derive(Serialize, Deserialize)]
struct TileData {
    tx: u32,
    ty: u32,
    pixels: Vec<u8>,
}

/// Error type for document and image file operations.
#[derive(Debug)]
pub enum PersistError {
    Io(std::io::Error),
    Serialize(String),
    InvalidFormat(String),
    Geometry(crate::Error),
    Image(image::ImageError),
}

impl std::fmt::Display for PersistError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PersistError::Io(e) => write!(f, "I/O error: {}", e),
            PersistError::Serialize(e) => write!(f, "Serialization error: {}", e),
            PersistError::InvalidFormat(e) => write!(f, "Invalid format: {}", e),
            PersistError::Geometry(e) => write!(f, "Invalid geometry: {}", e),
            PersistError::Image(e) => write!(f, "Image error: {}", e),
        }
    }
}

impl std::error::Error for PersistError {}

impl From<std::io::Error> for PersistError {
    fn from(e: std::io::Error) -> Self {
        PersistError::Io(e)
    }
}

impl From<Box<bincode::ErrorKind>> for PersistError {
    fn from(e: Box<bincode::ErrorKind>) -> Self {
        PersistError::Serialize(e.to_string())
    }
}

impl From<crate::Error> for PersistError {
    fn from(e: crate::Error) -> Self {
        PersistError::Geometry(e)
    }
}

impl From<image::ImageError> for PersistError {
    fn from(e: image::ImageError) -> Self {
        PersistError::Image(e)
    }
}

fn write_doc<T: Serialize>(doc: &T, path: &Path) -> Result<(), PersistError> {
    let file = File::create(path)?;
    let writer = BufWriter::new(file);
    bincode::serialize_into(writer, doc)?;
    Ok(())
}

/// Read a whole document and check its magic before decoding.
fn read_doc<T: DeserializeOwned>(path: &Path, expected: &str) -> Result<T, PersistError> {
    let raw = std::fs::read(path)?;
    decode_doc(&raw, expected)
}

fn decode_doc<T: DeserializeOwned>(raw: &[u8], expected: &str) -> Result<T, PersistError> {
    if raw.len() < 12 {
        return Err(PersistError::InvalidFormat("File too small".into()));
    }
    // bincode writes a String as an 8-byte length prefix + UTF-8 data, so the
    // 4-char magic sits at bytes 8..12.
    let magic = std::str::from_utf8(&raw[8..12]).unwrap_or("");
    if magic != expected {
        return Err(PersistError::InvalidFormat(format!(
            "Unknown magic '{}' (expected '{}')",
            magic, expected
        )));
    }
    Ok(bincode::deserialize(raw)?)
}

// ============================================================================
// REGIONS & OUTLINES
// ============================================================================

pub fn save_region(region: &Region, path: &Path) -> Result<(), PersistError> {
    write_doc(
        &RegionFile { magic: MAGIC_REGION.to_string(), region: region.into() },
        path,
    )
}

pub fn load_region(path: &Path) -> Result<Region, PersistError> {
    let doc: RegionFile = read_doc(path, MAGIC_REGION)?;
    doc.region.to_region()
}

pub fn save_outline(outline: &Outline, path: &Path) -> Result<(), PersistError> {
    write_doc(
        &OutlineFile { magic: MAGIC_OUTLINE.to_string(), outline: outline.to_data() },
        path,
    )
}

pub fn load_outline(path: &Path) -> Result<Outline, PersistError> {
    let doc: OutlineFile = read_doc(path, MAGIC_OUTLINE)?;
    Ok(Outline::from_data(&doc.outline)?)
}

// ============================================================================
// SELECTIONS
// ============================================================================

pub fn save_selection(selection: &Selection, path: &Path) -> Result<(), PersistError> {
    let data = selection.data();
    let clip = selection.clip_rect();
    let doc = SelectionFile {
        magic: MAGIC_SELECTION.to_string(),
        clip_rect: [clip.x, clip.y, clip.width, clip.height],
        base_path: data.base_path.to_data(),
        continuation: data.continuation.to_data(),
        continuation_mode: data.continuation_mode.code(),
        cumulative_transform: data.cumulative_transform,
        interim_transform: data.interim_transform,
    };
    write_doc(&doc, path)
}

/// Load a selection saved by [`save_selection`]. The result has no
/// listeners attached.
pub fn load_selection(path: &Path) -> Result<Selection, PersistError> {
    let doc: SelectionFile = read_doc(path, MAGIC_SELECTION)?;
    let [x, y, w, h] = doc.clip_rect;
    let data = SelectionData {
        base_path: Outline::from_data(&doc.base_path)?,
        continuation: Outline::from_data(&doc.continuation)?,
        continuation_mode: CombineMode::try_from(doc.continuation_mode)?,
        cumulative_transform: doc.cumulative_transform,
        interim_transform: doc.interim_transform,
    };
    let mut selection = Selection::with_clip_rect(Rect::new(x, y, w, h));
    selection.restore(&data);
    Ok(selection)
}

// ============================================================================
// MASKED BUFFERS - sparse tiles, split and joined with rayon
// ============================================================================

pub fn save_masked(buffer: &MaskedBuffer, path: &Path, tile_size: u32) -> Result<(), PersistError> {
    let tile_size = tile_size.clamp(1, MAX_BUFFER_DIM);
    let region = buffer.region()?;
    let (width, height, tiles) = match buffer.pixels()? {
        Some(img) => (img.width(), img.height(), split_tiles(img, tile_size)),
        None => (0, 0, Vec::new()),
    };
    log_info!(
        "save_masked: {}x{} buffer, {} non-empty tiles of {}px -> {}",
        width,
        height,
        tiles.len(),
        tile_size,
        path.display()
    );
    let doc = MaskedFile {
        magic: MAGIC_MASKED.to_string(),
        region: (&region).into(),
        width,
        height,
        tile_size,
        tiles,
    };
    write_doc(&doc, path)
}

pub fn load_masked(path: &Path) -> Result<MaskedBuffer, PersistError> {
    let doc: MaskedFile = read_doc(path, MAGIC_MASKED)?;
    let region = doc.region.to_region()?;

    if doc.width == 0 || doc.height == 0 {
        return Ok(MaskedBuffer::from_parts(None, region)?);
    }
    let img = join_tiles(doc.width, doc.height, doc.tile_size, &doc.tiles)?;
    Ok(MaskedBuffer::from_parts(Some(img), region)?)
}

/// Width and height of tile `(tx, ty)`, trimmed at the image edge.
fn tile_extent(width: u32, height: u32, tile_size: u32, tx: u32, ty: u32) -> (u32, u32) {
    let x0 = tx * tile_size;
    let y0 = ty * tile_size;
    (tile_size.min(width - x0), tile_size.min(height - y0))
}

fn split_tiles(img: &RgbaImage, tile_size: u32) -> Vec<TileData> {
    let (width, height) = img.dimensions();
    let cols = width.div_ceil(tile_size);
    let rows = height.div_ceil(tile_size);
    let stride = width as usize * 4;
    let raw = img.as_raw();

    (0..rows * cols)
        .into_par_iter()
        .filter_map(|i| {
            let (tx, ty) = (i % cols, i / cols);
            let (tw, th) = tile_extent(width, height, tile_size, tx, ty);
            let row_len = tw as usize * 4;
            let mut pixels = Vec::with_capacity(row_len * th as usize);
            for y in 0..th {
                let start = (ty * tile_size + y) as usize * stride + (tx * tile_size) as usize * 4;
                pixels.extend_from_slice(&raw[start..start + row_len]);
            }
            if pixels.iter().all(|&b| b == 0) {
                None
            } else {
                Some(TileData { tx, ty, pixels })
            }
        })
        .collect()
}

fn join_tiles(width: u32, height: u32, tile_size: u32, tiles: &[TileData]) -> Result<RgbaImage, PersistError> {
    if width > MAX_BUFFER_DIM || height > MAX_BUFFER_DIM {
        return Err(PersistError::InvalidFormat(format!(
            "Buffer size {}x{} exceeds maximum allowed {}x{}",
            width, height, MAX_BUFFER_DIM, MAX_BUFFER_DIM
        )));
    }
    if tile_size == 0 || tile_size > MAX_BUFFER_DIM {
        return Err(PersistError::InvalidFormat(format!(
            "Tile size {} outside 1..={}",
            tile_size, MAX_BUFFER_DIM
        )));
    }
    let cols = width.div_ceil(tile_size);
    let rows = height.div_ceil(tile_size);

    // Validate and group by tile row so each band can be filled independently.
    let mut by_row: Vec<Vec<&TileData>> = vec![Vec::new(); rows as usize];
    for tile in tiles {
        if tile.tx >= cols || tile.ty >= rows {
            return Err(PersistError::InvalidFormat(format!(
                "Tile ({},{}) lies outside a {}x{} grid",
                tile.tx, tile.ty, cols, rows
            )));
        }
        let (tw, th) = tile_extent(width, height, tile_size, tile.tx, tile.ty);
        let expected = tw as usize * th as usize * 4;
        if tile.pixels.len() != expected {
            return Err(PersistError::InvalidFormat(format!(
                "Tile ({},{}) has {} bytes, expected {}",
                tile.tx,
                tile.ty,
                tile.pixels.len(),
                expected
            )));
        }
        by_row[tile.ty as usize].push(tile);
    }

    let mut img = RgbaImage::new(width, height);
    let stride = width as usize * 4;
    let band_bytes = stride * tile_size as usize;
    let raw: &mut [u8] = img.as_mut();
    raw.par_chunks_mut(band_bytes)
        .zip(by_row.par_iter())
        .for_each(|(band, row_tiles)| {
            for tile in row_tiles {
                let (tw, th) = tile_extent(width, height, tile_size, tile.tx, tile.ty);
                let row_len = tw as usize * 4;
                for y in 0..th as usize {
                    let dst = y * stride + (tile.tx * tile_size) as usize * 4;
                    band[dst..dst + row_len].copy_from_slice(&tile.pixels[y * row_len..(y + 1) * row_len]);
                }
            }
        });
    Ok(img)
}

// ============================================================================
// IMAGE FILES (CLI / headless mode)
// ============================================================================

pub fn load_image(path: &Path) -> Result<RgbaImage, PersistError> {
    Ok(image::open(path)?.to_rgba8())
}

/// Save using the format implied by the file extension.
pub fn save_image(img: &RgbaImage, path: &Path) -> Result<(), PersistError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    img.save(path)?;
    Ok(())
}
