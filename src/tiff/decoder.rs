//! Default decoder for uncompressed plane files.
//!
//! One decoder instance serves one file; it keeps the file handle and the
//! walked directory chain, and parses per-plane geometry lazily the first
//! time each plane is touched. Only uncompressed chunky data is handled;
//! anything else is a decode failure the read path contains per file.
//! Exotic containers belong behind their own [`PlaneDecoder`]
//! implementation.
//!
//! [`PlaneDecoder`]: crate::decode::PlaneDecoder

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use crate::decode::PlaneDecoder;
use crate::error::DecodeError;

use super::directory::{
    walk_directory_offsets, Directory, TAG_BITS_PER_SAMPLE, TAG_COMPRESSION, TAG_IMAGE_LENGTH,
    TAG_IMAGE_WIDTH, TAG_PLANAR_CONFIGURATION, TAG_ROWS_PER_STRIP, TAG_SAMPLES_PER_PIXEL,
    TAG_STRIP_OFFSETS, TAG_TILE_LENGTH, TAG_TILE_OFFSETS, TAG_TILE_WIDTH,
};
use super::header::{sniff_file, PlaneFileHeader};

/// Compression tag value meaning "none".
const COMPRESSION_NONE: u64 = 1;

/// Planar configuration tag value meaning "chunky" (samples interleaved).
const PLANAR_CHUNKY: u64 = 1;

// =============================================================================
// Geometry
// =============================================================================

/// Pixel layout of one plane, resolved from its directory.
#[derive(Debug, Clone)]
struct PlaneGeometry {
    width: u32,
    height: u32,
    /// Bytes per sample (storage size)
    sample_len: u32,
    samples_per_pixel: u32,
    layout: PlaneLayout,
}

#[derive(Debug, Clone)]
enum PlaneLayout {
    Strips {
        rows_per_strip: u32,
        offsets: Vec<u64>,
    },
    Tiles {
        tile_width: u32,
        tile_length: u32,
        offsets: Vec<u64>,
    },
}

impl PlaneGeometry {
    /// Bytes per pixel: sample size times interleaved sample count.
    fn pixel_len(&self) -> u64 {
        self.sample_len as u64 * self.samples_per_pixel as u64
    }
}

// =============================================================================
// TiffPlaneDecoder
// =============================================================================

/// Decoder for one uncompressed plane file.
pub struct TiffPlaneDecoder {
    file: File,
    header: PlaneFileHeader,
    dir_offsets: Vec<u64>,
    /// Geometry cache, one slot per directory, filled lazily
    geometries: Vec<Option<PlaneGeometry>>,
}

impl TiffPlaneDecoder {
    /// Open a plane file: sniff its header and walk the directory chain.
    ///
    /// No pixel data and no per-plane tags are read here; geometry is
    /// resolved on first access to each plane.
    pub fn open(path: &Path) -> Result<Self, DecodeError> {
        let header = sniff_file(path)?;
        let mut file = File::open(path).map_err(|e| DecodeError::Io(e.to_string()))?;
        let file_size = file
            .metadata()
            .map_err(|e| DecodeError::Io(e.to_string()))?
            .len();

        let dir_offsets = walk_directory_offsets(&mut file, &header, file_size)?;
        let geometries = vec![None; dir_offsets.len()];

        Ok(Self {
            file,
            header,
            dir_offsets,
            geometries,
        })
    }

    fn geometry(&mut self, plane: u64) -> Result<&PlaneGeometry, DecodeError> {
        let index = plane as usize;
        if index >= self.dir_offsets.len() {
            return Err(DecodeError::PlaneOutOfRange {
                plane,
                count: self.dir_offsets.len() as u64,
            });
        }

        if self.geometries[index].is_none() {
            let dir = Directory::read(&mut self.file, &self.header, self.dir_offsets[index])?;
            let geometry = self.parse_geometry(&dir)?;
            self.geometries[index] = Some(geometry);
        }

        // Slot was just filled above when empty
        match self.geometries[index].as_ref() {
            Some(g) => Ok(g),
            None => Err(DecodeError::Io("geometry cache slot empty".to_string())),
        }
    }

    fn parse_geometry(&mut self, dir: &Directory) -> Result<PlaneGeometry, DecodeError> {
        let file = &mut self.file;
        let header = &self.header;

        let width = dir
            .first_value(file, header, TAG_IMAGE_WIDTH)?
            .ok_or(DecodeError::MissingTag("ImageWidth"))? as u32;
        let height = dir
            .first_value(file, header, TAG_IMAGE_LENGTH)?
            .ok_or(DecodeError::MissingTag("ImageLength"))? as u32;

        let bits = dir
            .first_value(file, header, TAG_BITS_PER_SAMPLE)?
            .unwrap_or(8);
        if bits == 0 || bits % 8 != 0 {
            return Err(DecodeError::InvalidTagValue {
                tag: "BitsPerSample",
                message: format!("{bits} bits per sample is not byte-aligned"),
            });
        }

        let samples_per_pixel = dir
            .first_value(file, header, TAG_SAMPLES_PER_PIXEL)?
            .unwrap_or(1) as u32;

        let compression = dir
            .first_value(file, header, TAG_COMPRESSION)?
            .unwrap_or(COMPRESSION_NONE);
        if compression != COMPRESSION_NONE {
            return Err(DecodeError::UnsupportedCompression(compression as u16));
        }

        let planar = dir
            .first_value(file, header, TAG_PLANAR_CONFIGURATION)?
            .unwrap_or(PLANAR_CHUNKY);
        if planar != PLANAR_CHUNKY {
            return Err(DecodeError::InvalidTagValue {
                tag: "PlanarConfiguration",
                message: format!("planar configuration {planar} is not chunky"),
            });
        }

        let layout = if let Some(tile_width) = dir.first_value(file, header, TAG_TILE_WIDTH)? {
            let tile_length = dir
                .first_value(file, header, TAG_TILE_LENGTH)?
                .ok_or(DecodeError::MissingTag("TileLength"))? as u32;
            let offsets = dir
                .values(file, header, TAG_TILE_OFFSETS)?
                .ok_or(DecodeError::MissingTag("TileOffsets"))?;
            PlaneLayout::Tiles {
                tile_width: tile_width as u32,
                tile_length,
                offsets,
            }
        } else {
            let offsets = dir
                .values(file, header, TAG_STRIP_OFFSETS)?
                .ok_or(DecodeError::MissingTag("StripOffsets"))?;
            let rows_per_strip = dir
                .first_value(file, header, TAG_ROWS_PER_STRIP)?
                .unwrap_or(height as u64) as u32;
            PlaneLayout::Strips {
                rows_per_strip: rows_per_strip.max(1),
                offsets,
            }
        };

        Ok(PlaneGeometry {
            width,
            height,
            sample_len: (bits / 8) as u32,
            samples_per_pixel,
            layout,
        })
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<(), DecodeError> {
        self.file
            .seek(SeekFrom::Start(offset))
            .map_err(|e| DecodeError::Io(e.to_string()))?;
        self.file.read_exact(buf).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                DecodeError::Truncated {
                    required: offset + buf.len() as u64,
                    actual: 0,
                }
            } else {
                DecodeError::Io(e.to_string())
            }
        })
    }
}

impl PlaneDecoder for TiffPlaneDecoder {
    fn plane_count(&self) -> u64 {
        self.dir_offsets.len() as u64
    }

    fn samples_per_pixel(&mut self) -> Result<u32, DecodeError> {
        Ok(self.geometry(0)?.samples_per_pixel)
    }

    fn read_region(
        &mut self,
        plane: u64,
        x: u32,
        y: u32,
        w: u32,
        h: u32,
    ) -> Result<Vec<u8>, DecodeError> {
        let geometry = self.geometry(plane)?.clone();

        if x.saturating_add(w) > geometry.width || y.saturating_add(h) > geometry.height {
            return Err(DecodeError::RegionOutsidePlane {
                x,
                y,
                w,
                h,
                width: geometry.width,
                height: geometry.height,
            });
        }

        let pixel_len = geometry.pixel_len();
        let mut out = vec![0u8; (w as u64 * h as u64 * pixel_len) as usize];
        let out_row_len = (w as u64 * pixel_len) as usize;

        match &geometry.layout {
            PlaneLayout::Strips {
                rows_per_strip,
                offsets,
            } => {
                let full_row_len = geometry.width as u64 * pixel_len;
                for (row_index, row) in (y..y + h).enumerate() {
                    let strip = (row / rows_per_strip) as usize;
                    let row_in_strip = (row % rows_per_strip) as u64;
                    let strip_offset =
                        *offsets.get(strip).ok_or(DecodeError::Truncated {
                            required: strip as u64 + 1,
                            actual: offsets.len() as u64,
                        })?;

                    let src = strip_offset + row_in_strip * full_row_len + x as u64 * pixel_len;
                    let dst = row_index * out_row_len;
                    let mut row_buf = vec![0u8; out_row_len];
                    self.read_at(src, &mut row_buf)?;
                    out[dst..dst + out_row_len].copy_from_slice(&row_buf);
                }
            }
            PlaneLayout::Tiles {
                tile_width,
                tile_length,
                offsets,
            } => {
                let tiles_across = geometry.width.div_ceil(*tile_width) as u64;
                let tile_row_len = *tile_width as u64 * pixel_len;

                for (row_index, row) in (y..y + h).enumerate() {
                    let tile_y = (row / tile_length) as u64;
                    let row_in_tile = (row % tile_length) as u64;

                    let mut cx = x;
                    let mut dst = row_index * out_row_len;
                    while cx < x + w {
                        let tile_x = (cx / tile_width) as u64;
                        let x_in_tile = (cx % tile_width) as u64;
                        let segment_w =
                            ((*tile_width as u64 - x_in_tile).min((x + w - cx) as u64)) as u32;

                        let tile_index = (tile_y * tiles_across + tile_x) as usize;
                        let tile_offset =
                            *offsets.get(tile_index).ok_or(DecodeError::Truncated {
                                required: tile_index as u64 + 1,
                                actual: offsets.len() as u64,
                            })?;

                        let src =
                            tile_offset + row_in_tile * tile_row_len + x_in_tile * pixel_len;
                        let segment_len = (segment_w as u64 * pixel_len) as usize;
                        let mut segment = vec![0u8; segment_len];
                        self.read_at(src, &mut segment)?;
                        out[dst..dst + segment_len].copy_from_slice(&segment);

                        cx += segment_w;
                        dst += segment_len;
                    }
                }
            }
        }

        Ok(out)
    }
}

// =============================================================================
// Tests
// =============================================================================
