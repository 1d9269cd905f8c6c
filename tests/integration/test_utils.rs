//! Shared helpers for integration tests: minimal plane-file and companion
//! document builders.

use std::io::Write;
use std::path::{Path, PathBuf};

const TYPE_ASCII: u16 = 2;
const TYPE_SHORT: u16 = 3;
const TYPE_LONG: u16 = 4;

fn entry(data: &mut Vec<u8>, tag: u16, field_type: u16, count: u32, value: u32) {
    data.extend_from_slice(&tag.to_le_bytes());
    data.extend_from_slice(&field_type.to_le_bytes());
    data.extend_from_slice(&count.to_le_bytes());
    data.extend_from_slice(&value.to_le_bytes());
}

/// Build a minimal little-endian uncompressed plane file: one directory per
/// plane, 8-bit single-sample pixels, one strip per plane.
pub fn build_plane_file(width: u32, height: u32, planes: &[Vec<u8>]) -> Vec<u8> {
    build_plane_file_with_description(width, height, planes, None)
}

/// Same as [`build_plane_file`], optionally embedding a description comment
/// in the first directory (how comment-embedded companion documents ship).
pub fn build_plane_file_with_description(
    width: u32,
    height: u32,
    planes: &[Vec<u8>],
    description: Option<&str>,
) -> Vec<u8> {
    let plane_len = (width * height) as usize;
    let mut dir_lens = Vec::new();
    for i in 0..planes.len() {
        let entries = if i == 0 && description.is_some() { 8 } else { 7 };
        dir_lens.push(2 + entries * 12 + 4);
    }
    let dirs_total: usize = dir_lens.iter().sum();

    // Description text (NUL-terminated) sits between directories and pixels.
    let description_bytes = description
        .map(|d| {
            let mut bytes = d.as_bytes().to_vec();
            bytes.push(0);
            bytes
        })
        .unwrap_or_default();
    let description_start = 8 + dirs_total;
    let data_start = description_start + description_bytes.len();

    let mut data = vec![0x49, 0x49, 0x2A, 0x00, 0x08, 0x00, 0x00, 0x00];
    let mut dir_offset = 8usize;
    for (i, _) in planes.iter().enumerate() {
        let has_description = i == 0 && description.is_some();
        let entries = if has_description { 8u16 } else { 7 };
        data.extend_from_slice(&entries.to_le_bytes());
        entry(&mut data, 256, TYPE_LONG, 1, width);
        entry(&mut data, 257, TYPE_LONG, 1, height);
        entry(&mut data, 258, TYPE_SHORT, 1, 8);
        entry(&mut data, 259, TYPE_SHORT, 1, 1);
        if has_description {
            entry(
                &mut data,
                270,
                TYPE_ASCII,
                description_bytes.len() as u32,
                description_start as u32,
            );
        }
        entry(
            &mut data,
            273,
            TYPE_LONG,
            1,
            (data_start + i * plane_len) as u32,
        );
        entry(&mut data, 277, TYPE_SHORT, 1, 1);
        entry(&mut data, 278, TYPE_LONG, 1, height);

        dir_offset += dir_lens[i];
        let next = if i + 1 == planes.len() {
            0u32
        } else {
            dir_offset as u32
        };
        data.extend_from_slice(&next.to_le_bytes());
    }

    data.extend_from_slice(&description_bytes);
    for plane in planes {
        assert_eq!(plane.len(), plane_len);
        data.extend_from_slice(plane);
    }
    data
}

/// A plane whose every pixel is `value`.
pub fn uniform_plane(width: u32, height: u32, value: u8) -> Vec<u8> {
    vec![value; (width * height) as usize]
}

/// A plane with row-major increasing values starting at `base`.
pub fn gradient_plane(width: u32, height: u32, base: u8) -> Vec<u8> {
    (0..width * height)
        .map(|i| base.wrapping_add(i as u8))
        .collect()
}

/// Write bytes under `dir` and return the full path.
pub fn write_file(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::File::create(&path)
        .unwrap()
        .write_all(bytes)
        .unwrap();
    path
}

/// Write a companion document under `dir` and return the full path.
pub fn write_companion(dir: &Path, name: &str, xml: &str) -> PathBuf {
    write_file(dir, name, xml.as_bytes())
}
