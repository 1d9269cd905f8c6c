//! Read-path integration tests against real plane files on disk.

use companion_reader::{CompanionReader, ReadError};

use super::test_utils::{build_plane_file, gradient_plane, uniform_plane, write_companion, write_file};

/// Two-channel, two-depth dataset: channel 0 in one file, channel 1 in
/// another, each file carrying its two depth planes as directories.
fn two_file_dataset(dir: &std::path::Path) -> std::path::PathBuf {
    let c0 = vec![gradient_plane(8, 8, 0), gradient_plane(8, 8, 64)];
    let c1 = vec![gradient_plane(8, 8, 128), gradient_plane(8, 8, 192)];
    write_file(dir, "c0.tif", &build_plane_file(8, 8, &c0));
    write_file(dir, "c1.tif", &build_plane_file(8, 8, &c1));

    let xml = r#"<OME><Image ID="i" Name="two channels">
      <Pixels DimensionOrder="XYCZT" Type="uint8" SizeX="8" SizeY="8"
              SizeZ="2" SizeC="2" SizeT="1">
        <Channel SamplesPerPixel="1"/>
        <Channel SamplesPerPixel="1"/>
        <TiffData FirstC="0" FirstZ="0" IFD="0" PlaneCount="1"><UUID FileName="c0.tif"/></TiffData>
        <TiffData FirstC="0" FirstZ="1" IFD="1" PlaneCount="1"><UUID FileName="c0.tif"/></TiffData>
        <TiffData FirstC="1" FirstZ="0" IFD="0" PlaneCount="1"><UUID FileName="c1.tif"/></TiffData>
        <TiffData FirstC="1" FirstZ="1" IFD="1" PlaneCount="1"><UUID FileName="c1.tif"/></TiffData>
      </Pixels>
    </Image></OME>"#;
    write_companion(dir, "pair.companion.ome", xml)
}

#[test]
fn test_full_plane_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = two_file_dataset(dir.path());
    let reader = CompanionReader::open(&path).unwrap();

    // XYCZT with size_c = 2: linear index = z*2 + c
    let expectations = [
        (0usize, gradient_plane(8, 8, 0)),   // c0 z0
        (1, gradient_plane(8, 8, 128)),      // c1 z0
        (2, gradient_plane(8, 8, 64)),       // c0 z1
        (3, gradient_plane(8, 8, 192)),      // c1 z1
    ];
    for (plane, expected) in expectations {
        let data = reader.read_region(0, plane, 0, 0, 8, 8).unwrap();
        assert_eq!(&data[..], &expected[..], "plane {plane}");
    }
}

#[test]
fn test_sub_region_read() {
    let dir = tempfile::tempdir().unwrap();
    let path = two_file_dataset(dir.path());
    let reader = CompanionReader::open(&path).unwrap();

    // 2x2 region at (3, 2) of the gradient: row-major values base + y*8 + x
    let data = reader.read_region(0, 0, 3, 2, 2, 2).unwrap();
    assert_eq!(&data[..], &[19, 20, 27, 28]);
}

#[test]
fn test_missing_file_yields_fill_and_other_planes_survive() {
    let dir = tempfile::tempdir().unwrap();
    let path = two_file_dataset(dir.path());
    std::fs::remove_file(dir.path().join("c1.tif")).unwrap();

    let reader = CompanionReader::open(&path).unwrap();

    // Channel 1 planes come back as fill bytes...
    let fill = reader.read_region(0, 1, 0, 0, 8, 8).unwrap();
    assert!(fill.iter().all(|&b| b == 0));

    // ...while channel 0 planes still decode for real.
    let real = reader.read_region(0, 0, 0, 0, 8, 8).unwrap();
    assert_eq!(&real[..], &gradient_plane(8, 8, 0)[..]);

    assert_eq!(reader.validation_counts(), (1, 1));
}

#[test]
fn test_corrupt_file_yields_fill() {
    let dir = tempfile::tempdir().unwrap();
    let path = two_file_dataset(dir.path());
    // Overwrite one plane file with garbage that fails the sniff.
    write_file(dir.path(), "c1.tif", b"definitely not pixel data");

    let reader = CompanionReader::open(&path).unwrap();
    let fill = reader.read_region(0, 1, 0, 0, 8, 8).unwrap();
    assert!(fill.iter().all(|&b| b == 0));
}

#[test]
fn test_uniform_fill_value_configured() {
    let dir = tempfile::tempdir().unwrap();
    let xml = r#"<OME><Image ID="i">
      <Pixels DimensionOrder="XYCZT" Type="uint8" SizeX="4" SizeY="4"
              SizeZ="1" SizeC="1" SizeT="1">
        <TiffData PlaneCount="1"><UUID FileName="gone.tif"/></TiffData>
      </Pixels>
    </Image></OME>"#;
    let path = write_companion(dir.path(), "gone.companion.ome", xml);

    let reader = CompanionReader::open_with(
        &path,
        companion_reader::ReaderOptions::default().fill_value(0x5A),
    )
    .unwrap();
    let data = reader.read_region(0, 0, 1, 1, 2, 3).unwrap();
    assert_eq!(&data[..], &[0x5A; 6]);
}

#[test]
fn test_multi_directory_file_with_unspecified_run() {
    let dir = tempfile::tempdir().unwrap();
    let planes: Vec<Vec<u8>> = (0..4).map(|i| uniform_plane(4, 4, i * 10)).collect();
    write_file(dir.path(), "stack.tif", &build_plane_file(4, 4, &planes));

    // A single open-ended reference covers the whole depth stack.
    let xml = r#"<OME><Image ID="i">
      <Pixels DimensionOrder="XYZCT" Type="uint8" SizeX="4" SizeY="4"
              SizeZ="4" SizeC="1" SizeT="1">
        <TiffData IFD="0"><UUID FileName="stack.tif"/></TiffData>
      </Pixels>
    </Image></OME>"#;
    let path = write_companion(dir.path(), "stack.companion.ome", xml);

    let reader = CompanionReader::open(&path).unwrap();
    for (z, expected) in planes.iter().enumerate() {
        let data = reader.read_region(0, z, 0, 0, 4, 4).unwrap();
        assert_eq!(&data[..], &expected[..], "depth {z}");
    }
}

#[test]
fn test_read_request_validation() {
    let dir = tempfile::tempdir().unwrap();
    let path = two_file_dataset(dir.path());
    let reader = CompanionReader::open(&path).unwrap();

    assert!(matches!(
        reader.read_region(9, 0, 0, 0, 1, 1),
        Err(ReadError::SeriesOutOfRange { .. })
    ));
    assert!(matches!(
        reader.read_region(0, 99, 0, 0, 1, 1),
        Err(ReadError::PlaneOutOfRange { .. })
    ));
    assert!(matches!(
        reader.read_region(0, 0, 5, 5, 8, 8),
        Err(ReadError::RegionOutOfBounds { .. })
    ));
}

#[test]
fn test_optimal_tile_size_defaults_to_full_frame() {
    let dir = tempfile::tempdir().unwrap();
    let path = two_file_dataset(dir.path());
    let reader = CompanionReader::open(&path).unwrap();

    assert_eq!(reader.optimal_tile_width(0), Some(8));
    assert_eq!(reader.optimal_tile_height(0), Some(8));
}

#[test]
fn test_reads_after_close_fail() {
    let dir = tempfile::tempdir().unwrap();
    let path = two_file_dataset(dir.path());
    let reader = CompanionReader::open(&path).unwrap();

    reader.read_region(0, 0, 0, 0, 8, 8).unwrap();
    reader.close();
    assert!(matches!(
        reader.read_region(0, 0, 0, 0, 8, 8),
        Err(ReadError::Closed)
    ));
}
