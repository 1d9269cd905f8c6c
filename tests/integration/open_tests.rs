//! Open-path integration tests: document loading, fatal open errors,
//! pruning and the single-image collapse through the public API.

use companion_reader::{
    CompanionReader, DimensionOrder, MetadataError, OpenError, PixelType, ReaderOptions,
};

use super::test_utils::{
    build_plane_file_with_description, gradient_plane, write_companion, write_file,
};

fn two_series_xml() -> String {
    r#"<?xml version="1.0" encoding="UTF-8"?>
<OME xmlns="http://www.openmicroscopy.org/Schemas/OME/2016-06">
  <Image ID="Image:0" Name="overview">
    <Pixels DimensionOrder="XYCZT" Type="uint16" SizeX="32" SizeY="24"
            SizeZ="2" SizeC="2" SizeT="1" BigEndian="false">
      <Channel SamplesPerPixel="1"/>
      <Channel SamplesPerPixel="1"/>
      <TiffData FirstC="0" FirstZ="0" FirstT="0" IFD="0" PlaneCount="4">
        <UUID FileName="overview.tif"/>
      </TiffData>
    </Pixels>
  </Image>
  <Image ID="Image:1" Name="detail">
    <Pixels DimensionOrder="XYZCT" Type="uint8" SizeX="16" SizeY="16"
            SizeZ="3" SizeC="1" SizeT="1">
      <TiffData FirstZ="0" IFD="0" PlaneCount="3">
        <UUID FileName="detail.tif"/>
      </TiffData>
    </Pixels>
  </Image>
</OME>"#
        .to_string()
}

#[test]
fn test_open_side_car_document() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_companion(dir.path(), "plate.companion.ome", &two_series_xml());

    let reader = CompanionReader::open(&path).unwrap();
    assert_eq!(reader.series_count(), 2);

    let overview = reader.series(0).unwrap();
    assert_eq!(overview.name.as_deref(), Some("overview"));
    assert_eq!((overview.size_x, overview.size_y), (32, 24));
    assert_eq!(overview.pixel_type, PixelType::UInt16);
    assert_eq!(overview.dimension_order, DimensionOrder::Xyczt);
    assert_eq!(overview.image_count, 4);

    let detail = reader.series(1).unwrap();
    assert_eq!(detail.pixel_type, PixelType::UInt8);
    assert_eq!(detail.dimension_order, DimensionOrder::Xyzct);
    assert_eq!(detail.image_count, 3);
}

#[test]
fn test_open_comment_embedded_document() {
    let dir = tempfile::tempdir().unwrap();

    let xml = r#"<OME><Image ID="i">
      <Pixels DimensionOrder="XYCZT" Type="uint8" SizeX="4" SizeY="4"
              SizeZ="2" SizeC="1" SizeT="1">
        <TiffData IFD="0" PlaneCount="2"><UUID FileName="planes.tif"/></TiffData>
      </Pixels>
    </Image></OME>"#;

    let planes = vec![gradient_plane(4, 4, 0), gradient_plane(4, 4, 100)];
    let bytes = build_plane_file_with_description(4, 4, &planes, Some(xml));
    let path = write_file(dir.path(), "planes.tif", &bytes);

    // Opening the plane file itself extracts the embedded document, and the
    // document's reference resolves back to the same file.
    let reader = CompanionReader::open(&path).unwrap();
    assert_eq!(reader.series_count(), 1);
    assert_eq!(reader.image_count(0), Some(2));

    let plane = reader.read_region(0, 1, 0, 0, 4, 4).unwrap();
    assert_eq!(&plane[..], &gradient_plane(4, 4, 100)[..]);
}

#[test]
fn test_open_malformed_document_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_companion(dir.path(), "broken.companion.ome", "<OME><Image></OME>");

    let err = CompanionReader::open(&path).unwrap_err();
    assert!(matches!(
        err,
        OpenError::Metadata(MetadataError::Malformed(_))
    ));
}

#[test]
fn test_open_wrong_root_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_companion(dir.path(), "wrong.companion.ome", "<Report/>");

    let err = CompanionReader::open(&path).unwrap_err();
    assert!(matches!(
        err,
        OpenError::Metadata(MetadataError::MissingRoot)
    ));
}

#[test]
fn test_open_incomplete_pixels_fails() {
    let dir = tempfile::tempdir().unwrap();
    let xml = r#"<OME><Image ID="i">
      <Pixels DimensionOrder="XYCZT" Type="uint8" SizeX="4" SizeY="4"/>
    </Image></OME>"#;
    let path = write_companion(dir.path(), "partial.companion.ome", xml);

    let err = CompanionReader::open(&path).unwrap_err();
    assert!(matches!(
        err,
        OpenError::IncompleteMetadata {
            series: 0,
            field: "SizeZ"
        }
    ));
}

#[test]
fn test_open_missing_document_fails() {
    let dir = tempfile::tempdir().unwrap();
    let err = CompanionReader::open(dir.path().join("absent.companion.ome")).unwrap_err();
    assert!(matches!(err, OpenError::Io(_)));
}

#[test]
fn test_open_never_touches_plane_files() {
    // The whole point of the lazy engine: the referenced files do not exist
    // and open still succeeds instantly.
    let dir = tempfile::tempdir().unwrap();
    let path = write_companion(dir.path(), "ghost.companion.ome", &two_series_xml());

    let reader = CompanionReader::open(&path).unwrap();
    assert_eq!(reader.series_count(), 2);
    assert_eq!(reader.validation_counts(), (0, 0));
}

#[test]
fn test_fail_on_missing_reference_policy() {
    let dir = tempfile::tempdir().unwrap();
    let xml = r#"<OME><Image ID="i">
      <Pixels DimensionOrder="XYCZT" Type="uint8" SizeX="4" SizeY="4"
              SizeZ="1" SizeC="1" SizeT="1">
        <TiffData PlaneCount="1"><UUID>urn:uuid:never-declared</UUID></TiffData>
      </Pixels>
    </Image></OME>"#;
    let path = write_companion(dir.path(), "unresolved.companion.ome", xml);

    // Default policy: deferred, open succeeds.
    let reader = CompanionReader::open(&path).unwrap();
    assert_eq!(reader.series_count(), 1);

    // Strict policy: fatal at open.
    let err = CompanionReader::open_with(
        &path,
        ReaderOptions::default().fail_on_missing(true),
    )
    .unwrap_err();
    assert!(matches!(err, OpenError::UnresolvedReference { series: 0 }));
}

#[test]
fn test_pruning_renumbers_series() {
    let dir = tempfile::tempdir().unwrap();
    let xml = r#"<OME>
      <Image ID="Image:0" Name="placeholder">
        <Pixels DimensionOrder="XYCZT" Type="uint8" SizeX="8" SizeY="8"
                SizeZ="1" SizeC="1" SizeT="1">
          <TiffData PlaneCount="0"><UUID FileName="never.tif"/></TiffData>
        </Pixels>
      </Image>
      <Image ID="Image:1" Name="actual">
        <Pixels DimensionOrder="XYCZT" Type="uint8" SizeX="16" SizeY="16"
                SizeZ="1" SizeC="1" SizeT="1">
          <TiffData PlaneCount="1"><UUID FileName="actual.tif"/></TiffData>
        </Pixels>
      </Image>
    </OME>"#;
    let path = write_companion(dir.path(), "pruned.companion.ome", xml);

    let reader = CompanionReader::open(&path).unwrap();
    assert_eq!(reader.series_count(), 1);
    assert_eq!(reader.series(0).unwrap().name.as_deref(), Some("actual"));
    assert_eq!(reader.size_x(0), Some(16));
}

#[test]
fn test_single_image_collapse_through_open() {
    let dir = tempfile::tempdir().unwrap();
    let xml = r#"<OME><Image ID="i">
      <Pixels DimensionOrder="XYZCT" Type="uint8" SizeX="8" SizeY="8"
              SizeZ="5" SizeC="1" SizeT="1">
        <TiffData IFD="0" PlaneCount="1"><UUID FileName="single.tif"/></TiffData>
      </Pixels>
    </Image></OME>"#;
    let path = write_companion(dir.path(), "single.companion.ome", xml);

    let reader = CompanionReader::open(&path).unwrap();
    assert_eq!(reader.size_z(0), Some(1));
    assert_eq!(reader.size_t(0), Some(1));
    assert_eq!(reader.size_c(0), Some(1));
    assert_eq!(reader.image_count(0), Some(1));
}
