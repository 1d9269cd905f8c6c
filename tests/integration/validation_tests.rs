//! Lazy-validation integration tests: deferred checks, idempotence and
//! failure containment, with both real files and instrumented components.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use companion_reader::{
    CompanionReader, DecodeError, FileCheck, ReaderOptions, TiffDecoderFactory,
};

use super::test_utils::{build_plane_file, gradient_plane, write_companion, write_file};

/// FileCheck that counts invocations and otherwise defers to the default
/// behavior of checking the filesystem.
struct CountingCheck {
    calls: Arc<AtomicUsize>,
}

impl FileCheck for CountingCheck {
    fn check(&self, path: &Path) -> Result<(), DecodeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        companion_reader::sniff_file(path).map(|_| ())
    }
}

fn shared_file_xml() -> &'static str {
    r#"<OME><Image ID="i">
      <Pixels DimensionOrder="XYZCT" Type="uint8" SizeX="4" SizeY="4"
              SizeZ="3" SizeC="1" SizeT="1">
        <TiffData IFD="0" PlaneCount="3"><UUID FileName="stack.tif"/></TiffData>
      </Pixels>
    </Image></OME>"#
}

fn open_counting(
    dir: &Path,
    options: ReaderOptions,
) -> (CompanionReader, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let reader = CompanionReader::from_xml_with(
        shared_file_xml(),
        dir,
        options,
        Box::new(CountingCheck {
            calls: calls.clone(),
        }),
        Box::new(TiffDecoderFactory),
    )
    .unwrap();
    (reader, calls)
}

#[test]
fn test_existing_file_checked_exactly_once() {
    let dir = tempfile::tempdir().unwrap();
    let planes: Vec<Vec<u8>> = (0..3).map(|i| gradient_plane(4, 4, i * 50)).collect();
    write_file(dir.path(), "stack.tif", &build_plane_file(4, 4, &planes));

    let (reader, calls) = open_counting(
        dir.path(),
        ReaderOptions::default().trust_metadata(false),
    );

    // Three planes, one file: the check runs once, every read is real data.
    for (z, expected) in planes.iter().enumerate() {
        let data = reader.read_region(0, z, 0, 0, 4, 4).unwrap();
        assert_eq!(&data[..], &expected[..]);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(reader.validation_counts(), (1, 0));
}

#[test]
fn test_missing_file_checked_exactly_once_and_contained() {
    let dir = tempfile::tempdir().unwrap();
    // stack.tif is never written

    let (reader, calls) = open_counting(
        dir.path(),
        ReaderOptions::default().trust_metadata(false).fill_value(9),
    );

    let first = reader.read_region(0, 0, 0, 0, 4, 4).unwrap();
    assert_eq!(&first[..], &[9u8; 16]);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // Different planes sharing the invalid file: fill, no re-check.
    for z in 1..3 {
        let data = reader.read_region(0, z, 0, 0, 4, 4).unwrap();
        assert_eq!(&data[..], &[9u8; 16]);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(reader.validation_counts(), (0, 1));
}

#[test]
fn test_trust_metadata_never_invokes_check() {
    let dir = tempfile::tempdir().unwrap();
    let planes: Vec<Vec<u8>> = (0..3).map(|i| gradient_plane(4, 4, i * 50)).collect();
    write_file(dir.path(), "stack.tif", &build_plane_file(4, 4, &planes));

    let (reader, calls) = open_counting(dir.path(), ReaderOptions::default());

    reader.read_region(0, 0, 0, 0, 4, 4).unwrap();
    reader.read_region(0, 2, 0, 0, 4, 4).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_file_appearing_after_invalidation_stays_invalid() {
    let dir = tempfile::tempdir().unwrap();

    let (reader, calls) = open_counting(
        dir.path(),
        ReaderOptions::default().trust_metadata(false),
    );

    // First read fails: the file does not exist yet.
    let fill = reader.read_region(0, 0, 0, 0, 4, 4).unwrap();
    assert!(fill.iter().all(|&b| b == 0));

    // The file appears afterwards, but within this session the outcome is
    // terminal, so reads keep returning fill without a new check.
    let planes: Vec<Vec<u8>> = (0..3).map(|i| gradient_plane(4, 4, i * 50)).collect();
    write_file(dir.path(), "stack.tif", &build_plane_file(4, 4, &planes));

    let still_fill = reader.read_region(0, 1, 0, 0, 4, 4).unwrap();
    assert!(still_fill.iter().all(|&b| b == 0));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // A fresh handle over the same dataset sees the file normally.
    let (fresh, _) = open_counting(
        dir.path(),
        ReaderOptions::default().trust_metadata(false),
    );
    let data = fresh.read_region(0, 1, 0, 0, 4, 4).unwrap();
    assert_eq!(&data[..], &gradient_plane(4, 4, 50)[..]);
}

#[test]
fn test_independent_handles_share_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let planes: Vec<Vec<u8>> = (0..3).map(|i| gradient_plane(4, 4, i * 50)).collect();
    write_file(dir.path(), "stack.tif", &build_plane_file(4, 4, &planes));

    let (first, first_calls) = open_counting(
        dir.path(),
        ReaderOptions::default().trust_metadata(false),
    );
    let (second, second_calls) = open_counting(
        dir.path(),
        ReaderOptions::default().trust_metadata(false),
    );

    first.read_region(0, 0, 0, 0, 4, 4).unwrap();
    second.read_region(0, 0, 0, 0, 4, 4).unwrap();

    // Each handle runs its own check; nothing is shared between them.
    assert_eq!(first_calls.load(Ordering::SeqCst), 1);
    assert_eq!(second_calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_close_clears_validation_outcomes() {
    let dir = tempfile::tempdir().unwrap();
    let planes: Vec<Vec<u8>> = (0..3).map(|i| gradient_plane(4, 4, i * 50)).collect();
    write_file(dir.path(), "stack.tif", &build_plane_file(4, 4, &planes));

    let (reader, _calls) = open_counting(
        dir.path(),
        ReaderOptions::default().trust_metadata(false),
    );
    reader.read_region(0, 0, 0, 0, 4, 4).unwrap();
    assert_eq!(reader.validation_counts(), (1, 0));

    reader.close();
    assert_eq!(reader.validation_counts(), (0, 0));
}

#[test]
fn test_concurrent_reads_preserve_single_check() {
    let dir = tempfile::tempdir().unwrap();
    let planes: Vec<Vec<u8>> = (0..3).map(|i| gradient_plane(4, 4, i * 50)).collect();
    write_file(dir.path(), "stack.tif", &build_plane_file(4, 4, &planes));

    let (reader, calls) = open_counting(
        dir.path(),
        ReaderOptions::default().trust_metadata(false),
    );
    let reader = Arc::new(reader);

    let mut handles = Vec::new();
    for z in 0..3usize {
        let reader = reader.clone();
        handles.push(std::thread::spawn(move || {
            for _ in 0..10 {
                reader.read_region(0, z, 0, 0, 4, 4).unwrap();
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    // The check-then-update sequence is guarded: one check total.
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
