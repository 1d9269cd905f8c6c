//! Streaming parser for companion documents.
//!
//! The parser walks the XML once with quick-xml, collecting the Image /
//! Pixels / Channel structure and the per-plane TiffData references. It is
//! deliberately lenient about elements it does not know (acquisition
//! vendors attach plenty of annotation blocks) and strict about values it
//! does: a size attribute that fails to parse is a fatal open error.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::MetadataError;

use super::model::{
    ChannelMetadata, CompanionMetadata, ImageMetadata, PixelType, PixelsMetadata, PlaneRef,
};

/// Parse a companion document from its XML text.
///
/// # Errors
/// - [`MetadataError::Malformed`] if the XML is not well-formed
/// - [`MetadataError::MissingRoot`] if the root element is absent or not a
///   companion root
/// - [`MetadataError::InvalidValue`] if a known attribute carries an
///   unusable value
pub fn parse_companion_xml(xml: &str) -> Result<CompanionMetadata, MetadataError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut state = ParserState::default();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => state.open_element(e, false)?,
            Ok(Event::Empty(ref e)) => state.open_element(e, true)?,
            Ok(Event::End(ref e)) => state.close_element(local_name(e.name().as_ref())),
            Ok(Event::Text(ref t)) => {
                if state.in_uuid {
                    if let Some(ref mut plane_ref) = state.current_ref {
                        let text = t.xml_content().map_err(malformed)?;
                        if !text.trim().is_empty() {
                            plane_ref.uuid = Some(text.trim().to_string());
                        }
                    }
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(malformed(e)),
        }
        buf.clear();
    }

    if !state.root_seen {
        return Err(MetadataError::MissingRoot);
    }

    Ok(state.metadata)
}

// =============================================================================
// Parser state
// =============================================================================

#[derive(Default)]
struct ParserState {
    metadata: CompanionMetadata,
    root_seen: bool,
    current_image: Option<ImageMetadata>,
    current_ref: Option<PlaneRef>,
    in_uuid: bool,
}

impl ParserState {
    /// Handle an opening element. Self-closing elements never receive a
    /// matching End event, so any container they would normally commit on
    /// close is committed here when `self_closing` is set.
    fn open_element(&mut self, e: &BytesStart, self_closing: bool) -> Result<(), MetadataError> {
        let name_binding = e.name();
        let name = local_name(name_binding.as_ref());

        if !self.root_seen {
            if name != b"OME" {
                return Err(MetadataError::MissingRoot);
            }
            self.root_seen = true;
            return Ok(());
        }

        match name {
            b"Image" => {
                let mut image = ImageMetadata::default();
                for attr in e.attributes() {
                    let attr = attr.map_err(malformed)?;
                    let value = attr_str(&attr.value)?;
                    match attr.key.as_ref() {
                        b"ID" => image.id = Some(value),
                        b"Name" => image.name = Some(value),
                        _ => {}
                    }
                }
                if self_closing {
                    self.metadata.images.push(image);
                } else {
                    self.current_image = Some(image);
                }
            }
            b"Pixels" => {
                if let Some(ref mut image) = self.current_image {
                    image.pixels = parse_pixels(e)?;
                }
            }
            b"Channel" => {
                if let Some(ref mut image) = self.current_image {
                    image.pixels.channels.push(parse_channel(e)?);
                }
            }
            b"TiffData" => {
                if self.current_image.is_some() {
                    let plane_ref = parse_plane_ref(e)?;
                    if self_closing {
                        self.commit_ref(plane_ref);
                    } else {
                        self.current_ref = Some(plane_ref);
                    }
                }
            }
            b"UUID" => {
                if let Some(ref mut plane_ref) = self.current_ref {
                    for attr in e.attributes() {
                        let attr = attr.map_err(malformed)?;
                        if attr.key.as_ref() == b"FileName" {
                            plane_ref.file_name = Some(attr_str(&attr.value)?);
                        }
                    }
                    if !self_closing {
                        self.in_uuid = true;
                    }
                }
            }
            _ => {}
        }

        Ok(())
    }

    fn close_element(&mut self, name: &[u8]) {
        match name {
            b"Image" => {
                if let Some(image) = self.current_image.take() {
                    self.metadata.images.push(image);
                }
            }
            b"TiffData" => {
                if let Some(plane_ref) = self.current_ref.take() {
                    self.commit_ref(plane_ref);
                }
            }
            b"UUID" => self.in_uuid = false,
            _ => {}
        }
    }

    fn commit_ref(&mut self, plane_ref: PlaneRef) {
        if let Some(ref mut image) = self.current_image {
            image.pixels.plane_refs.push(plane_ref);
        }
    }
}

// =============================================================================
// Element parsers
// =============================================================================

fn parse_pixels(e: &BytesStart) -> Result<PixelsMetadata, MetadataError> {
    let mut pixels = PixelsMetadata::default();

    for attr in e.attributes() {
        let attr = attr.map_err(malformed)?;
        let value = attr_str(&attr.value)?;
        match attr.key.as_ref() {
            b"SizeX" => pixels.size_x = Some(parse_u32("Pixels", "SizeX", &value)?),
            b"SizeY" => pixels.size_y = Some(parse_u32("Pixels", "SizeY", &value)?),
            b"SizeZ" => pixels.size_z = Some(parse_u32("Pixels", "SizeZ", &value)?),
            b"SizeC" => pixels.size_c = Some(parse_u32("Pixels", "SizeC", &value)?),
            b"SizeT" => pixels.size_t = Some(parse_u32("Pixels", "SizeT", &value)?),
            b"DimensionOrder" => pixels.dimension_order = Some(value),
            b"Type" => pixels.pixel_type = Some(PixelType::parse(&value)?),
            b"SignificantBits" => {
                pixels.significant_bits = Some(parse_u32("Pixels", "SignificantBits", &value)?)
            }
            b"BigEndian" => pixels.big_endian = Some(parse_bool("Pixels", "BigEndian", &value)?),
            _ => {}
        }
    }

    Ok(pixels)
}

fn parse_channel(e: &BytesStart) -> Result<ChannelMetadata, MetadataError> {
    let mut channel = ChannelMetadata::default();

    for attr in e.attributes() {
        let attr = attr.map_err(malformed)?;
        if attr.key.as_ref() == b"SamplesPerPixel" {
            let value = attr_str(&attr.value)?;
            channel.samples_per_pixel = Some(parse_u32("Channel", "SamplesPerPixel", &value)?);
        }
    }

    Ok(channel)
}

fn parse_plane_ref(e: &BytesStart) -> Result<PlaneRef, MetadataError> {
    let mut plane_ref = PlaneRef::default();

    for attr in e.attributes() {
        let attr = attr.map_err(malformed)?;
        let value = attr_str(&attr.value)?;
        match attr.key.as_ref() {
            b"IFD" => plane_ref.ifd = parse_u64("TiffData", "IFD", &value)?,
            b"FirstC" => plane_ref.first_c = parse_u32("TiffData", "FirstC", &value)?,
            b"FirstZ" => plane_ref.first_z = parse_u32("TiffData", "FirstZ", &value)?,
            b"FirstT" => plane_ref.first_t = parse_u32("TiffData", "FirstT", &value)?,
            b"PlaneCount" => {
                plane_ref.plane_count = Some(parse_u64("TiffData", "PlaneCount", &value)?)
            }
            b"FileName" => plane_ref.file_name = Some(value),
            _ => {}
        }
    }

    Ok(plane_ref)
}

// =============================================================================
// Helpers
// =============================================================================

/// Strip a namespace prefix from an element name.
fn local_name(name: &[u8]) -> &[u8] {
    match name.iter().rposition(|&b| b == b':') {
        Some(pos) => &name[pos + 1..],
        None => name,
    }
}

fn attr_str(value: &[u8]) -> Result<String, MetadataError> {
    std::str::from_utf8(value)
        .map(|s| s.to_string())
        .map_err(|e| MetadataError::Malformed(e.to_string()))
}

fn parse_u32(
    element: &'static str,
    attribute: &'static str,
    value: &str,
) -> Result<u32, MetadataError> {
    value
        .parse::<u32>()
        .map_err(|_| MetadataError::InvalidValue {
            element,
            attribute,
            value: value.to_string(),
        })
}

fn parse_u64(
    element: &'static str,
    attribute: &'static str,
    value: &str,
) -> Result<u64, MetadataError> {
    value
        .parse::<u64>()
        .map_err(|_| MetadataError::InvalidValue {
            element,
            attribute,
            value: value.to_string(),
        })
}

fn parse_bool(
    element: &'static str,
    attribute: &'static str,
    value: &str,
) -> Result<bool, MetadataError> {
    match value {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(MetadataError::InvalidValue {
            element,
            attribute,
            value: value.to_string(),
        }),
    }
}

fn malformed(err: impl std::fmt::Display) -> MetadataError {
    MetadataError::Malformed(err.to_string())
}

// =============================================================================
// Tests
// =============================================================================
