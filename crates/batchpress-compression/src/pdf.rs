//! PDF compressor
//!
//! Loads the document with lopdf, applies the rewrites switched on by the
//! level-derived [`CompressionFlags`](batchpress_types::CompressionFlags),
//! then saves it through the same keep-if-smaller path as the image codecs.
//!
//! | flag                 | rewrite                                           |
//! |----------------------|---------------------------------------------------|
//! | `remove_metadata`    | drop the trailer `Info` and catalog `Metadata`    |
//! | `remove_annotations` | drop `Annots` from every page                     |
//! | `remove_attachments` | drop `EmbeddedFiles` from the name tree           |
//! | `image_compression`  | re-encode 8-bit RGB/gray JPEG images              |
//! | `remove_duplicates`  | point identical streams at a single copy          |
//! | `compress_streams`   | flate every unfiltered stream                     |

use crate::output::{encode_smaller, ensure_live, run_blocking, PendingOutput};
use async_trait::async_trait;
use batchpress_types::{CompressionOutput, CompressionParams, Compressor, Error, Result};
use image::codecs::jpeg::JpegEncoder;
use image::ImageFormat;
use lopdf::{Dictionary, Document, Object, ObjectId};
use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// What one rewrite changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RewriteStats {
    /// Whether document info or XMP metadata was dropped
    pub metadata_removed: bool,
    /// Pages that lost their annotations
    pub annotations_removed: usize,
    /// Whether embedded files were dropped
    pub attachments_removed: bool,
    /// Images replaced by a smaller re-encode
    pub images_recompressed: usize,
    /// Streams folded into an identical earlier copy
    pub duplicates_merged: usize,
}

/// Rewrites PDF documents according to the compression level
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfCompressor;

impl PdfCompressor {
    /// Create a new PDF compressor
    pub fn new() -> Self {
        Self
    }

    /// Apply the enabled rewrites to a loaded document
    pub fn rewrite(doc: &mut Document, params: &CompressionParams) -> RewriteStats {
        let flags = params.flags;
        let mut stats = RewriteStats::default();

        if flags.remove_metadata {
            stats.metadata_removed = strip_metadata(doc);
        }
        if flags.remove_annotations {
            stats.annotations_removed = strip_annotations(doc);
        }
        if flags.remove_attachments {
            stats.attachments_removed = strip_attachments(doc);
        }
        if flags.image_compression {
            stats.images_recompressed = recompress_images(doc, params.image_quality);
        }
        if flags.remove_duplicates {
            stats.duplicates_merged = merge_duplicate_streams(doc);
        }

        let pruned = doc.prune_objects();
        debug!("Pruned {} unreachable objects", pruned.len());
        if flags.compress_streams {
            doc.compress();
        }
        doc.renumber_objects();
        stats
    }

    fn compress_blocking(
        input: &Path,
        output: &Path,
        params: &CompressionParams,
        cancel: &CancellationToken,
    ) -> Result<PendingOutput> {
        let mut doc = Document::load(input).map_err(|e| {
            Error::compression(format!("failed to parse {}: {}", input.display(), e))
        })?;
        if doc.trailer.has(b"Encrypt") {
            return Err(Error::compression(format!("{} is encrypted", input.display())));
        }
        ensure_live(cancel)?;

        let stats = Self::rewrite(&mut doc, params);
        debug!("Rewrote {}: {:?}", input.display(), stats);
        ensure_live(cancel)?;

        encode_smaller(input, output, cancel, |writer| {
            doc.save_to(writer)
                .map_err(|e| Error::compression(format!("failed to write PDF: {}", e)))
        })
    }
}

#[async_trait]
impl Compressor for PdfCompressor {
    fn name(&self) -> &str {
        "pdf"
    }

    fn extensions(&self) -> &[&'static str] {
        &["pdf"]
    }

    async fn compress(
        &self,
        input: &Path,
        output: &Path,
        params: &CompressionParams,
    ) -> Result<CompressionOutput> {
        let params = *params;
        let compressed_size = run_blocking("PDF", input, output, move |input, output, cancel| {
            Self::compress_blocking(input, output, &params, cancel)
        })
        .await?;

        Ok(CompressionOutput { compressed_size })
    }
}

fn catalog_id(doc: &Document) -> Option<ObjectId> {
    doc.trailer
        .get(b"Root")
        .and_then(Object::as_reference)
        .ok()
}

fn dictionary_mut(doc: &mut Document, id: ObjectId) -> Option<&mut Dictionary> {
    doc.get_object_mut(id).and_then(Object::as_dict_mut).ok()
}

fn name_is(dict: &Dictionary, key: &[u8], expected: &[u8]) -> bool {
    matches!(dict.get(key), Ok(Object::Name(name)) if name.as_slice() == expected)
}

fn strip_metadata(doc: &mut Document) -> bool {
    let mut removed = doc.trailer.remove(b"Info").is_some();
    if let Some(catalog) = catalog_id(doc).and_then(|id| dictionary_mut(doc, id)) {
        removed |= catalog.remove(b"Metadata").is_some();
    }
    removed
}

fn strip_annotations(doc: &mut Document) -> usize {
    let pages: Vec<ObjectId> = doc.get_pages().into_values().collect();
    pages
        .into_iter()
        .filter(|&id| {
            dictionary_mut(doc, id).is_some_and(|page| page.remove(b"Annots").is_some())
        })
        .count()
}

fn strip_attachments(doc: &mut Document) -> bool {
    let Some(catalog) = catalog_id(doc).and_then(|id| dictionary_mut(doc, id)) else {
        return false;
    };

    let names_id = match catalog.get_mut(b"Names") {
        Ok(Object::Dictionary(names)) => return names.remove(b"EmbeddedFiles").is_some(),
        Ok(Object::Reference(id)) => *id,
        _ => return false,
    };
    dictionary_mut(doc, names_id).is_some_and(|names| names.remove(b"EmbeddedFiles").is_some())
}

fn is_plain_jpeg(dict: &Dictionary) -> bool {
    name_is(dict, b"Subtype", b"Image")
        && name_is(dict, b"Filter", b"DCTDecode")
        && (name_is(dict, b"ColorSpace", b"DeviceRGB")
            || name_is(dict, b"ColorSpace", b"DeviceGray"))
        && matches!(dict.get(b"BitsPerComponent"), Ok(Object::Integer(8)))
}

fn reencode_jpeg(data: &[u8], quality: u8) -> Option<Vec<u8>> {
    let img = image::load_from_memory_with_format(data, ImageFormat::Jpeg).ok()?;
    let mut buffer = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100));
    img.write_with_encoder(encoder).ok()?;
    Some(buffer)
}

/// Re-encode embedded JPEG images, keeping only the ones that shrink
pub fn recompress_images(doc: &mut Document, quality: u8) -> usize {
    let mut count = 0;
    for object in doc.objects.values_mut() {
        let Object::Stream(stream) = object else {
            continue;
        };
        if !is_plain_jpeg(&stream.dict) {
            continue;
        }
        if let Some(smaller) = reencode_jpeg(&stream.content, quality)
            .filter(|encoded| encoded.len() < stream.content.len())
        {
            stream.set_content(smaller);
            stream.allows_compression = false;
            count += 1;
        }
    }
    count
}

/// Point every reference to a duplicated stream at its first copy
///
/// Returns the number of streams removed.
pub fn merge_duplicate_streams(doc: &mut Document) -> usize {
    let mut first_seen: HashMap<(String, Vec<u8>), ObjectId> = HashMap::new();
    let mut replacements: BTreeMap<ObjectId, ObjectId> = BTreeMap::new();

    for (id, object) in &doc.objects {
        let Object::Stream(stream) = object else {
            continue;
        };
        let key = (format!("{:?}", stream.dict), stream.content.clone());
        match first_seen.entry(key) {
            Entry::Occupied(kept) => {
                replacements.insert(*id, *kept.get());
            }
            Entry::Vacant(slot) => {
                slot.insert(*id);
            }
        }
    }

    for id in replacements.keys() {
        doc.objects.remove(id);
    }
    for object in doc.objects.values_mut() {
        redirect(object, &replacements);
    }
    for (_, value) in doc.trailer.iter_mut() {
        redirect(value, &replacements);
    }
    replacements.len()
}

fn redirect(object: &mut Object, replacements: &BTreeMap<ObjectId, ObjectId>) {
    match object {
        Object::Reference(id) => {
            if let Some(kept) = replacements.get(id) {
                *id = *kept;
            }
        }
        Object::Array(items) => {
            for item in items {
                redirect(item, replacements);
            }
        }
        Object::Dictionary(dict) => {
            for (_, value) in dict.iter_mut() {
                redirect(value, replacements);
            }
        }
        Object::Stream(stream) => {
            for (_, value) in stream.dict.iter_mut() {
                redirect(value, replacements);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageEncoder, Rgb, RgbImage};
    use lopdf::{dictionary, Stream};
    use std::fs;
    use tempfile::TempDir;

    /// One page of uncompressed text with an annotation, an attachment and metadata
    fn sample_document() -> Document {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let text = b"BT /F1 12 Tf 72 712 Td (batchpress keeps the words) Tj ET\n".repeat(400);
        let content_id = doc.add_object(Stream::new(dictionary! {}, text));
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let annot_id = doc.add_object(dictionary! {
            "Type" => "Annot",
            "Subtype" => "Text",
            "Rect" => vec![0.into(), 0.into(), 10.into(), 10.into()],
            "Contents" => Object::string_literal("note"),
        });
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => dictionary! { "Font" => dictionary! { "F1" => font_id } },
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            "Annots" => vec![annot_id.into()],
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
            }),
        );

        let file_id = doc.add_object(Stream::new(
            dictionary! { "Type" => "EmbeddedFile" },
            b"attached bytes".to_vec(),
        ));
        let names_id = doc.add_object(dictionary! {
            "EmbeddedFiles" => dictionary! {
                "Names" => vec![Object::string_literal("a.txt"), Object::Reference(file_id)],
            },
        });
        let metadata_id = doc.add_object(Stream::new(
            dictionary! { "Type" => "Metadata", "Subtype" => "XML" },
            b"<x:xmpmeta/>".to_vec(),
        ));
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
            "Names" => names_id,
            "Metadata" => metadata_id,
        });
        let info_id = doc.add_object(dictionary! {
            "Title" => Object::string_literal("Quarterly"),
        });
        doc.trailer.set("Root", catalog_id);
        doc.trailer.set("Info", info_id);
        doc
    }

    fn noisy_jpeg(side: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(side, side, |x, y| {
            let v = (x.wrapping_mul(31) ^ y.wrapping_mul(17)).wrapping_mul(2_654_435_761);
            Rgb([(v >> 8) as u8, (v >> 16) as u8, (v >> 24) as u8])
        });
        let mut bytes = Vec::new();
        JpegEncoder::new_with_quality(&mut bytes, 100)
            .write_image(img.as_raw(), side, side, image::ExtendedColorType::Rgb8)
            .unwrap();
        bytes
    }

    fn page_dict(doc: &Document) -> &Dictionary {
        let page_id = *doc.get_pages().values().next().unwrap();
        doc.get_object(page_id).unwrap().as_dict().unwrap()
    }

    #[test]
    fn test_heavy_level_strips_everything() {
        let mut doc = sample_document();
        let stats = PdfCompressor::rewrite(&mut doc, &CompressionParams::from_level(85));

        assert!(stats.metadata_removed);
        assert_eq!(stats.annotations_removed, 1);
        assert!(stats.attachments_removed);
        assert!(!doc.trailer.has(b"Info"));
        assert!(!page_dict(&doc).has(b"Annots"));
        assert_eq!(doc.get_pages().len(), 1);
    }

    #[test]
    fn test_light_level_keeps_document_extras() {
        let mut doc = sample_document();
        let stats = PdfCompressor::rewrite(&mut doc, &CompressionParams::from_level(15));

        assert_eq!(stats, RewriteStats::default());
        assert!(doc.trailer.has(b"Info"));
        assert!(page_dict(&doc).has(b"Annots"));
    }

    #[test]
    fn test_identical_streams_are_merged() {
        let mut doc = Document::with_version("1.5");
        let first = doc.add_object(Stream::new(dictionary! {}, b"same bytes".to_vec()));
        let second = doc.add_object(Stream::new(dictionary! {}, b"same bytes".to_vec()));
        let other = doc.add_object(Stream::new(dictionary! {}, b"other bytes".to_vec()));
        let holder = doc.add_object(dictionary! {
            "A" => first,
            "B" => vec![second.into(), other.into()],
        });
        doc.trailer.set("Root", holder);

        assert_eq!(merge_duplicate_streams(&mut doc), 1);
        assert!(doc.get_object(second).is_err());

        let holder = doc.get_object(holder).unwrap().as_dict().unwrap();
        let refs = holder.get(b"B").unwrap().as_array().unwrap();
        assert_eq!(refs[0].as_reference().unwrap(), first);
        assert_eq!(refs[1].as_reference().unwrap(), other);
    }

    #[test]
    fn test_embedded_jpeg_is_recompressed() {
        let mut doc = Document::with_version("1.5");
        let original = noisy_jpeg(64);
        let image_id = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => 64,
                "Height" => 64,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
                "Filter" => "DCTDecode",
            },
            original.clone(),
        ));

        assert_eq!(recompress_images(&mut doc, 25), 1);

        let Object::Stream(stream) = doc.get_object(image_id).unwrap() else {
            panic!("image is no longer a stream");
        };
        assert!(stream.content.len() < original.len());
        let decoded =
            image::load_from_memory_with_format(&stream.content, ImageFormat::Jpeg).unwrap();
        assert_eq!(decoded.width(), 64);
    }

    #[tokio::test]
    async fn test_compress_writes_smaller_valid_pdf() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("report.pdf");
        let output = dir.path().join("report.out.pdf");
        sample_document().save(&input).unwrap();
        let original = fs::metadata(&input).unwrap().len();

        let result = PdfCompressor::new()
            .compress(&input, &output, &CompressionParams::from_level(85))
            .await
            .unwrap();

        assert!(result.compressed_size < original);
        assert_eq!(result.compressed_size, fs::metadata(&output).unwrap().len());
        let written = Document::load(&output).unwrap();
        assert_eq!(written.get_pages().len(), 1);
        assert!(!written.trailer.has(b"Info"));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 2);
    }

    #[tokio::test]
    async fn test_compress_rejects_garbage() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("broken.pdf");
        let output = dir.path().join("broken.out.pdf");
        fs::write(&input, b"%PDF-1.4 but nothing else").unwrap();

        let result = PdfCompressor::new()
            .compress(&input, &output, &CompressionParams::default())
            .await;

        assert!(matches!(result, Err(Error::Compression { .. })));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
