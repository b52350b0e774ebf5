// src/stages/images.rs

//! Image optimization and the icon sprite sheet.
//!
//! Rasters are re-encoded with the `image` crate and only kept when that
//! made them smaller; each optimized raster gets a lossless WebP sibling.
//! SVGs lose declarations, comments and metadata. Every SVG in the sprite
//! directory becomes one `<symbol>` of `images/sprite.svg`.
//!
//! The stage is best-effort: a file that cannot be processed is reported as
//! a diagnostic and the remaining files continue.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::codecs::webp::WebPEncoder;
use image::DynamicImage;
use regex::Regex;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::stages::{
    file_stem, has_extension, Diagnostic, Stage, StageContext, StageError, StageFuture,
    StageReport,
};

const JPEG_QUALITY: u8 = 85;
pub const SPRITE_FILE: &str = "sprite.svg";

static XML_DECL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<\?xml.*?\?>").expect("xml declaration pattern is valid"));
static DOCTYPE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!DOCTYPE.*?>").expect("doctype pattern is valid"));
static COMMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").expect("comment pattern is valid"));
static METADATA_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<metadata\b.*?</metadata>|<metadata\b[^>]*/>").expect("metadata pattern is valid")
});
static BETWEEN_TAGS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r">\s+<").expect("whitespace pattern is valid"));
static SVG_OPEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<svg\b(?P<attrs>[^>]*)>").expect("svg tag pattern is valid"));
static VIEW_BOX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\bviewBox\s*=\s*["'](?P<value>[^"']*)["']"#).expect("viewBox pattern is valid")
});

#[derive(Debug, Clone)]
pub struct ImagesStage {
    sprite_dir: String,
}

impl ImagesStage {
    pub fn new(sprite_dir: impl Into<String>) -> Self {
        Self {
            sprite_dir: sprite_dir.into(),
        }
    }
}

impl Stage for ImagesStage {
    fn run<'a>(&'a self, ctx: &'a StageContext) -> StageFuture<'a> {
        Box::pin(async move {
            let images_root = ctx.paths.assets.join("images");
            let sprite_dir = ctx.paths.assets.join(&self.sprite_dir);
            let output_root = ctx.paths.output.join("images");

            let (report, sprite) = tokio::task::spawn_blocking(move || {
                process_images(&images_root, &sprite_dir, &output_root)
            })
            .await
            .map_err(|e| StageError::Failed(format!("image processing panicked: {e}")))??;

            ctx.handoffs.set_sprite(sprite);
            info!(
                written = report.artifacts.len(),
                problems = report.diagnostics.len(),
                "processed images"
            );
            Ok(report)
        })
    }
}

fn process_images(
    images_root: &Path,
    sprite_dir: &Path,
    output_root: &Path,
) -> Result<(StageReport, Option<PathBuf>), StageError> {
    let mut report = StageReport::new();
    let mut rasters = Vec::new();
    let mut written = HashSet::new();
    let mut sprite_inputs = Vec::new();

    if !images_root.is_dir() {
        return Ok((report, None));
    }

    for entry in WalkDir::new(images_root).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                report.push_diagnostic(Diagnostic::new(e.path(), e.to_string()));
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        if has_extension(path, &["svg"]) && path.parent() == Some(sprite_dir) {
            sprite_inputs.push(path.to_path_buf());
            continue;
        }

        let Ok(rel) = path.strip_prefix(images_root) else {
            continue;
        };
        let dest = output_root.join(rel);

        match process_file(path, &dest) {
            Ok(kind) => {
                if kind == FileKind::Raster {
                    rasters.push(dest.clone());
                }
                written.insert(dest.clone());
                report.push_output(dest);
            }
            Err(message) => report.push_diagnostic(Diagnostic::new(Some(path), message)),
        }
    }

    // Siblings are named by stem, so `a.png`, `a.jpg` and a source `a.webp`
    // compete for the same file. The first claimant keeps it.
    for raster in rasters {
        let webp = raster.with_extension("webp");
        if !written.insert(webp.clone()) {
            report.push_diagnostic(Diagnostic::new(
                Some(&raster),
                format!("webp sibling {} is already taken; skipped", webp.display()),
            ));
            continue;
        }
        match write_webp(&raster, &webp) {
            Ok(()) => report.push_output(webp),
            Err(message) => report.push_diagnostic(Diagnostic::new(Some(&raster), message)),
        }
    }

    let sprite = if sprite_inputs.is_empty() {
        None
    } else {
        let (sprite, problems) = build_sprite(&sprite_inputs);
        for (path, message) in problems {
            report.push_diagnostic(Diagnostic::new(Some(&path), message));
        }
        let dest = output_root.join(SPRITE_FILE);
        write(&dest, sprite.as_bytes()).map_err(|e| StageError::io("writing", &dest, e))?;
        report.push_output(dest.clone());
        Some(dest)
    };

    Ok((report, sprite))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileKind {
    Raster,
    Vector,
    Other,
}

fn process_file(src: &Path, dest: &Path) -> Result<FileKind, String> {
    let bytes = std::fs::read(src).map_err(|e| format!("reading: {e}"))?;

    let (kind, contents) = if has_extension(src, &["png", "jpg", "jpeg"]) {
        (FileKind::Raster, optimize_raster(src, bytes)?)
    } else if has_extension(src, &["svg"]) {
        let text = String::from_utf8(bytes).map_err(|e| format!("not UTF-8: {e}"))?;
        (FileKind::Vector, optimize_svg(&text).into_bytes())
    } else {
        (FileKind::Other, bytes)
    };

    write(dest, &contents).map_err(|e| format!("writing {}: {e}", dest.display()))?;
    debug!(src = %src.display(), dest = %dest.display(), ?kind, "image written");
    Ok(kind)
}

/// Re-encode a PNG/JPEG; keep whichever of original and re-encoded is smaller.
fn optimize_raster(src: &Path, original: Vec<u8>) -> Result<Vec<u8>, String> {
    let img = image::load_from_memory(&original).map_err(|e| format!("decoding: {e}"))?;
    let mut encoded = Vec::new();

    let result = if has_extension(src, &["png"]) {
        let encoder =
            PngEncoder::new_with_quality(&mut encoded, CompressionType::Best, FilterType::Adaptive);
        img.write_with_encoder(encoder)
    } else {
        let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
        let encoder = JpegEncoder::new_with_quality(&mut encoded, JPEG_QUALITY);
        rgb.write_with_encoder(encoder)
    };
    result.map_err(|e| format!("encoding: {e}"))?;

    if encoded.len() < original.len() {
        Ok(encoded)
    } else {
        Ok(original)
    }
}

fn write_webp(raster: &Path, dest: &Path) -> Result<(), String> {
    let img = image::open(raster).map_err(|e| format!("decoding for webp: {e}"))?;
    let rgba = DynamicImage::ImageRgba8(img.to_rgba8());

    let mut encoded = Vec::new();
    rgba.write_with_encoder(WebPEncoder::new_lossless(&mut encoded))
        .map_err(|e| format!("encoding webp: {e}"))?;
    write(dest, &encoded).map_err(|e| format!("writing {}: {e}", dest.display()))
}

/// Strip XML declaration, doctype, comments and metadata; collapse
/// whitespace between tags. Attributes (including `viewBox`) are untouched.
pub fn optimize_svg(source: &str) -> String {
    let text = XML_DECL_RE.replace_all(source, "");
    let text = DOCTYPE_RE.replace_all(&text, "");
    let text = COMMENT_RE.replace_all(&text, "");
    let text = METADATA_RE.replace_all(&text, "");
    let text = BETWEEN_TAGS_RE.replace_all(&text, "><");
    text.trim().to_string()
}

/// Combine SVG files into one sprite of `<symbol>`s, ordered by file name.
/// Files without an `<svg>` root are skipped and reported.
pub fn build_sprite(inputs: &[PathBuf]) -> (String, Vec<(PathBuf, String)>) {
    let mut sorted: Vec<&PathBuf> = inputs.iter().collect();
    sorted.sort_by_key(|p| p.file_name().map(|n| n.to_os_string()));

    let mut symbols = String::new();
    let mut problems = Vec::new();

    for path in sorted {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) => {
                problems.push((path.clone(), format!("reading: {e}")));
                continue;
            }
        };
        match symbol_for(&file_stem(path), &optimize_svg(&text)) {
            Some(symbol) => symbols.push_str(&symbol),
            None => problems.push((path.clone(), "no <svg> root element".to_string())),
        }
    }

    let sprite = format!(
        "<svg xmlns=\"http://www.w3.org/2000/svg\" xmlns:xlink=\"http://www.w3.org/1999/xlink\">{symbols}</svg>"
    );
    (sprite, problems)
}

fn symbol_for(id: &str, svg: &str) -> Option<String> {
    let open = SVG_OPEN_RE.captures(svg)?;
    let whole = open.get(0)?;
    let close = svg.rfind("</svg>")?;
    if close < whole.end() {
        return None;
    }
    let inner = &svg[whole.end()..close];

    let view_box = VIEW_BOX_RE
        .captures(&open["attrs"])
        .and_then(|c| c.name("value").map(|m| m.as_str().to_string()));

    Some(match view_box {
        Some(vb) => format!("<symbol id=\"{id}\" viewBox=\"{vb}\">{inner}</symbol>"),
        None => format!("<symbol id=\"{id}\">{inner}</symbol>"),
    })
}

fn write(dest: &Path, contents: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(dest, contents)
}
