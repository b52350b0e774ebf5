// tests/images_stage.rs

mod common;
use crate::common::builders::ProjectBuilder;
use crate::common::init_tracing;

use std::error::Error;
use std::fs;

use assetpipe::stages::images::{ImagesStage, SPRITE_FILE, build_sprite, optimize_svg};
use assetpipe::stages::Stage;
use assetpipe::types::Mode;

type TestResult = Result<(), Box<dyn Error>>;

fn stage() -> ImagesStage {
    ImagesStage::new("images/sprite")
}

const SPRITE: &str = concat!(
    r#"<svg xmlns="http://www.w3.org/2000/svg" xmlns:xlink="http://www.w3.org/1999/xlink">"#,
    r#"<symbol id="home" viewBox="0 0 10 10"><path d="M1 1h8v8H1z"/></symbol>"#,
    r#"<symbol id="search" viewBox="0 0 10 10"><path d="M2 2h6v6H2z"/></symbol>"#,
    r#"<symbol id="user" viewBox="0 0 10 10"><path d="M3 3h4v4H3z"/></symbol>"#,
    "</svg>"
);

#[test]
fn svg_optimization_strips_everything_but_the_drawing() {
    let source = "<?xml version=\"1.0\"?>\n<!DOCTYPE svg>\n<!-- made by hand -->\n<svg viewBox=\"0 0 4 4\">\n  <metadata><rdf/></metadata>\n  <rect width=\"4\" height=\"4\"/>\n</svg>\n";
    assert_eq!(
        optimize_svg(source),
        "<svg viewBox=\"0 0 4 4\"><rect width=\"4\" height=\"4\"/></svg>"
    );
}

#[test]
fn sprite_reports_files_without_an_svg_root() -> TestResult {
    let dir = tempfile::tempdir()?;
    let good = dir.path().join("b.svg");
    let bad = dir.path().join("a.svg");
    fs::write(&good, "<svg><circle r=\"1\"/></svg>")?;
    fs::write(&bad, "<g/>")?;

    let (sprite, problems) = build_sprite(&[good, bad.clone()]);

    assert!(sprite.contains("<symbol id=\"b\"><circle r=\"1\"/></symbol>"));
    assert!(!sprite.contains("id=\"a\""));
    assert_eq!(problems, vec![(bad, "no <svg> root element".to_string())]);
    Ok(())
}

#[tokio::test]
async fn sprite_directory_becomes_one_symbol_sheet() -> TestResult {
    init_tracing();
    let project = ProjectBuilder::site().build();
    let ctx = project.context(Mode::Development);

    let report = stage().run(&ctx).await?;
    assert!(report.is_clean(), "{:?}", report.diagnostics);

    assert_eq!(project.read_output("images/sprite.svg"), SPRITE);
    assert_eq!(
        ctx.handoffs.sprite(),
        Some(project.output(&format!("images/{SPRITE_FILE}")))
    );

    // Sprite sources are not published individually.
    assert!(!project.output("images/sprite").exists());
    assert_eq!(
        project.read_output("images/logo.svg"),
        r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 20 20"><circle cx="10" cy="10" r="8"/></svg>"#
    );
    Ok(())
}

#[tokio::test]
async fn rasters_get_a_webp_sibling() -> TestResult {
    init_tracing();
    let project = ProjectBuilder::new().build();
    let images = project.path("src/assets/images/photos");
    fs::create_dir_all(&images)?;
    image::RgbImage::from_pixel(8, 8, image::Rgb([200, 10, 10])).save(images.join("red.png"))?;
    image::RgbImage::from_pixel(8, 8, image::Rgb([10, 10, 200])).save(images.join("blue.jpg"))?;

    let ctx = project.context(Mode::Production);
    let report = stage().run(&ctx).await?;
    assert!(report.is_clean(), "{:?}", report.diagnostics);

    for name in ["red.png", "red.webp", "blue.jpg", "blue.webp"] {
        let path = project.output(&format!("images/photos/{name}"));
        assert!(path.is_file(), "{} is missing", path.display());
        assert!(report.artifacts.iter().any(|a| a.path == path));
    }

    let decoded = image::open(project.output("images/photos/red.webp"))?;
    assert_eq!((decoded.width(), decoded.height()), (8, 8));
    assert_eq!(ctx.handoffs.sprite(), None);
    Ok(())
}

#[tokio::test]
async fn webp_siblings_never_overwrite_each_other() -> TestResult {
    init_tracing();
    let project = ProjectBuilder::new()
        .file("src/assets/images/photo.webp", b"hand-made webp".as_slice())
        .build();
    let images = project.path("src/assets/images");
    image::RgbImage::from_pixel(4, 4, image::Rgb([10, 200, 10])).save(images.join("logo.jpg"))?;
    image::RgbImage::from_pixel(4, 4, image::Rgb([10, 10, 200])).save(images.join("logo.png"))?;
    image::RgbImage::from_pixel(4, 4, image::Rgb([200, 10, 10])).save(images.join("photo.png"))?;

    let ctx = project.context(Mode::Production);
    let report = stage().run(&ctx).await?;

    let skipped: Vec<_> = report.diagnostics.iter().map(|d| d.path.clone()).collect();
    assert_eq!(
        skipped,
        vec![
            Some(project.output("images/logo.png")),
            Some(project.output("images/photo.png")),
        ]
    );
    assert!(report.diagnostics[0].message.ends_with("is already taken; skipped"));

    // `logo.jpg` sorts first and claims the sibling; the source WebP is kept.
    let decoded = image::open(project.output("images/logo.webp"))?;
    let image::Rgb([r, g, b]) = *decoded.to_rgb8().get_pixel(0, 0);
    assert!(g > 150 && r < 60 && b < 60, "logo.webp came from the wrong raster");
    assert_eq!(fs::read(project.output("images/photo.webp"))?, b"hand-made webp");
    assert!(project.output("images/logo.png").is_file());
    Ok(())
}

#[tokio::test]
async fn undecodable_raster_is_a_diagnostic() -> TestResult {
    init_tracing();
    let project = ProjectBuilder::site()
        .file("src/assets/images/broken.png", b"definitely not a png".as_slice())
        .build();
    let ctx = project.context(Mode::Production);

    let report = stage().run(&ctx).await?;

    assert_eq!(report.diagnostics.len(), 1);
    let diagnostic = &report.diagnostics[0];
    assert_eq!(diagnostic.path, Some(project.path("src/assets/images/broken.png")));
    assert!(diagnostic.message.starts_with("decoding: "), "{}", diagnostic.message);
    assert!(!project.output("images/broken.png").exists());
    assert!(!project.output("images/broken.webp").exists());

    // The remaining files are still processed.
    assert!(project.output("images/logo.svg").is_file());
    assert!(project.output("images/sprite.svg").is_file());
    Ok(())
}

#[tokio::test]
async fn other_files_are_copied_verbatim() -> TestResult {
    let project = ProjectBuilder::new()
        .file("src/assets/images/icons/favicon.ico", [0u8, 0, 1, 0, 42].as_slice())
        .file("src/assets/images/LICENSE.txt", "CC0\n")
        .build();
    let ctx = project.context(Mode::Development);

    let report = stage().run(&ctx).await?;

    assert_eq!(report.artifacts.len(), 2);
    assert_eq!(fs::read(project.output("images/icons/favicon.ico"))?, vec![0, 0, 1, 0, 42]);
    assert_eq!(project.read_output("images/LICENSE.txt"), "CC0\n");
    Ok(())
}

#[tokio::test]
async fn missing_images_directory_is_not_an_error() -> TestResult {
    let project = ProjectBuilder::new().build();
    let ctx = project.context(Mode::Development);

    let report = stage().run(&ctx).await?;

    assert!(report.artifacts.is_empty());
    assert!(report.is_clean());
    assert_eq!(ctx.handoffs.sprite(), None);
    assert!(!project.paths.output.exists());
    Ok(())
}
