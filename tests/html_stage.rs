// tests/html_stage.rs

mod common;
use crate::common::builders::ProjectBuilder;
use crate::common::init_tracing;

use std::error::Error;

use regex::Regex;

use assetpipe::stages::html::{HtmlInputs, HtmlStage, SPRITE_PLACEHOLDER, render};
use assetpipe::stages::version::Version;
use assetpipe::stages::Stage;
use assetpipe::types::Mode;

type TestResult = Result<(), Box<dyn Error>>;

fn core_link() -> Regex {
    Regex::new(r#"<link\b[^>]*href=["']styles/core\.min\.css["'][^>]*>"#).expect("valid pattern")
}

const TEMPLATE: &str = "<head><link rel=\"stylesheet\" href=\"styles/core.min.css\"><link rel=\"stylesheet\" href=\"styles/app.min.css\"></head>\n<body>\n<!-- svg-sprite -->\n<p>v{version} ({version})</p>\n</body>\n";

#[test]
fn render_inlines_every_input() {
    let inputs = HtmlInputs {
        css: Some("body{margin:0}".to_string()),
        sprite: Some("<svg><symbol id=\"a\"/></svg>\n".to_string()),
        version: Some("2.0.1".to_string()),
    };

    assert_eq!(
        render(TEMPLATE, &core_link(), &inputs),
        "<head><style>body{margin:0}</style><link rel=\"stylesheet\" href=\"styles/app.min.css\"></head>\n<body>\n<div style=\"display:none;\"><svg><symbol id=\"a\"/></svg></div>\n<p>v2.0.1 (2.0.1)</p>\n</body>\n"
    );
}

#[test]
fn stylesheet_text_is_inserted_literally() {
    let inputs = HtmlInputs {
        css: Some("a::after{content:\"$1 ${0}\"}".to_string()),
        ..HtmlInputs::default()
    };

    let html = render(TEMPLATE, &core_link(), &inputs);
    assert!(html.contains("<style>a::after{content:\"$1 ${0}\"}</style>"));
}

#[test]
fn missing_inputs_leave_markers_but_drop_the_sprite_placeholder() {
    let html = render(TEMPLATE, &core_link(), &HtmlInputs::default());

    assert!(html.contains("href=\"styles/core.min.css\""));
    assert!(html.contains("<p>v{version} ({version})</p>"));
    assert!(!html.contains(SPRITE_PLACEHOLDER));
}

fn write_inlined_assets(project: &common::builders::Project) {
    project.write(
        "public/styles/core.min.css",
        "body {\n  margin: 0;\n}\n/*# sourceMappingURL=core.min.css.map */\n",
    );
    project.write("public/images/sprite.svg", "<svg><symbol id=\"home\"/></svg>");
}

#[tokio::test]
async fn templates_get_css_sprite_and_metadata_version() -> TestResult {
    init_tracing();
    let project = ProjectBuilder::site()
        .file("src/offline.html", "<h1>Offline {version}</h1>\n")
        .file("src/partials/nav.html", "<nav></nav>\n")
        .build();
    write_inlined_assets(&project);
    let ctx = project.context(Mode::Development);

    let report = HtmlStage::new("styles/core.min.css").run(&ctx).await?;
    assert!(report.is_clean(), "{:?}", report.diagnostics);

    let index = project.read_output("index.html");
    assert!(index.contains("<title>Site 1.2.3</title>"));
    assert!(index.contains("<style>body {\n  margin: 0;\n}</style>"));
    assert!(!index.contains("sourceMappingURL"));
    assert!(index.contains("<link rel=\"stylesheet\" href=\"styles/app.min.css\">"));
    assert!(index.contains("<div style=\"display:none;\"><svg><symbol id=\"home\"/></svg></div>"));

    assert_eq!(project.read_output("offline.html"), "<h1>Offline 1.2.3</h1>\n");
    // Only the top level of the source root holds templates.
    assert!(!project.output("nav.html").exists());
    assert!(!project.output("partials/nav.html").exists());
    assert_eq!(report.artifacts.len(), 2);
    Ok(())
}

#[tokio::test]
async fn version_from_the_current_run_wins() -> TestResult {
    let project = ProjectBuilder::site().build();
    write_inlined_assets(&project);
    let ctx = project.context(Mode::Production);
    ctx.handoffs.set_version(Version::new(1, 2, 4));

    HtmlStage::new("styles/core.min.css").run(&ctx).await?;

    assert!(project.read_output("index.html").contains("<title>Site 1.2.4</title>"));
    Ok(())
}

#[tokio::test]
async fn missing_assets_are_reported_but_html_is_still_written() -> TestResult {
    init_tracing();
    let project = ProjectBuilder::site().build();
    let ctx = project.context(Mode::Development);

    let report = HtmlStage::new("styles/core.min.css").run(&ctx).await?;

    assert_eq!(report.diagnostics.len(), 2);
    assert!(report.diagnostics.iter().all(|d| d.message.starts_with("not inlined: ")));
    assert_eq!(
        report.diagnostics[0].path,
        Some(project.output("styles/core.min.css"))
    );
    assert_eq!(
        report.diagnostics[1].path,
        Some(project.output("images/sprite.svg"))
    );

    let index = project.read_output("index.html");
    assert!(index.contains("href=\"styles/core.min.css\""));
    assert!(!index.contains(SPRITE_PLACEHOLDER));
    assert!(index.contains("<title>Site 1.2.3</title>"));
    Ok(())
}

#[tokio::test]
async fn unreadable_metadata_leaves_the_version_token() -> TestResult {
    let project = ProjectBuilder::site().file("package.json", "{ not json").build();
    write_inlined_assets(&project);
    let ctx = project.context(Mode::Development);

    let report = HtmlStage::new("styles/core.min.css").run(&ctx).await?;

    assert_eq!(report.diagnostics.len(), 1);
    assert_eq!(report.diagnostics[0].path, Some(project.paths.metadata.clone()));
    assert!(project.read_output("index.html").contains("<title>Site {version}</title>"));
    Ok(())
}
