// src/stages/html.rs

//! HTML assembly: inline the core stylesheet, the icon sprite and the
//! project version into every template of the source root.

use std::path::{Path, PathBuf};

use regex::{NoExpand, Regex};

use crate::stages::version::read_version;
use crate::stages::{
    list_files, read_to_string, write_file, Diagnostic, Stage, StageContext, StageError,
    StageFuture, StageReport,
};

pub const SPRITE_PLACEHOLDER: &str = "<!-- svg-sprite -->";
pub const VERSION_TOKEN: &str = "{version}";

/// Values substituted into each template.
#[derive(Debug, Clone, Default)]
pub struct HtmlInputs {
    pub css: Option<String>,
    pub sprite: Option<String>,
    pub version: Option<String>,
}

#[derive(Debug, Clone)]
pub struct HtmlStage {
    inline_stylesheet: String,
}

impl HtmlStage {
    pub fn new(inline_stylesheet: impl Into<String>) -> Self {
        Self {
            inline_stylesheet: inline_stylesheet.into(),
        }
    }

    fn link_pattern(&self) -> Result<Regex, StageError> {
        let pattern = format!(
            r#"<link\b[^>]*href=["']{}["'][^>]*>"#,
            regex::escape(&self.inline_stylesheet)
        );
        Regex::new(&pattern).map_err(|e| StageError::Failed(format!("invalid link pattern: {e}")))
    }

    async fn gather_inputs(&self, ctx: &StageContext, report: &mut StageReport) -> HtmlInputs {
        let css_path = ctx
            .handoffs
            .core_stylesheet()
            .unwrap_or_else(|| ctx.paths.output.join(&self.inline_stylesheet));
        let sprite_path = ctx
            .handoffs
            .sprite()
            .unwrap_or_else(|| ctx.paths.output.join("images").join("sprite.svg"));

        let css = read_optional(&css_path, report).await.map(|css| strip_source_map_comment(&css));
        let sprite = read_optional(&sprite_path, report).await;

        let version = match ctx.handoffs.version() {
            Some(v) => Some(v.to_string()),
            None if ctx.paths.metadata.is_file() => match read_version(&ctx.paths.metadata).await {
                Ok(v) => Some(v.to_string()),
                Err(e) => {
                    report.push_diagnostic(Diagnostic::new(Some(&ctx.paths.metadata), e.to_string()));
                    None
                }
            },
            None => None,
        };

        HtmlInputs {
            css,
            sprite,
            version,
        }
    }
}

impl Stage for HtmlStage {
    fn run<'a>(&'a self, ctx: &'a StageContext) -> StageFuture<'a> {
        Box::pin(async move {
            let mut report = StageReport::new();
            let link = self.link_pattern()?;
            let inputs = self.gather_inputs(ctx, &mut report).await;

            for template in list_files(&ctx.paths.source, &["html"]).await? {
                let source = read_to_string(&template).await?;
                let rendered = render(&source, &link, &inputs);

                let name = template.file_name().map(PathBuf::from).unwrap_or_default();
                let dest = ctx.paths.output.join(name);
                write_file(&dest, rendered).await?;
                report.push_output(dest);
            }

            Ok(report)
        })
    }
}

/// Apply every substitution to one template.
///
/// The stylesheet link and the sprite placeholder are replaced once; every
/// version token is replaced. Inputs that are `None` leave their marker
/// untouched, except the sprite placeholder which is always removed.
pub fn render(template: &str, link: &Regex, inputs: &HtmlInputs) -> String {
    let mut html = match &inputs.css {
        Some(css) => link
            .replace(template, NoExpand(&format!("<style>{css}</style>")))
            .into_owned(),
        None => template.to_string(),
    };

    let sprite_block = match &inputs.sprite {
        Some(sprite) => format!("<div style=\"display:none;\">{}</div>", sprite.trim()),
        None => String::new(),
    };
    html = html.replacen(SPRITE_PLACEHOLDER, &sprite_block, 1);

    if let Some(version) = &inputs.version {
        html = html.replace(VERSION_TOKEN, version);
    }
    html
}

async fn read_optional(path: &Path, report: &mut StageReport) -> Option<String> {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => Some(contents),
        Err(e) => {
            report.push_diagnostic(Diagnostic::new(Some(path), format!("not inlined: {e}")));
            None
        }
    }
}

fn strip_source_map_comment(css: &str) -> String {
    css.lines()
        .filter(|line| !line.trim_start().starts_with("/*# sourceMappingURL="))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}
