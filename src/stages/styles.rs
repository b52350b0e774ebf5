// src/stages/styles.rs

//! Stylesheet stage: resolve `@import`s, inject extracted component
//! styles, compile and write `styles/<stem>.min.css` (plus a source map in
//! development).

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::stages::css::{compile, CssError, OutputStyle};
use crate::stages::sourcemap::SourceMapBuilder;
use crate::stages::{
    file_stem, write_file, Diagnostic, ExtractedStyle, Stage, StageContext, StageError,
    StageFuture, StageReport,
};

pub const INJECT_START: &str = "/* inject:imports */";
pub const INJECT_END: &str = "/* endinject */";

/// Which stylesheet a [`StylesStage`] compiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StyleRole {
    /// The critical stylesheet inlined into HTML.
    Core,
    /// The main stylesheet, including extracted component styles.
    Main,
}

#[derive(Debug, Clone)]
pub struct StylesStage {
    entry: String,
    role: StyleRole,
}

impl StylesStage {
    pub fn core(entry: impl Into<String>) -> Self {
        Self {
            entry: entry.into(),
            role: StyleRole::Core,
        }
    }

    pub fn main(entry: impl Into<String>) -> Self {
        Self {
            entry: entry.into(),
            role: StyleRole::Main,
        }
    }
}

/// Import-resolved stylesheet text with the origin of every line.
#[derive(Debug, Default)]
pub struct ResolvedSource {
    pub text: String,
    /// Registered source files (relative names) and their contents.
    pub sources: Vec<(String, String)>,
    /// For each line of `text`: (index into `sources`, 0-based line).
    pub origins: Vec<(usize, u32)>,
}

impl ResolvedSource {
    fn origin_of(&self, line: u32) -> Option<(&str, u32)> {
        let (source, original) = self.origins.get(line as usize)?;
        let (name, _) = self.sources.get(*source)?;
        Some((name.as_str(), *original))
    }
}

/// Output of one compilation, ready to be written.
#[derive(Debug)]
struct StylesOutput {
    css: String,
    map: Option<String>,
}

impl Stage for StylesStage {
    fn run<'a>(&'a self, ctx: &'a StageContext) -> StageFuture<'a> {
        Box::pin(async move {
            let mut report = StageReport::new();
            let entry_path = ctx.paths.assets.join(&self.entry);
            if !entry_path.is_file() {
                return Err(StageError::io(
                    "reading",
                    &entry_path,
                    std::io::Error::new(std::io::ErrorKind::NotFound, "stylesheet not found"),
                ));
            }

            let injected = match self.role {
                StyleRole::Main => Some(ctx.handoffs.extracted_styles()),
                StyleRole::Core => None,
            };

            let file_name = format!("{}.min.css", file_stem(&entry_path));
            let assets = ctx.paths.assets.clone();
            let mode = ctx.mode;
            let job_entry = entry_path.clone();
            let job_name = file_name.clone();

            let result = tokio::task::spawn_blocking(move || {
                build_stylesheet(&assets, &job_entry, injected.as_deref(), mode.minify(), &job_name)
            })
            .await
            .map_err(|e| StageError::Failed(format!("style compilation panicked: {e}")))??;

            let output = match result {
                Ok(output) => output,
                Err(diagnostic) => {
                    report.push_diagnostic(diagnostic);
                    return Ok(report);
                }
            };

            let dest = ctx.paths.output.join("styles").join(&file_name);
            write_file(&dest, &output.css).await?;
            if let Some(map) = &output.map {
                let map_path = dest.with_file_name(format!("{file_name}.map"));
                write_file(&map_path, map).await?;
                report.push_output(map_path);
            }

            if self.role == StyleRole::Core {
                ctx.handoffs.set_core_stylesheet(Some(dest.clone()));
            }

            info!(entry = %self.entry, dest = %dest.display(), mode = %ctx.mode, "compiled stylesheet");
            report.push_output(dest);
            Ok(report)
        })
    }
}

/// Resolve, compile and render one stylesheet. The outer error is fatal
/// (filesystem); the inner one is a recoverable compile diagnostic.
fn build_stylesheet(
    assets: &Path,
    entry: &Path,
    injected: Option<&[ExtractedStyle]>,
    compressed: bool,
    file_name: &str,
) -> Result<Result<StylesOutput, Diagnostic>, StageError> {
    let raw = std::fs::read_to_string(entry).map_err(|e| StageError::io("reading", entry, e))?;
    let raw = match injected {
        Some(styles) => inject_imports(&raw, styles),
        None => raw,
    };

    let mut resolved = ResolvedSource::default();
    let mut stack = HashSet::new();
    if let Err(diagnostic) = resolve_into(assets, entry, raw, &mut resolved, &mut stack) {
        return Ok(Err(diagnostic));
    }

    let style = if compressed {
        OutputStyle::Compressed
    } else {
        OutputStyle::Expanded
    };

    let compiled = match compile(&resolved.text, style) {
        Ok(compiled) => compiled,
        Err(err) => return Ok(Err(locate(&resolved, entry, err))),
    };

    if compressed {
        return Ok(Ok(StylesOutput {
            css: compiled.css,
            map: None,
        }));
    }

    let mut map = SourceMapBuilder::new(file_name);
    for (name, content) in &resolved.sources {
        map.add_source(name.clone(), content.clone());
    }
    for origin in &compiled.line_origins {
        match origin.and_then(|line| resolved.origins.get(line as usize)) {
            Some((source, line)) => map.map_line(*source, *line),
            None => map.unmapped_line(),
        }
    }
    let map_json = map
        .to_json()
        .map_err(|e| StageError::Failed(format!("serializing source map: {e}")))?;

    Ok(Ok(StylesOutput {
        css: format!("{}/*# sourceMappingURL={file_name}.map */\n", compiled.css),
        map: Some(map_json),
    }))
}

/// Replace the text between the inject markers with one `@import` per
/// extracted component style, sorted by file name.
pub fn inject_imports(source: &str, styles: &[ExtractedStyle]) -> String {
    let Some(start) = source.find(INJECT_START) else {
        return source.to_string();
    };
    let body_start = start + INJECT_START.len();
    let Some(end_rel) = source[body_start..].find(INJECT_END) else {
        return source.to_string();
    };
    let body_end = body_start + end_rel;

    let mut sorted: Vec<&ExtractedStyle> = styles.iter().collect();
    sorted.sort_by_key(|s| s.path.file_name().map(|n| n.to_os_string()));

    let imports: String = sorted
        .iter()
        .map(|s| format!("@import \"{}\";", s.path.display()))
        .collect::<Vec<_>>()
        .join(" ");

    // Lines after the region keep their numbers.
    let padding = "\n".repeat(source[body_start..body_end].matches('\n').count());
    let after = &source[body_end + INJECT_END.len()..];
    format!(
        "{} {imports} {INJECT_END}{padding}{after}",
        &source[..body_start]
    )
}

fn resolve_into(
    assets: &Path,
    path: &Path,
    text: String,
    resolved: &mut ResolvedSource,
    stack: &mut HashSet<PathBuf>,
) -> Result<(), Diagnostic> {
    if !stack.insert(path.to_path_buf()) {
        return Err(Diagnostic::new(Some(path), "circular @import"));
    }

    let name = path
        .strip_prefix(assets)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/");
    resolved.sources.push((name, text.clone()));
    let source_idx = resolved.sources.len() - 1;

    for (line_no, line) in text.lines().enumerate() {
        let targets = match parse_import_line(line) {
            Some(targets) => targets,
            None => {
                resolved.text.push_str(line);
                resolved.text.push('\n');
                resolved.origins.push((source_idx, line_no as u32));
                continue;
            }
        };

        for target in targets {
            let Some(import_path) = resolve_partial(path, &target) else {
                return Err(Diagnostic::new(
                    Some(path),
                    format!("line {}: cannot resolve @import '{target}'", line_no + 1),
                ));
            };
            let content = std::fs::read_to_string(&import_path)
                .map_err(|e| Diagnostic::new(Some(&import_path), format!("reading import: {e}")))?;
            debug!(import = %import_path.display(), "inlining stylesheet import");
            resolve_into(assets, &import_path, content, resolved, stack)?;
        }
    }

    stack.remove(path);
    Ok(())
}

/// Targets of a line made only of `@import` statements (inline comments
/// allowed): `@import "a", 'b';` gives `["a", "b"]`. Plain CSS imports
/// (`url(...)`, `.css`, remote) are left for the browser and yield `None`.
fn parse_import_line(line: &str) -> Option<Vec<String>> {
    let stripped = strip_inline_comments(line);
    let mut targets: Vec<String> = Vec::new();

    for statement in stripped.split(';').map(str::trim).filter(|s| !s.is_empty()) {
        let rest = statement.strip_prefix("@import")?.trim();
        if rest.starts_with("url(") {
            return None;
        }
        targets.extend(
            rest.split(',')
                .map(|t| t.trim().trim_matches(|c| c == '"' || c == '\'').to_string())
                .filter(|t| !t.is_empty()),
        );
    }

    let passthrough = targets.iter().any(|t| {
        t.ends_with(".css") || t.starts_with("http://") || t.starts_with("https://") || t.starts_with("//")
    });
    if targets.is_empty() || passthrough {
        return None;
    }
    Some(targets)
}

fn strip_inline_comments(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut rest = line;
    while let Some(start) = rest.find("/*") {
        out.push_str(&rest[..start]);
        match rest[start + 2..].find("*/") {
            Some(end) => rest = &rest[start + 2 + end + 2..],
            None => return out,
        }
    }
    out.push_str(rest);
    out
}

/// Try `name`, `name.scss` and the partial `_name.scss` next to `importer`.
fn resolve_partial(importer: &Path, target: &str) -> Option<PathBuf> {
    let target_path = Path::new(target);
    let base = if target_path.is_absolute() {
        target_path.to_path_buf()
    } else {
        importer.parent()?.join(target_path)
    };

    let file_name = base.file_name()?.to_string_lossy().into_owned();
    let dir = base.parent()?.to_path_buf();

    [
        base.clone(),
        dir.join(format!("{file_name}.scss")),
        dir.join(format!("_{file_name}.scss")),
        dir.join(format!("_{file_name}")),
    ]
    .into_iter()
    .find(|candidate| candidate.is_file())
}

fn locate(resolved: &ResolvedSource, entry: &Path, err: CssError) -> Diagnostic {
    match resolved.origin_of(err.line) {
        Some((name, line)) => Diagnostic::new(
            Some(Path::new(name)),
            format!("line {}: {}", line + 1, err.message),
        ),
        None => Diagnostic::new(Some(entry), err.to_string()),
    }
}
