// src/stages/scripts.rs

//! Script bundling.
//!
//! Every entry module is bundled with its relative imports into a single
//! IIFE assigned to the configured global. Modules are emitted
//! dependencies-first, each wrapped in its own function scope; imports
//! become reads from the imported module's export object.
//!
//! `.vue` single-file components contribute their `<script>` as a module
//! whose default export gains the `<template>` as a string. Their `<style>`
//! is written to the temp directory for the styles stage to pick up.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::{Captures, Regex};
use tracing::{debug, info};

use crate::stages::minify::{minify_js, rewrite_code};
use crate::stages::sourcemap::SourceMapBuilder;
use crate::stages::{
    file_stem, has_extension, read_to_string, write_file, Diagnostic, ExtractedStyle, Stage,
    StageContext, StageError, StageFuture, StageReport,
};

static IMPORT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)^[ \t]*import\s+(?:(?P<clause>[^"';]+?)\s+from\s+)?["'](?P<spec>[^"']+)["'][ \t]*;?"#)
        .expect("import pattern is valid")
});
static EXPORT_DEFAULT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^(?P<indent>[ \t]*)export\s+default\s+").expect("export default pattern is valid")
});
static EXPORT_DECL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^(?P<indent>[ \t]*)export\s+(?P<kind>var|let|const|async\s+function\*?|function\*?|class)\s+(?P<name>[\w$]+)")
        .expect("export declaration pattern is valid")
});
static EXPORT_LIST_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*export\s*\{(?P<list>[^}]*)\}[ \t]*;?").expect("export list pattern is valid")
});
static BLOCK_SCOPED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:const|let)(\s+)").expect("declaration pattern is valid"));
static COMPONENT_DEFAULT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"export\s+default\s*\{").expect("component pattern is valid"));
static SCRIPT_BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<script[^>]*>(?P<body>.*?)</script>").expect("script block pattern is valid")
});
static STYLE_BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<style[^>]*>(?P<body>.*?)</style>").expect("style block pattern is valid")
});

/// Which export an import binding reads.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Imported {
    Default,
    Named(String),
    Namespace,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Binding {
    local: String,
    imported: Imported,
}

#[derive(Debug)]
struct Module {
    id: String,
    /// Path relative to the assets root, with forward slashes.
    rel: String,
    original: String,
    /// Script code before import/export rewriting.
    code: String,
    /// Line in `original` where `code` starts.
    line_offset: u32,
    /// Resolved imports in source order.
    imports: Vec<PathBuf>,
}

/// Everything produced while bundling one entry.
#[derive(Debug, Default)]
struct BundleOutcome {
    code: Option<String>,
    source_map: Option<SourceMapBuilder>,
    styles: Vec<ExtractedStyle>,
    diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Clone)]
pub struct ScriptsStage {
    entries: Vec<String>,
    bundle_name: String,
}

impl ScriptsStage {
    pub fn new(entries: Vec<String>, bundle_name: impl Into<String>) -> Self {
        Self {
            entries,
            bundle_name: bundle_name.into(),
        }
    }
}

impl Stage for ScriptsStage {
    fn run<'a>(&'a self, ctx: &'a StageContext) -> StageFuture<'a> {
        Box::pin(async move {
            let mut report = StageReport::new();
            let mut extracted = Vec::new();

            for entry in &self.entries {
                let entry_path = ctx.paths.assets.join(entry);
                if !entry_path.is_file() {
                    return Err(StageError::io(
                        "reading",
                        &entry_path,
                        std::io::Error::new(std::io::ErrorKind::NotFound, "entry module not found"),
                    ));
                }

                let outcome = bundle_entry(ctx, &entry_path, &self.bundle_name).await?;
                report.diagnostics.extend(outcome.diagnostics);

                for style in outcome.styles {
                    report.push_intermediate(style.path.clone());
                    extracted.push(style);
                }

                let Some(code) = outcome.code else {
                    continue;
                };

                let file_name = format!("{}.min.js", file_stem(&entry_path));
                let dest = ctx.paths.output.join("scripts").join(&file_name);

                match outcome.source_map {
                    Some(map) if ctx.mode.source_maps() => {
                        let map_json = map
                            .to_json()
                            .map_err(|e| StageError::Failed(format!("serializing source map: {e}")))?;
                        let map_path = dest.with_file_name(format!("{file_name}.map"));
                        write_file(&map_path, map_json).await?;
                        report.push_output(map_path);

                        let annotated = format!("{code}\n//# sourceMappingURL={file_name}.map\n");
                        write_file(&dest, annotated).await?;
                    }
                    _ => {
                        write_file(&dest, format!("{code}\n")).await?;
                    }
                }

                info!(entry = %entry, dest = %dest.display(), "bundled script");
                report.push_output(dest);
            }

            ctx.handoffs.set_extracted_styles(extracted);
            Ok(report)
        })
    }
}

async fn bundle_entry(
    ctx: &StageContext,
    entry_path: &Path,
    bundle_name: &str,
) -> Result<BundleOutcome, StageError> {
    let mut outcome = BundleOutcome::default();
    let mut modules: HashMap<PathBuf, Module> = HashMap::new();
    let mut queue: VecDeque<PathBuf> = VecDeque::from([entry_path.to_path_buf()]);
    let mut unresolved = false;

    while let Some(path) = queue.pop_front() {
        if modules.contains_key(&path) {
            continue;
        }

        let original = read_to_string(&path).await?;
        let (code, line_offset) = if has_extension(&path, &["vue"]) {
            let component = split_component(&original);
            if let Some(style) = component.style {
                outcome.styles.push(write_extracted_style(ctx, &path, &style).await?);
            }
            (component.script, component.script_line)
        } else {
            (original.clone(), 0)
        };

        let mut imports = Vec::new();
        for caps in IMPORT_RE.captures_iter(&code) {
            let spec = &caps["spec"];
            match resolve_import(&path, spec).await {
                Some(resolved) => {
                    imports.push(resolved.clone());
                    queue.push_back(resolved);
                }
                None => {
                    unresolved = true;
                    outcome.diagnostics.push(Diagnostic::new(
                        Some(&path),
                        format!("cannot resolve import '{spec}'"),
                    ));
                }
            }
        }

        let rel = relative_slash(&ctx.paths.assets, &path);
        debug!(module = %rel, imports = imports.len(), "loaded module");
        modules.insert(
            path,
            Module {
                id: module_id(&rel),
                rel,
                original,
                code,
                line_offset,
                imports,
            },
        );
    }

    if unresolved {
        return Ok(outcome);
    }

    let order = dependency_order(entry_path, &modules);
    let (code, map) = render_bundle(ctx, entry_path, &order, &modules, bundle_name);

    if ctx.mode.minify() {
        outcome.code = Some(minify_js(&code));
    } else {
        outcome.code = Some(code);
        outcome.source_map = Some(map);
    }
    Ok(outcome)
}

/// Post-order walk from the entry: every module after its imports. Import
/// cycles are broken at the first revisit.
fn dependency_order(entry: &Path, modules: &HashMap<PathBuf, Module>) -> Vec<PathBuf> {
    fn visit(
        path: &Path,
        modules: &HashMap<PathBuf, Module>,
        seen: &mut HashSet<PathBuf>,
        order: &mut Vec<PathBuf>,
    ) {
        if !seen.insert(path.to_path_buf()) {
            return;
        }
        if let Some(module) = modules.get(path) {
            for import in &module.imports {
                visit(import, modules, seen, order);
            }
        }
        order.push(path.to_path_buf());
    }

    let mut order = Vec::new();
    visit(entry, modules, &mut HashSet::new(), &mut order);
    order
}

fn render_bundle(
    ctx: &StageContext,
    entry: &Path,
    order: &[PathBuf],
    modules: &HashMap<PathBuf, Module>,
    bundle_name: &str,
) -> (String, SourceMapBuilder) {
    let file_name = format!("{}.min.js", file_stem(entry));
    let mut map = SourceMapBuilder::new(file_name);
    let mut lines: Vec<String> = Vec::new();

    let unmapped = |lines: &mut Vec<String>, map: &mut SourceMapBuilder, line: String| {
        lines.push(line);
        map.unmapped_line();
    };

    unmapped(&mut lines, &mut map, format!("var {bundle_name} = (function () {{"));
    unmapped(&mut lines, &mut map, "'use strict';".to_string());

    for path in order {
        let Some(module) = modules.get(path) else {
            continue;
        };
        let source = map.add_source(module.rel.clone(), module.original.clone());
        let (body, exports) = rewrite_module(ctx, module, modules);

        unmapped(&mut lines, &mut map, format!("var {} = (function () {{", module.id));
        for (i, line) in body.lines().enumerate() {
            lines.push(line.to_string());
            map.map_line(source, module.line_offset + i as u32);
        }
        unmapped(&mut lines, &mut map, format!("return {{ {} }};", exports.join(", ")));
        unmapped(&mut lines, &mut map, "})();".to_string());
    }

    let entry_id = modules
        .get(entry)
        .map(|m| m.id.clone())
        .unwrap_or_else(|| "{}".to_string());
    unmapped(&mut lines, &mut map, format!("return {entry_id};"));
    unmapped(&mut lines, &mut map, "})();".to_string());

    (lines.join("\n"), map)
}

/// Rewrite imports/exports of one module. Returns the body (same line count
/// as the module code) and the `key: value` pairs of its export object.
fn rewrite_module(
    ctx: &StageContext,
    module: &Module,
    modules: &HashMap<PathBuf, Module>,
) -> (String, Vec<String>) {
    let mut exports: Vec<String> = Vec::new();
    let mut import_index = 0usize;

    let code = IMPORT_RE.replace_all(&module.code, |caps: &Captures| {
        let target = module
            .imports
            .get(import_index)
            .and_then(|p| modules.get(p))
            .map(|m| m.id.clone())
            .unwrap_or_else(|| "{}".to_string());
        import_index += 1;

        let bindings = caps
            .name("clause")
            .map(|c| parse_import_clause(c.as_str()))
            .unwrap_or_default();
        let declaration = import_declaration(&target, &bindings);
        pad_lines(declaration, &caps[0])
    });

    let code = EXPORT_DEFAULT_RE.replace_all(&code, |caps: &Captures| {
        exports.push("default: __default".to_string());
        format!("{}var __default = ", &caps["indent"])
    });

    let code = EXPORT_DECL_RE.replace_all(&code, |caps: &Captures| {
        let name = &caps["name"];
        exports.push(format!("{name}: {name}"));
        format!("{}{} {}", &caps["indent"], &caps["kind"], name)
    });

    let code = EXPORT_LIST_RE.replace_all(&code, |caps: &Captures| {
        for item in caps["list"].split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let (local, exported) = match item.split_once(" as ") {
                Some((local, exported)) => (local.trim(), exported.trim()),
                None => (item, item),
            };
            exports.push(format!("{exported}: {local}"));
        }
        pad_lines(String::new(), &caps[0])
    });

    let node_env = format!("\"{}\"", ctx.mode.as_str());
    let code = rewrite_code(&code, |segment| {
        BLOCK_SCOPED_RE
            .replace_all(segment, "var$1")
            .replace("process.env.NODE_ENV", &node_env)
            .replace("process.env.VUE_ENV", "\"browser\"")
    });

    (code, exports)
}

fn parse_import_clause(clause: &str) -> Vec<Binding> {
    let clause = clause.trim();
    let mut bindings = Vec::new();

    let (head, braces) = match clause.find('{') {
        Some(start) => {
            let end = clause.rfind('}').unwrap_or(clause.len());
            (&clause[..start], Some(&clause[start + 1..end.max(start + 1)]))
        }
        None => (clause, None),
    };

    for part in head.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        if let Some(ns) = part.strip_prefix('*') {
            let local = ns.trim().trim_start_matches("as").trim();
            bindings.push(Binding {
                local: local.to_string(),
                imported: Imported::Namespace,
            });
        } else {
            bindings.push(Binding {
                local: part.to_string(),
                imported: Imported::Default,
            });
        }
    }

    if let Some(list) = braces {
        for item in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let (imported, local) = match item.split_once(" as ") {
                Some((imported, local)) => (imported.trim(), local.trim()),
                None => (item, item),
            };
            let imported = if imported == "default" {
                Imported::Default
            } else {
                Imported::Named(imported.to_string())
            };
            bindings.push(Binding {
                local: local.to_string(),
                imported,
            });
        }
    }

    bindings
}

fn import_declaration(target: &str, bindings: &[Binding]) -> String {
    if bindings.is_empty() {
        return String::new();
    }
    let parts: Vec<String> = bindings
        .iter()
        .map(|b| match &b.imported {
            Imported::Default => format!("{} = {target}.default", b.local),
            Imported::Named(name) => format!("{} = {target}.{name}", b.local),
            Imported::Namespace => format!("{} = {target}", b.local),
        })
        .collect();
    format!("var {};", parts.join(", "))
}

/// Keep the replaced text's line count so source-map lines stay aligned.
fn pad_lines(mut replacement: String, original: &str) -> String {
    for _ in 0..original.matches('\n').count() {
        replacement.push('\n');
    }
    replacement
}

/// Try `spec`, `spec.js`, `spec.vue` and `spec/index.js` relative to the
/// importing module. Bare (package) specifiers do not resolve.
async fn resolve_import(importer: &Path, spec: &str) -> Option<PathBuf> {
    if !(spec.starts_with("./") || spec.starts_with("../")) {
        return None;
    }
    let base = importer.parent()?.join(spec);

    let mut candidates = Vec::new();
    if has_extension(&base, &["js", "vue"]) {
        candidates.push(base.clone());
    }
    candidates.push(PathBuf::from(format!("{}.js", base.display())));
    candidates.push(PathBuf::from(format!("{}.vue", base.display())));
    candidates.push(base.join("index.js"));

    for candidate in candidates {
        if let Ok(meta) = tokio::fs::metadata(&candidate).await {
            if meta.is_file() {
                return Some(normalize(&candidate));
            }
        }
    }
    None
}

/// Lexically collapse `.` and `..` so one file has one module identity.
fn normalize(path: &Path) -> PathBuf {
    use std::path::Component;

    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn relative_slash(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

fn module_id(rel: &str) -> String {
    let sanitized: String = rel
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("__m_{sanitized}")
}

/// Parts of a single-file component.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Component {
    /// Script module code with the template merged into its default export.
    pub script: String,
    /// Line of the `.vue` file where `script` starts.
    pub script_line: u32,
    pub style: Option<String>,
}

/// Split a `.vue` file into script (template inlined) and style.
pub fn split_component(source: &str) -> Component {
    let template = extract_template(source);

    let (mut script, script_line) = match SCRIPT_BLOCK_RE.captures(source) {
        Some(caps) => match caps.name("body") {
            Some(body) => (
                body.as_str().to_string(),
                source[..body.start()].matches('\n').count() as u32,
            ),
            None => (String::new(), 0),
        },
        None => (String::new(), 0),
    };

    if let Some(template) = template {
        let literal = serde_json::to_string(template.trim()).unwrap_or_else(|_| "\"\"".to_string());
        if COMPONENT_DEFAULT_RE.is_match(&script) {
            script = COMPONENT_DEFAULT_RE
                .replace(&script, |_: &Captures| format!("export default {{ template: {literal},"))
                .into_owned();
        } else if script.trim().is_empty() {
            script = format!("export default {{ template: {literal} }};");
        }
    }

    let styles: Vec<&str> = STYLE_BLOCK_RE
        .captures_iter(source)
        .filter_map(|caps| caps.name("body").map(|m| m.as_str().trim()))
        .filter(|s| !s.is_empty())
        .collect();
    let style = if styles.is_empty() {
        None
    } else {
        Some(format!("{}\n", styles.join("\n\n")))
    };

    Component {
        script,
        script_line,
        style,
    }
}

/// Content between the first `<template>` opening tag and the last
/// `</template>`, so nested templates stay intact.
fn extract_template(source: &str) -> Option<&str> {
    let open = source.find("<template")?;
    let content_start = open + source[open..].find('>')? + 1;
    let close = source.rfind("</template>")?;
    (close >= content_start).then(|| &source[content_start..close])
}

async fn write_extracted_style(
    ctx: &StageContext,
    component: &Path,
    style: &str,
) -> Result<ExtractedStyle, StageError> {
    let stem = file_stem(component);
    let path = ctx.paths.tmp.join(format!("_{}.scss", stem.to_lowercase()));
    write_file(&path, style).await?;
    debug!(component = %stem, path = %path.display(), "extracted component style");
    Ok(ExtractedStyle {
        component: stem,
        path,
    })
}
