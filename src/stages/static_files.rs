// src/stages/static_files.rs

use crate::stages::{write_file, Diagnostic, Stage, StageContext, StageError, StageFuture, StageReport};

/// Copies configured static files (web app manifest, ...) from the source
/// root to the output root.
#[derive(Debug, Clone)]
pub struct StaticStage {
    files: Vec<String>,
}

impl StaticStage {
    pub fn new(files: Vec<String>) -> Self {
        Self { files }
    }
}

impl Stage for StaticStage {
    fn run<'a>(&'a self, ctx: &'a StageContext) -> StageFuture<'a> {
        Box::pin(async move {
            let mut report = StageReport::new();

            for name in &self.files {
                let src = ctx.paths.source.join(name);
                let dest = ctx.paths.output.join(name);

                let bytes = match tokio::fs::read(&src).await {
                    Ok(bytes) => bytes,
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                        report.push_diagnostic(Diagnostic::new(
                            Some(&src),
                            "static file does not exist; skipped",
                        ));
                        continue;
                    }
                    Err(e) => return Err(StageError::io("reading", &src, e)),
                };

                write_file(&dest, bytes).await?;
                report.push_output(dest);
            }

            Ok(report)
        })
    }
}
