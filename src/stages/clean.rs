// src/stages/clean.rs

use std::io::ErrorKind;
use std::path::Path;

use tracing::debug;

use crate::stages::{list_files, Stage, StageContext, StageError, StageFuture, StageReport};

/// Output subdirectories fully owned by the pipeline.
const OWNED_DIRS: &[&str] = &["styles", "scripts", "images"];

/// Removes everything the pipeline writes, and nothing else.
#[derive(Debug, Clone, Default)]
pub struct CleanStage {
    static_files: Vec<String>,
}

impl CleanStage {
    pub fn new(static_files: Vec<String>) -> Self {
        Self { static_files }
    }
}

impl Stage for CleanStage {
    fn run<'a>(&'a self, ctx: &'a StageContext) -> StageFuture<'a> {
        Box::pin(async move {
            let output = &ctx.paths.output;

            for dir in OWNED_DIRS {
                remove_dir(&output.join(dir)).await?;
            }
            for html in list_files(output, &["html"]).await? {
                remove_file(&html).await?;
            }
            for file in &self.static_files {
                remove_file(&output.join(file)).await?;
            }
            remove_file(&output.join("sw.js")).await?;
            remove_dir(&ctx.paths.tmp).await?;

            Ok(StageReport::new())
        })
    }
}

async fn remove_dir(path: &Path) -> Result<(), StageError> {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => {
            debug!(path = %path.display(), "removed directory");
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StageError::io("removing", path, e)),
    }
}

async fn remove_file(path: &Path) -> Result<(), StageError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            debug!(path = %path.display(), "removed file");
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StageError::io("removing", path, e)),
    }
}
