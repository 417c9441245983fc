//! Directory delivery for the command line
//! Files land in an output directory, links are printed

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::dispatcher::Delivery;
use crate::error::{PipelineError, PipelineResult};
use crate::types::MediaFile;

pub struct DirectorySink {
    output_dir: PathBuf,
    files_written: AtomicUsize,
    links: Mutex<Vec<String>>,
}

impl DirectorySink {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            files_written: AtomicUsize::new(0),
            links: Mutex::new(Vec::new()),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn files_written(&self) -> usize {
        self.files_written.load(Ordering::Relaxed)
    }

    /// Links delivered as text, in order
    pub fn links(&self) -> Vec<String> {
        self.links
            .lock()
            .map(|links| links.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Delivery for DirectorySink {
    async fn send_text(&self, text: &str) -> PipelineResult<()> {
        println!("🔗 {}", text);
        log::info!("Link delivered: {}", text);
        self.links
            .lock()
            .map_err(|_| PipelineError::Delivery("link log poisoned".to_string()))?
            .push(text.to_string());
        Ok(())
    }

    async fn send_files(&self, files: Vec<MediaFile>) -> PipelineResult<()> {
        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|e| PipelineError::io(&self.output_dir, e))?;

        for file in files {
            // Never let a remote name escape the output directory
            let name = Path::new(&file.filename)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .filter(|n| !n.is_empty())
                .ok_or_else(|| {
                    PipelineError::Delivery(format!("unusable file name {:?}", file.filename))
                })?;
            let path = self.output_dir.join(&name);

            tokio::fs::write(&path, &file.data)
                .await
                .map_err(|e| PipelineError::io(&path, e))?;
            self.files_written.fetch_add(1, Ordering::Relaxed);
            log::debug!("Wrote {} ({} bytes)", path.display(), file.data.len());
        }

        Ok(())
    }
}
