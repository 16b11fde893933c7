//! Run-scoped working directory for intermediate artifacts.
//!
//! Every pipeline run gets its own directory keyed by a run id. Within it,
//! filenames are keyed by unit identifiers (page number, segment id, scene
//! id) so parallel workers never collide without any locking.

use std::io;
use std::path::{Path, PathBuf};

/// Working directory for one pipeline run.
#[derive(Debug)]
pub struct Workdir {
    root: PathBuf,
    keep: bool,
}

impl Workdir {
    /// Create `base/run_id` and its subdirectories.
    pub fn create(base: &Path, run_id: &str) -> io::Result<Self> {
        let root = base.join(run_id);
        for sub in ["raster", "audio", "slides", "clips"] {
            std::fs::create_dir_all(root.join(sub))?;
        }
        Ok(Self { root, keep: false })
    }

    /// Keep the directory on drop (debugging, `--keep-workdir`).
    pub fn keep(&mut self) {
        self.keep = true;
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Prefix for a page's rasterized image; the OCR engine appends its own
    /// page-number suffix.
    pub fn raster_prefix(&self, page: u32) -> PathBuf {
        self.root.join("raster").join(format!("page_{}", page))
    }

    /// Prefix for a page's extracted embedded images.
    pub fn images_prefix(&self, page: u32) -> PathBuf {
        self.root.join("raster").join(format!("page_{}_img", page))
    }

    /// Audio artifact for one narration segment, named by segment id so
    /// retries overwrite only their own file.
    pub fn segment_audio(&self, segment_id: &str) -> PathBuf {
        self.root.join("audio").join(format!("{}.wav", segment_id))
    }

    /// Concatenated narration track for one scene.
    pub fn scene_audio(&self, page: u32) -> PathBuf {
        self.root.join("audio").join(format!("scene_{}.wav", page))
    }

    /// Rendered slide background for one page.
    pub fn slide(&self, page: u32) -> PathBuf {
        self.root.join("slides").join(format!("slide_{}.png", page))
    }

    /// Rendered video clip for one scene.
    pub fn scene_clip(&self, page: u32) -> PathBuf {
        self.root.join("clips").join(format!("scene_{}.mp4", page))
    }

    /// Concatenated video before music mixing.
    pub fn concat_output(&self) -> PathBuf {
        self.root.join("combined.mp4")
    }

    /// Final mux within the workdir, moved to the caller's output path on
    /// success.
    pub fn final_output(&self) -> PathBuf {
        self.root.join("final.mp4")
    }

    pub fn thumbnail_output(&self) -> PathBuf {
        self.root.join("thumbnail.jpg")
    }

    /// Best-effort recursive cleanup; failures are logged, never fatal.
    pub fn cleanup(&self) {
        if let Err(e) = std::fs::remove_dir_all(&self.root) {
            if e.kind() != io::ErrorKind::NotFound {
                tracing::warn!("failed to clean workdir {}: {}", self.root.display(), e);
            }
        }
    }
}

impl Drop for Workdir {
    fn drop(&mut self) {
        if !self.keep {
            self.cleanup();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_keyed_paths_never_collide() {
        let base = tempfile::tempdir().unwrap();
        let wd = Workdir::create(base.path(), "run-1").unwrap();
        assert_ne!(wd.segment_audio("page_1_segment_0"), wd.segment_audio("page_1_segment_1"));
        assert_ne!(wd.scene_clip(1), wd.scene_clip(2));
        assert!(wd.raster_prefix(3).parent().unwrap().exists());
    }

    #[test]
    fn dropped_workdir_is_removed() {
        let base = tempfile::tempdir().unwrap();
        let root = {
            let wd = Workdir::create(base.path(), "run-2").unwrap();
            std::fs::write(wd.slide(1), b"png").unwrap();
            wd.root().to_path_buf()
        };
        assert!(!root.exists());
    }

    #[test]
    fn kept_workdir_survives_drop() {
        let base = tempfile::tempdir().unwrap();
        let root = {
            let mut wd = Workdir::create(base.path(), "run-3").unwrap();
            wd.keep();
            wd.root().to_path_buf()
        };
        assert!(root.exists());
    }
}
