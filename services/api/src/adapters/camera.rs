//! services/api/src/adapters/camera.rs
//!
//! A `CaptureDeviceFactory` that treats a directory of encoded frames as the camera.
//! Whatever writes into the directory (a webcam daemon, `ffmpeg -update 1`, a test)
//! plays the role of the hardware; each read returns the newest unseen frame.

use async_trait::async_trait;
use companion_core::ports::{CaptureDevice, CaptureDeviceFactory, PortError, PortResult};
use std::path::PathBuf;
use std::time::SystemTime;
use tracing::{debug, info};

const FRAME_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// Opens `FrameDirectoryCamera` handles over a fixed directory.
#[derive(Clone, Debug)]
pub struct FrameDirectoryCameraFactory {
    dir: PathBuf,
}

impl FrameDirectoryCameraFactory {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }
}

#[async_trait]
impl CaptureDeviceFactory for FrameDirectoryCameraFactory {
    async fn open(&self) -> PortResult<Box<dyn CaptureDevice>> {
        let metadata = tokio::fs::metadata(&self.dir).await.map_err(|e| {
            PortError::Unavailable(format!("Camera directory {}: {}", self.dir.display(), e))
        })?;
        if !metadata.is_dir() {
            return Err(PortError::Unavailable(format!(
                "Camera path {} is not a directory",
                self.dir.display()
            )));
        }
        info!("Opened frame directory camera at {}", self.dir.display());
        Ok(Box::new(FrameDirectoryCamera {
            dir: Some(self.dir.clone()),
            last_seen: None,
        }))
    }
}

/// An open handle. `dir` is cleared on release.
pub struct FrameDirectoryCamera {
    dir: Option<PathBuf>,
    last_seen: Option<SystemTime>,
}

impl FrameDirectoryCamera {
    async fn newest_frame(dir: &PathBuf) -> PortResult<Option<(PathBuf, SystemTime)>> {
        let mut entries = tokio::fs::read_dir(dir)
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        let mut newest: Option<(PathBuf, SystemTime)> = None;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?
        {
            let path = entry.path();
            let is_frame = path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| FRAME_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
                .unwrap_or(false);
            if !is_frame {
                continue;
            }
            let Ok(modified) = entry.metadata().await.and_then(|m| m.modified()) else {
                continue;
            };
            if newest.as_ref().map_or(true, |(_, t)| modified > *t) {
                newest = Some((path, modified));
            }
        }
        Ok(newest)
    }
}

#[async_trait]
impl CaptureDevice for FrameDirectoryCamera {
    async fn read_frame(&mut self) -> PortResult<Vec<u8>> {
        let Some(dir) = self.dir.clone() else {
            return Err(PortError::Unavailable("Camera already released".to_string()));
        };

        let (path, modified) = Self::newest_frame(&dir)
            .await?
            .ok_or_else(|| PortError::NotFound("No frame available yet".to_string()))?;
        if self.last_seen.is_some_and(|seen| modified <= seen) {
            return Err(PortError::NotFound("No new frame since the last read".to_string()));
        }

        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        if bytes.is_empty() {
            return Err(PortError::Unexpected(format!("Frame {} is empty", path.display())));
        }
        self.last_seen = Some(modified);
        debug!("Read frame {} ({} bytes)", path.display(), bytes.len());
        Ok(bytes)
    }

    fn release(&mut self) {
        if let Some(dir) = self.dir.take() {
            info!("Released frame directory camera at {}", dir.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_directory_fails_to_open() {
        let factory = FrameDirectoryCameraFactory::new(PathBuf::from("/no/such/camera/dir"));
        assert!(matches!(factory.open().await, Err(PortError::Unavailable(_))));
    }

    #[tokio::test]
    async fn reads_newest_frame_once_then_releases() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();
        std::fs::write(dir.path().join("frame.jpg"), [0xFF, 0xD8, 0xFF]).unwrap();

        let factory = FrameDirectoryCameraFactory::new(dir.path().to_path_buf());
        let mut camera = factory.open().await.unwrap();

        assert_eq!(camera.read_frame().await.unwrap(), vec![0xFF, 0xD8, 0xFF]);
        assert!(matches!(camera.read_frame().await, Err(PortError::NotFound(_))));

        camera.release();
        camera.release();
        assert!(matches!(camera.read_frame().await, Err(PortError::Unavailable(_))));
    }

    #[tokio::test]
    async fn empty_directory_is_a_transient_miss() {
        let dir = tempfile::tempdir().unwrap();
        let mut camera = FrameDirectoryCameraFactory::new(dir.path().to_path_buf())
            .open()
            .await
            .unwrap();
        assert!(matches!(camera.read_frame().await, Err(PortError::NotFound(_))));
    }
}
