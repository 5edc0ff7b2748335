//! Clip encoding
//!
//! Frames are written as a concatenated MJPEG stream and transcoded by an
//! external ffmpeg into an H.264 MP4 that browsers can play.

use camera_capture::VideoFrame;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::{file_stamp, StorageError};

/// Destination for a finished evidence clip
pub trait ClipSink: Send + Sync {
    /// Persist `frames` as one clip played back at `fps`; returns its path
    fn write_clip(&self, frames: &[Arc<VideoFrame>], fps: u32) -> Result<PathBuf, StorageError>;
}

/// Removes the intermediate file however the transcode ends
struct TempFile(PathBuf);

impl Drop for TempFile {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.0) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove {}: {}", self.0.display(), e);
            }
        }
    }
}

/// Writes clips through `ffmpeg -f mjpeg ... -c:v libx264`
#[derive(Debug, Clone)]
pub struct FfmpegClipWriter {
    dir: PathBuf,
    jpeg_quality: u8,
    program: String,
}

impl FfmpegClipWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            jpeg_quality: 90,
            program: "ffmpeg".to_string(),
        }
    }

    /// Use a different transcoder binary
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn transcode_command(&self, input: &Path, output: &Path, fps: u32) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("-y")
            .arg("-loglevel")
            .arg("error")
            .arg("-f")
            .arg("mjpeg")
            .arg("-framerate")
            .arg(fps.max(1).to_string())
            .arg("-i")
            .arg(input)
            .arg("-c:v")
            .arg("libx264")
            .arg("-preset")
            .arg("ultrafast")
            .arg("-crf")
            .arg("28")
            .arg("-pix_fmt")
            .arg("yuv420p")
            .arg(output);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        cmd
    }

    fn write_mjpeg(&self, path: &Path, frames: &[Arc<VideoFrame>]) -> Result<usize, StorageError> {
        let mut out = BufWriter::new(File::create(path)?);
        let mut written = 0;
        for frame in frames {
            match frame.encode_jpeg(self.jpeg_quality) {
                Ok(jpeg) => {
                    out.write_all(&jpeg)?;
                    written += 1;
                }
                Err(e) => debug!("Dropping unencodable frame {}: {}", frame.sequence, e),
            }
        }
        out.flush()?;
        Ok(written)
    }
}

impl ClipSink for FfmpegClipWriter {
    fn write_clip(&self, frames: &[Arc<VideoFrame>], fps: u32) -> Result<PathBuf, StorageError> {
        if frames.is_empty() {
            return Err(StorageError::Empty);
        }
        fs::create_dir_all(&self.dir)?;

        let stamp = file_stamp();
        let temp = TempFile(self.dir.join(format!("temp_{}.mjpeg", stamp)));
        let output = self.dir.join(format!("evidence_{}.mp4", stamp));

        let written = self.write_mjpeg(&temp.0, frames)?;
        if written == 0 {
            return Err(StorageError::Encode("no frame could be encoded".into()));
        }

        info!("Converting {} frames to {}", written, output.display());
        let status = self
            .transcode_command(&temp.0, &output, fps)
            .status()
            .map_err(|e| StorageError::Transcode(format!("{}: {}", self.program, e)))?;

        if !status.success() {
            return Err(StorageError::Transcode(format!("{} exited with {}", self.program, status)));
        }
        Ok(output)
    }
}
