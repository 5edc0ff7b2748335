//! Frame sources
//!
//! The production source runs ffmpeg against the V4L2 device and reads
//! fixed-size RGB24 frames from its stdout on a helper thread, so a stalled
//! device surfaces as a timeout instead of a blocked pipeline. A source
//! that dies or stalls is restarted on the next read.

use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

use crate::{CameraConfig, CameraError, VideoFrame};

/// How long a read waits for ffmpeg before the capture is restarted
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(3);

/// Anything that yields decoded frames at device rate
pub trait FrameSource: Send {
    /// Open the device and begin streaming
    fn start(&mut self) -> Result<(), CameraError>;

    /// Wait for the next frame. Implementations bound the wait.
    fn read_frame(&mut self) -> Result<VideoFrame, CameraError>;

    /// Stop streaming and close the device. Later calls are no-ops.
    fn release(&mut self) -> Result<(), CameraError>;

    /// Whether the device is currently streaming
    fn is_streaming(&self) -> bool;
}

/// Whole frames cut from a byte stream on a background thread
struct FrameReader {
    frames: Receiver<std::io::Result<Vec<u8>>>,
}

impl FrameReader {
    /// The thread ends after the first read error, or once the receiver is gone
    fn spawn<R: Read + Send + 'static>(mut input: R, frame_bytes: usize) -> Result<Self, CameraError> {
        let (tx, frames) = mpsc::sync_channel(1);
        thread::Builder::new()
            .name("camera-reader".into())
            .spawn(move || loop {
                let mut data = vec![0u8; frame_bytes];
                let result = input.read_exact(&mut data).map(|()| data);
                let failed = result.is_err();
                if tx.send(result).is_err() || failed {
                    break;
                }
            })
            .map_err(|e| CameraError::Spawn(format!("reader thread: {}", e)))?;
        Ok(Self { frames })
    }

    fn next(&self, timeout: Duration) -> Result<Vec<u8>, CameraError> {
        match self.frames.recv_timeout(timeout) {
            Ok(Ok(data)) => Ok(data),
            Ok(Err(e)) => Err(CameraError::Stream(e.to_string())),
            Err(RecvTimeoutError::Timeout) => Err(CameraError::Timeout(timeout)),
            Err(RecvTimeoutError::Disconnected) => Err(CameraError::Stream("reader thread ended".into())),
        }
    }
}

/// V4L2 camera decoded by an ffmpeg child process
pub struct FfmpegCamera {
    config: CameraConfig,
    program: String,
    read_timeout: Duration,
    child: Option<Child>,
    reader: Option<FrameReader>,
    sequence: u32,
    released: bool,
}

impl FfmpegCamera {
    pub fn new(config: CameraConfig) -> Self {
        Self {
            config,
            program: "ffmpeg".to_string(),
            read_timeout: DEFAULT_READ_TIMEOUT,
            child: None,
            reader: None,
            sequence: 0,
            released: false,
        }
    }

    /// Use a different capture binary
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    fn command(&self) -> Command {
        let size = format!("{}x{}", self.config.width, self.config.height);
        let scale = format!("scale={}:{}", self.config.width, self.config.height);

        let mut cmd = Command::new(&self.program);
        cmd.arg("-hide_banner")
            .arg("-loglevel")
            .arg("error")
            .arg("-fflags")
            .arg("nobuffer")
            .arg("-f")
            .arg("video4linux2")
            .arg("-input_format")
            .arg("mjpeg")
            .arg("-video_size")
            .arg(&size)
            .arg("-framerate")
            .arg(self.config.fps.to_string())
            .arg("-i")
            .arg(&self.config.device)
            .arg("-vf")
            .arg(&scale)
            .arg("-pix_fmt")
            .arg("rgb24")
            .arg("-f")
            .arg("rawvideo")
            .arg("-");
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());
        cmd
    }

    /// Killing the child closes its stdout, which ends the reader thread
    fn stop_child(&mut self) {
        self.reader = None;
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.kill() {
                debug!("ffmpeg capture already gone: {}", e);
            }
            let _ = child.wait();
        }
    }
}

impl FrameSource for FfmpegCamera {
    fn start(&mut self) -> Result<(), CameraError> {
        if self.child.is_some() {
            return Ok(());
        }

        let mut child = self
            .command()
            .spawn()
            .map_err(|e| CameraError::Spawn(format!("{}: {}", self.config.device, e)))?;
        let reader = match child.stdout.take() {
            Some(stdout) => FrameReader::spawn(stdout, self.config.frame_bytes()),
            None => Err(CameraError::Spawn("ffmpeg stdout not piped".into())),
        };
        let reader = match reader {
            Ok(reader) => reader,
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(e);
            }
        };

        info!(
            "Camera {} streaming {}x{} @ {}fps",
            self.config.device, self.config.width, self.config.height, self.config.fps
        );

        self.child = Some(child);
        self.reader = Some(reader);
        self.released = false;
        Ok(())
    }

    fn read_frame(&mut self) -> Result<VideoFrame, CameraError> {
        if self.released {
            return Err(CameraError::Released);
        }
        if self.child.is_none() {
            warn!("Camera {} not streaming; restarting capture", self.config.device);
            self.start()?;
        }

        let next = match self.reader.as_ref() {
            Some(reader) => reader.next(self.read_timeout),
            None => Err(CameraError::Stream("no reader attached".into())),
        };
        let data = match next {
            Ok(data) => data,
            Err(e) => {
                self.stop_child();
                return Err(e);
            }
        };

        let timestamp_ns = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        self.sequence = self.sequence.wrapping_add(1);

        Ok(VideoFrame::new(
            data,
            self.config.width,
            self.config.height,
            timestamp_ns,
            self.sequence,
        ))
    }

    fn release(&mut self) -> Result<(), CameraError> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        self.stop_child();
        info!("Camera {} released", self.config.device);
        Ok(())
    }

    fn is_streaming(&self) -> bool {
        self.child.is_some()
    }
}

impl Drop for FfmpegCamera {
    fn drop(&mut self) {
        self.stop_child();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::mpsc::Sender;
    use std::time::Instant;

    /// A pipe whose writer never writes
    struct SilentPipe(Receiver<()>);

    impl Read for SilentPipe {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            // Returns 0 (EOF) only once the test drops its sender
            let _ = self.0.recv();
            Ok(0)
        }
    }

    fn silent_pipe() -> (Sender<()>, SilentPipe) {
        let (tx, rx) = mpsc::channel();
        (tx, SilentPipe(rx))
    }

    fn config(width: u32, height: u32) -> CameraConfig {
        CameraConfig {
            device: "/dev/video2".into(),
            width,
            height,
            fps: 15,
        }
    }

    #[test]
    fn test_command_line() {
        let camera = FfmpegCamera::new(config(640, 480));
        let cmd = camera.command();
        let args: Vec<String> = cmd
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();

        assert_eq!(cmd.get_program(), "ffmpeg");
        assert!(args.windows(2).any(|w| w == ["-i", "/dev/video2"]));
        assert!(args.windows(2).any(|w| w == ["-video_size", "640x480"]));
        assert!(args.windows(2).any(|w| w == ["-pix_fmt", "rgb24"]));
        assert_eq!(args.last().map(String::as_str), Some("-"));
    }

    #[test]
    fn test_reader_cuts_whole_frames() {
        let reader = FrameReader::spawn(Cursor::new((0u8..30).collect::<Vec<_>>()), 12).unwrap();

        assert_eq!(reader.next(Duration::from_secs(5)).unwrap(), (0u8..12).collect::<Vec<_>>());
        assert_eq!(reader.next(Duration::from_secs(5)).unwrap(), (12u8..24).collect::<Vec<_>>());
        // Six trailing bytes are not a frame
        assert!(matches!(reader.next(Duration::from_secs(5)), Err(CameraError::Stream(_))));
    }

    #[test]
    fn test_stalled_stream_times_out() {
        let (writer, pipe) = silent_pipe();
        let reader = FrameReader::spawn(pipe, 12).unwrap();

        let started = Instant::now();
        let result = reader.next(Duration::from_millis(100));
        assert!(matches!(result, Err(CameraError::Timeout(_))));
        assert!(started.elapsed() < Duration::from_secs(5));

        drop(writer);
    }

    #[test]
    fn test_exiting_capture_reports_error_and_restarts() {
        // `true` ignores its arguments and exits without output
        let mut camera = FfmpegCamera::new(config(4, 4))
            .with_program("true")
            .with_read_timeout(Duration::from_secs(5));

        assert!(matches!(camera.read_frame(), Err(CameraError::Stream(_))));
        assert!(!camera.is_streaming());
        assert!(camera.read_frame().is_err());
        camera.release().unwrap();
    }

    #[test]
    fn test_missing_binary_is_spawn_error() {
        let mut camera = FfmpegCamera::new(config(4, 4)).with_program("definitely-not-ffmpeg");
        assert!(matches!(camera.read_frame(), Err(CameraError::Spawn(_))));
    }

    #[test]
    fn test_release_is_idempotent() {
        let mut camera = FfmpegCamera::new(CameraConfig::default());
        assert!(camera.release().is_ok());
        assert!(camera.release().is_ok());
        assert!(!camera.is_streaming());
        assert!(matches!(camera.read_frame(), Err(CameraError::Released)));
    }
}
