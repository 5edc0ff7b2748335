//! Capture-to-alert loop
//!
//! Every stage runs sequentially on one thread. Stage failures are logged
//! and the loop moves on to the next frame; only a stop request ends it.

use alerting::{AlertEdge, AlertLatch, Relay};
use camera_capture::{FfmpegCamera, FrameSource, RegionSelector, VideoFrame};
use config_store::ConfigStore;
use dms::{DmsAnalysis, DmsModule};
use metrics::{counter, gauge, histogram};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use storage::{DatasetCollector, EvidenceRecorder, FfmpegClipWriter, SnapshotWriter, TriggerOutcome};
use tracing::{debug, info, warn};

use crate::annotate::{self, Overlay};
use crate::{CycleParams, FramePublisher, MonitorSettings, PipelineError, StopSignal};

/// Pause after a failed camera read
const READ_RETRY_DELAY: Duration = Duration::from_millis(500);

/// How long shutdown waits for an in-flight evidence save
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Hardware and storage endpoints the loop drives
pub struct Components {
    pub source: Box<dyn FrameSource>,
    pub dms: DmsModule,
    pub relay: Relay,
    pub recorder: EvidenceRecorder,
    pub snapshots: SnapshotWriter,
    pub dataset: DatasetCollector,
}

/// Outcome of one cycle
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    /// `None` when detection failed this cycle
    pub analysis: Option<DmsAnalysis>,
    pub edge: Option<AlertEdge>,
    pub alert_active: bool,
    /// Set on a rising edge
    pub evidence: Option<TriggerOutcome>,
    pub published: bool,
}

pub struct Pipeline {
    source: Box<dyn FrameSource>,
    dms: DmsModule,
    selector: RegionSelector,
    latch: AlertLatch,
    relay: Relay,
    recorder: EvidenceRecorder,
    snapshots: SnapshotWriter,
    dataset: DatasetCollector,
    publisher: FramePublisher,
    config: Arc<ConfigStore>,
    stop: StopSignal,
    shut_down: bool,
}

impl Pipeline {
    pub fn new(components: Components, config: Arc<ConfigStore>, publisher: FramePublisher, stop: StopSignal) -> Self {
        Self {
            source: components.source,
            dms: components.dms,
            selector: RegionSelector::default(),
            latch: AlertLatch::new(),
            relay: components.relay,
            recorder: components.recorder,
            snapshots: components.snapshots,
            dataset: components.dataset,
            publisher,
            config,
            stop,
            shut_down: false,
        }
    }

    /// Wire up the real camera, ONNX models, GPIO relay and ffmpeg writer
    pub fn from_settings(
        settings: &MonitorSettings,
        config: Arc<ConfigStore>,
        publisher: FramePublisher,
        stop: StopSignal,
    ) -> Result<Self, PipelineError> {
        let params = CycleParams::from_store(&config);
        let dms = DmsModule::from_config(params.dms)?;
        let sink = Arc::new(FfmpegClipWriter::new(&settings.evidence_dir));

        let components = Components {
            source: Box::new(FfmpegCamera::new(settings.camera.clone())),
            dms,
            relay: Relay::initialize(settings.led_pin),
            recorder: EvidenceRecorder::new(&settings.recorder, sink),
            snapshots: SnapshotWriter::new(&settings.snapshot_dir),
            dataset: DatasetCollector::new(&settings.dataset_dir, params.data_collection_interval),
        };
        Ok(Self::new(components, config, publisher, stop))
    }

    pub fn is_alert_active(&self) -> bool {
        self.latch.is_active()
    }

    /// Read one frame and process it
    pub fn step(&mut self, now: Instant) -> Result<CycleReport, PipelineError> {
        let frame = self.source.read_frame()?;
        Ok(self.process(frame, now))
    }

    /// Run every stage on `frame`
    pub fn process(&mut self, frame: VideoFrame, now: Instant) -> CycleReport {
        let started = Instant::now();
        let params = CycleParams::from_store(&self.config);

        let frame = Arc::new(frame);
        self.recorder.push(Arc::clone(&frame));
        self.dms.update_config(params.dms.clone());
        self.dataset.set_interval(params.data_collection_interval);

        let selection = self.selector.select(&frame, params.crop);
        let region = selection.region;
        let collect = self.dataset.should_collect(params.data_collection_enabled, now);
        if collect {
            if let Err(e) = self.dataset.save_detection_frame(&selection.frame, unix_now()) {
                warn!("Dataset frame not saved: {}", e);
            }
        }

        let mut report = CycleReport::default();
        let analysis = match self.dms.analyze(&frame, &selection, now) {
            Ok(analysis) => analysis,
            Err(e) => {
                counter!("monitor_detection_errors_total").increment(1);
                warn!("Detection failed: {}", e);
                report.alert_active = self.latch.is_active();
                report.published = self.publish(&frame, params.jpeg_quality);
                return report;
            }
        };
        drop(selection);

        if collect {
            self.collect_eyes(&frame, &analysis);
        }
        if analysis.watchdog_tripped {
            debug!("Watchdog cleared state after {} empty cycles", analysis.missing_cycles);
        }

        report.edge = self.latch.update(analysis.drowsy);
        report.alert_active = self.latch.is_active();

        let display = annotate::render(
            &frame,
            &Overlay {
                analysis: Some(&analysis),
                region,
                alert: report.alert_active,
            },
        )
        .unwrap_or_else(|e| {
            warn!("Annotation failed: {}", e);
            VideoFrame::clone(&frame)
        });

        if let Some(edge) = report.edge {
            if edge == AlertEdge::Rising {
                counter!("monitor_drowsy_events_total").increment(1);
                if let Err(e) = self.snapshots.save(&display) {
                    warn!("Alert snapshot not saved: {}", e);
                }
                let outcome = self.recorder.trigger(now);
                debug!("Evidence trigger: {:?}", outcome);
                report.evidence = Some(outcome);
            }
            self.relay.apply(edge);
        }

        report.published = self.publish(&display, params.jpeg_quality);
        report.analysis = Some(analysis);

        counter!("monitor_cycles_total").increment(1);
        gauge!("monitor_alert_active").set(if report.alert_active { 1.0 } else { 0.0 });
        histogram!("monitor_cycle_seconds").record(started.elapsed().as_secs_f64());
        report
    }

    fn collect_eyes(&self, frame: &VideoFrame, analysis: &DmsAnalysis) {
        let unix = unix_now();
        for eye in &analysis.workers {
            let b = eye.bbox;
            let Some(crop) = frame.crop(b.x1 as u32, b.y1 as u32, b.width() as u32, b.height() as u32) else {
                continue;
            };
            if let Err(e) = self.dataset.save_eye(&crop, unix, eye.slot.label(), eye.state.is_open()) {
                warn!("Dataset eye not saved: {}", e);
            }
        }
    }

    fn publish(&self, frame: &VideoFrame, quality: u8) -> bool {
        match frame.encode_jpeg(quality) {
            Ok(jpeg) => {
                self.publisher.publish(jpeg);
                true
            }
            Err(e) => {
                warn!("Frame not published: {}", e);
                false
            }
        }
    }

    /// Loop until stopped, then shut down
    pub fn run(&mut self) {
        info!("Pipeline started");
        if let Err(e) = self.source.start() {
            warn!("Camera start failed: {}; retrying on read", e);
        }

        while !self.stop.is_stopped() {
            match self.step(Instant::now()) {
                Ok(report) => {
                    if let Some(edge) = report.edge {
                        debug!("Alert edge {:?}, evidence {:?}", edge, report.evidence);
                    }
                }
                Err(e) => {
                    counter!("monitor_frame_errors_total").increment(1);
                    warn!("Frame read failed: {}", e);
                    thread::sleep(READ_RETRY_DELAY);
                }
            }
        }

        self.shutdown();
    }

    /// Release the camera and relay, then give an in-flight save a few
    /// seconds to finish. Runs once.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;

        info!("Pipeline stopping");
        if let Err(e) = self.source.release() {
            warn!("Camera release failed: {}", e);
        }
        self.relay.release();
        if !self.recorder.wait_idle(SHUTDOWN_GRACE) {
            warn!("Exiting with an evidence save still in progress");
        }
        info!("Pipeline stopped");
    }
}

/// Run `pipeline` on its own named thread
pub fn spawn_pipeline(mut pipeline: Pipeline) -> Result<JoinHandle<()>, PipelineError> {
    thread::Builder::new()
        .name("monitor-pipeline".into())
        .spawn(move || pipeline.run())
        .map_err(PipelineError::Spawn)
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alerting::{OutputPin, RelayError};
    use camera_capture::CameraError;
    use config_store::keys;
    use dms::{BoundingBox, DmsConfig, DmsError, EyeClassifier, EyeDetector};
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use storage::{ClipSink, RecorderConfig, StorageError};

    const WIDTH: u32 = 320;
    const HEIGHT: u32 = 240;

    struct FakeCamera {
        sequence: u32,
        fail_next: bool,
        released: Arc<AtomicUsize>,
    }

    impl FrameSource for FakeCamera {
        fn start(&mut self) -> Result<(), CameraError> {
            Ok(())
        }

        fn read_frame(&mut self) -> Result<VideoFrame, CameraError> {
            if std::mem::take(&mut self.fail_next) {
                return Err(CameraError::Stream("unplugged".into()));
            }
            self.sequence += 1;
            let mut frame = VideoFrame::blank(WIDTH, HEIGHT);
            frame.sequence = self.sequence;
            Ok(frame)
        }

        fn release(&mut self) -> Result<(), CameraError> {
            self.released.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn is_streaming(&self) -> bool {
            true
        }
    }

    /// Two eyes side by side in the middle of the frame, or nothing
    struct PairDetector {
        visible: Arc<Mutex<bool>>,
        fail: bool,
    }

    impl EyeDetector for PairDetector {
        fn detect(&mut self, _frame: &VideoFrame) -> Result<Vec<BoundingBox>, DmsError> {
            if self.fail {
                return Err(DmsError::Inference("session lost".into()));
            }
            if !*self.visible.lock().unwrap() {
                return Ok(Vec::new());
            }
            Ok(vec![
                BoundingBox::new(120, 110, 150, 130, 0.9),
                BoundingBox::new(170, 110, 200, 130, 0.9),
            ])
        }

        fn set_thresholds(&mut self, _conf: f32, _iou: f32) {}
    }

    struct FixedClassifier(f32);

    impl EyeClassifier for FixedClassifier {
        fn predict(&mut self, _crop: &VideoFrame, threshold: f32) -> Result<(u8, f32), DmsError> {
            Ok((u8::from(self.0 > threshold), self.0))
        }
    }

    #[derive(Default)]
    struct CountingSink(AtomicUsize);

    impl ClipSink for CountingSink {
        fn write_clip(&self, _frames: &[Arc<VideoFrame>], _fps: u32) -> Result<PathBuf, StorageError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(PathBuf::from("evidence.mp4"))
        }
    }

    #[derive(Clone, Default)]
    struct RecordingPin(Arc<Mutex<Vec<bool>>>);

    impl OutputPin for RecordingPin {
        fn set(&mut self, on: bool) -> Result<(), RelayError> {
            self.0.lock().unwrap().push(on);
            Ok(())
        }

        fn release(&mut self) -> Result<(), RelayError> {
            Ok(())
        }
    }

    struct Rig {
        pipeline: Pipeline,
        sink: Arc<CountingSink>,
        pin: RecordingPin,
        visible: Arc<Mutex<bool>>,
        released: Arc<AtomicUsize>,
        publisher: FramePublisher,
        scratch: PathBuf,
    }

    fn rig(probability: f32, detector_fails: bool) -> Rig {
        let nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos();
        let scratch = std::env::temp_dir().join(format!("pipeline-{}-{}", std::process::id(), nanos));

        let visible = Arc::new(Mutex::new(true));
        let released = Arc::new(AtomicUsize::new(0));
        let sink = Arc::new(CountingSink::default());
        let pin = RecordingPin::default();
        let publisher = FramePublisher::new(Vec::new());

        let dms = DmsModule::new(
            DmsConfig::default(),
            Box::new(PairDetector {
                visible: Arc::clone(&visible),
                fail: detector_fails,
            }),
            Box::new(FixedClassifier(probability)),
        );
        let components = Components {
            source: Box::new(FakeCamera {
                sequence: 0,
                fail_next: false,
                released: Arc::clone(&released),
            }),
            dms,
            relay: Relay::with_pin(21, Box::new(pin.clone())),
            recorder: EvidenceRecorder::new(&RecorderConfig::default(), sink.clone()),
            snapshots: SnapshotWriter::new(scratch.join("snapshots")),
            dataset: DatasetCollector::new(scratch.join("data"), Duration::from_secs(10)),
        };

        let config = Arc::new(ConfigStore::with_defaults(scratch.join("monitor.json")));
        let pipeline = Pipeline::new(components, config, publisher.clone(), StopSignal::new());

        Rig {
            pipeline,
            sink,
            pin,
            visible,
            released,
            publisher,
            scratch,
        }
    }

    fn at(base: Instant, cycle: u32) -> Instant {
        base + Duration::from_secs_f64(f64::from(cycle) / 30.0)
    }

    #[test]
    fn test_sustained_closure_alerts_once() {
        let mut rig = rig(0.0, false);
        let base = Instant::now();

        let mut rising = Vec::new();
        for cycle in 0..=60 {
            let report = rig.pipeline.step(at(base, cycle)).unwrap();
            if report.edge == Some(AlertEdge::Rising) {
                rising.push(cycle);
                assert_eq!(report.evidence, Some(TriggerOutcome::Started));
            }
        }
        assert_eq!(rising, vec![60]);
        assert!(rig.pipeline.is_alert_active());
        assert_eq!(*rig.pin.0.lock().unwrap(), vec![true]);

        // Still closed: no further edges or saves
        for cycle in 61..90 {
            let report = rig.pipeline.step(at(base, cycle)).unwrap();
            assert_eq!(report.edge, None);
        }
        rig.pipeline.shutdown();
        assert_eq!(rig.sink.0.load(Ordering::SeqCst), 1);

        let snapshots = std::fs::read_dir(rig.scratch.join("snapshots")).unwrap().count();
        assert_eq!(snapshots, 1);
        std::fs::remove_dir_all(&rig.scratch).unwrap();
    }

    #[test]
    fn test_open_eyes_never_alert() {
        let mut rig = rig(0.95, false);
        let base = Instant::now();

        for cycle in 0..120 {
            let report = rig.pipeline.step(at(base, cycle)).unwrap();
            assert_eq!(report.edge, None);
            assert!(report.published);
            assert_eq!(report.analysis.unwrap().workers.len(), 2);
        }
        assert_eq!(rig.sink.0.load(Ordering::SeqCst), 0);
        assert_eq!(rig.publisher.sequence(), 120);
    }

    #[test]
    fn test_watchdog_clears_alert() {
        let mut rig = rig(0.0, false);
        let base = Instant::now();
        for cycle in 0..=60 {
            rig.pipeline.step(at(base, cycle)).unwrap();
        }
        assert!(rig.pipeline.is_alert_active());

        *rig.visible.lock().unwrap() = false;
        let mut falling_at = None;
        for cycle in 61..100 {
            let report = rig.pipeline.step(at(base, cycle)).unwrap();
            if report.edge == Some(AlertEdge::Falling) {
                falling_at = Some(cycle);
                break;
            }
        }

        // Cycle 61 reuses the previous boxes; detection runs on 62 and
        // empty cycles count from there
        assert_eq!(falling_at, Some(62 + 14));
        assert_eq!(*rig.pin.0.lock().unwrap(), vec![true, false]);
    }

    #[test]
    fn test_detection_failure_still_publishes() {
        let mut rig = rig(0.0, true);
        let report = rig.pipeline.step(Instant::now()).unwrap();

        assert!(report.analysis.is_none());
        assert!(report.published);
        assert!(rig.publisher.latest().is_some());
    }

    #[test]
    fn test_camera_error_surfaces_from_step() {
        let mut rig = rig(0.95, false);
        rig.pipeline.source = Box::new(FakeCamera {
            sequence: 0,
            fail_next: true,
            released: Arc::clone(&rig.released),
        });

        assert!(matches!(rig.pipeline.step(Instant::now()), Err(PipelineError::Camera(_))));
        assert!(rig.pipeline.step(Instant::now()).is_ok());
    }

    #[test]
    fn test_dataset_collection_layout() {
        let mut rig = rig(0.0, false);
        rig.pipeline.config.set(keys::DATA_COLLECTION_ENABLED, true);

        rig.pipeline.step(Instant::now()).unwrap();

        let data = rig.scratch.join("data");
        assert_eq!(std::fs::read_dir(data.join("raw_yolo")).unwrap().count(), 1);
        assert_eq!(std::fs::read_dir(data.join("raw_eyes/closed")).unwrap().count(), 2);
        std::fs::remove_dir_all(&rig.scratch).unwrap();
    }

    #[test]
    fn test_run_stops_and_releases() {
        let rig = rig(0.95, false);
        let stop = rig.pipeline.stop.clone();
        let released = Arc::clone(&rig.released);
        let publisher = rig.publisher.clone();

        let Rig { pipeline, .. } = rig;
        let handle = spawn_pipeline(pipeline).unwrap();

        let mut sub = publisher.subscribe();
        assert!(sub.next(Duration::from_secs(5)).is_fresh());

        stop.stop();
        handle.join().unwrap();
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }
}
