//! 交互会话
//!
//! 归交互线程所有。请求只负责把任务交给线程池，
//! 结果通过 `poll_events` / `wait_event` 回到本线程后才修改评分和报告。
//! 同一时间最多一个任务在执行。

use log::{info, warn};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{Receiver, RecvTimeoutError, TryRecvError};
use std::sync::{Arc, Mutex, TryLockError};
use std::time::Duration;

use crate::core::classify::{Classifier, ClassificationEngine, DirectoryScores, LinearModel, VideoScore};
use crate::core::config::ScoringConfig;
use crate::core::error::ScoringError;
use crate::core::region::{RegionKey, RegionScoreMap, Totals};
use crate::core::report::{
    export_report, finalize_report, PatientDetails, PdfRenderer, ReportExport, ReportPhase, ReportTemplate,
    SessionReportState, WkhtmltopdfRenderer,
};
use crate::core::video::{
    CoordinateMapper, CropJob, CropSelection, DisplayGeometry, FfmpegDecoder, FfmpegTranscoder, FrameDecoder,
    FrameSample, FrameSampler, SourceCropRegion, Transcoder, VideoAsset, WorkDir,
};
use crate::core::worker::{JobEvent, JobId, JobOutcome, WorkerPool};

const WORKING_REPORT_NAME: &str = "working_report.html";

/// 事件应用之后交给界面的结果
#[derive(Debug)]
pub enum SessionUpdate {
    PreviewReady {
        job_id: JobId,
        frame: FrameSample,
    },
    /// 裁剪成功，随后自动提交的分类任务
    Cropped {
        job_id: JobId,
        output: PathBuf,
        region: SourceCropRegion,
        classification_job: Option<JobId>,
    },
    Scored {
        job_id: JobId,
        region: Option<RegionKey>,
        score: VideoScore,
    },
    DirectoryScored {
        job_id: JobId,
        scores: DirectoryScores,
    },
    Failed {
        job_id: JobId,
        region: Option<RegionKey>,
        error: ScoringError,
    },
}

/// 线程池结果通道的共享端
///
/// 等待事件不需要持有会话本身，阻塞等待的线程只占用这把锁，
/// 其他线程仍然可以读取评分、提交请求。
#[derive(Clone)]
pub struct EventSource {
    inner: Arc<Mutex<Receiver<JobEvent>>>,
}

impl EventSource {
    fn new(receiver: Receiver<JobEvent>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(receiver)),
        }
    }

    /// 取一个已经到达的事件；有线程正在等待时返回 None
    pub fn try_next(&self) -> Option<JobEvent> {
        let receiver = match self.inner.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => return None,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
        };
        match receiver.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                warn!("Worker channel closed");
                None
            }
        }
    }

    /// 阻塞等待下一个事件；超时返回 None
    pub fn next_timeout(&self, timeout: Duration) -> Option<JobEvent> {
        let receiver = self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        match receiver.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => {
                warn!("Worker channel closed");
                None
            }
        }
    }
}

pub struct SessionController {
    config: ScoringConfig,
    engine: Arc<ClassificationEngine>,
    transcoder: Arc<dyn Transcoder>,
    pool: WorkerPool,
    events: EventSource,
    report: SessionReportState,
    work_dir: WorkDir,
    selected_region: Option<RegionKey>,
    current: Option<VideoAsset>,
    in_flight: Option<JobId>,
}

impl SessionController {
    pub fn new(
        config: ScoringConfig,
        model: Arc<dyn Classifier>,
        decoder: Arc<dyn FrameDecoder>,
        transcoder: Arc<dyn Transcoder>,
    ) -> Result<Self, ScoringError> {
        let template = ReportTemplate::load(&config.template_path)?;
        let work_dir = WorkDir::new(&config.work_dir);
        let report = SessionReportState::new(template, work_dir.path().join(WORKING_REPORT_NAME));

        let sampler = FrameSampler::new(decoder, work_dir.clone(), config.max_frames);
        let engine = Arc::new(ClassificationEngine::new(model, sampler));
        let (pool, events) = WorkerPool::new(config.worker_threads())?;

        info!(
            "✅ Scoring session ready: {} worker(s), work dir {:?}",
            pool.threads(),
            work_dir.path()
        );
        Ok(Self {
            config,
            engine,
            transcoder,
            pool,
            events: EventSource::new(events),
            report,
            work_dir,
            selected_region: None,
            current: None,
            in_flight: None,
        })
    }

    /// 用配置里的模型文件和外部工具创建会话
    pub fn from_config(config: ScoringConfig) -> Result<Self, ScoringError> {
        let model = LinearModel::load(&config.model_path)
            .map_err(|e| ScoringError::Config(format!("model {:?}: {}", config.model_path, e)))?;
        let decoder = FfmpegDecoder::new(config.ffmpeg_path.clone());
        let transcoder = FfmpegTranscoder::new(
            config.ffmpeg_path.clone(),
            config.crop_quality,
            config.crop_frame_limit,
        );
        Self::new(config, Arc::new(model), Arc::new(decoder), Arc::new(transcoder))
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    pub fn selected_region(&self) -> Option<RegionKey> {
        self.selected_region
    }

    pub fn current_video(&self) -> Option<&VideoAsset> {
        self.current.as_ref()
    }

    pub fn in_flight(&self) -> Option<JobId> {
        self.in_flight
    }

    pub fn scores(&self) -> &RegionScoreMap {
        self.report.scores()
    }

    pub fn totals(&self) -> Totals {
        self.report.totals()
    }

    pub fn document(&self) -> &str {
        self.report.document()
    }

    pub fn phase(&self) -> ReportPhase {
        self.report.phase()
    }

    /// 切换分区会丢弃上一个分区的视频；任务执行中不能切换
    pub fn select_region(&mut self, region: RegionKey) -> Result<(), ScoringError> {
        self.require_idle()?;
        if self.selected_region != Some(region) {
            self.current = None;
        }
        self.selected_region = Some(region);
        info!("📍 Region selected: {}", region);
        Ok(())
    }

    pub fn request_preview(&mut self, video: impl Into<PathBuf>) -> Result<JobId, ScoringError> {
        let region = self.require_idle_region()?;
        let asset = VideoAsset::new(video);
        let engine = self.engine.clone();

        let job_id = self.pool.dispatch(
            Some(region),
            move || engine.sampler().preview(&asset),
            JobOutcome::Preview,
        );
        self.in_flight = Some(job_id);
        Ok(job_id)
    }

    /// `selection` 是控件坐标，`widget` 是预览控件的尺寸
    pub fn request_crop(&mut self, selection: CropSelection, widget: (u32, u32)) -> Result<JobId, ScoringError> {
        let region = self.require_idle_region()?;
        let asset = self
            .current
            .clone()
            .ok_or_else(|| ScoringError::InvalidGeometry("no preview loaded for this region".into()))?;
        let source = asset.dimensions().ok_or_else(|| {
            ScoringError::InvalidGeometry(format!("dimensions of {} are unknown", asset.file_name()))
        })?;

        let mapper = CoordinateMapper::new(DisplayGeometry::new(widget, source), self.config.min_crop_side)?;
        let crop = mapper.map(&selection);
        let job = CropJob::new(asset, crop, &self.config.crop_suffix);
        let transcoder = self.transcoder.clone();

        let job_id = self
            .pool
            .dispatch(Some(region), move || job.run(transcoder.as_ref()), JobOutcome::Cropped);
        self.in_flight = Some(job_id);
        Ok(job_id)
    }

    /// 不裁剪，直接对视频评分
    pub fn request_classification(&mut self, video: impl Into<PathBuf>) -> Result<JobId, ScoringError> {
        let region = self.require_idle_region()?;
        let job_id = self.dispatch_classification(region, VideoAsset::new(video));
        Ok(job_id)
    }

    /// 目录模式：按文件名对应分区，一次给多个分区评分
    pub fn request_directory_classification(&mut self, dir: impl Into<PathBuf>) -> Result<JobId, ScoringError> {
        self.require_idle()?;
        let dir = dir.into();
        let engine = self.engine.clone();

        let job_id = self.pool.dispatch(
            None,
            move || engine.score_directory(&dir),
            JobOutcome::DirectoryClassified,
        );
        self.in_flight = Some(job_id);
        Ok(job_id)
    }

    /// 结果通道，可以在不持有会话的情况下等待
    pub fn events(&self) -> EventSource {
        self.events.clone()
    }

    /// 应用所有已经到达的事件，不阻塞
    pub fn poll_events(&mut self) -> Vec<SessionUpdate> {
        let mut updates = Vec::new();
        while let Some(event) = self.events.try_next() {
            updates.push(self.apply_event(event));
        }
        updates
    }

    /// 阻塞等待下一个事件并应用；超时返回 None
    pub fn wait_event(&mut self, timeout: Duration) -> Option<SessionUpdate> {
        let event = self.events.next_timeout(timeout)?;
        Some(self.apply_event(event))
    }

    /// 丢弃全部评分，报告回到模板原样
    pub fn reset(&mut self) -> Result<(), ScoringError> {
        self.require_idle()?;
        self.report.reset()?;
        self.work_dir.clear()?;
        self.selected_region = None;
        self.current = None;
        Ok(())
    }

    pub fn pdf_renderer(&self) -> WkhtmltopdfRenderer {
        WkhtmltopdfRenderer::new(self.config.wkhtmltopdf_path.clone())
    }

    /// 填入病人信息并导出；`pdf` 为 None 时只写 HTML
    pub fn finalize_report(
        &self,
        details: &PatientDetails,
        output_dir: &Path,
        pdf: Option<&dyn PdfRenderer>,
    ) -> Result<ReportExport, ScoringError> {
        let html = finalize_report(self.report.document(), details, self.report.scores());
        export_report(
            &html,
            output_dir,
            &self.config.report_html_name,
            pdf.map(|renderer| (renderer, self.config.report_pdf_name.as_str())),
        )
    }

    fn require_idle(&self) -> Result<(), ScoringError> {
        match self.in_flight {
            Some(_) => Err(ScoringError::JobInFlight),
            None => Ok(()),
        }
    }

    fn require_idle_region(&self) -> Result<RegionKey, ScoringError> {
        self.require_idle()?;
        self.selected_region.ok_or(ScoringError::NoRegionSelected)
    }

    fn owns(&self, region: Option<RegionKey>) -> bool {
        region.is_some() && region == self.selected_region
    }

    fn dispatch_classification(&mut self, region: RegionKey, asset: VideoAsset) -> JobId {
        let engine = self.engine.clone();
        let job_id = self.pool.dispatch(
            Some(region),
            move || engine.score_video(&asset),
            JobOutcome::Classified,
        );
        self.in_flight = Some(job_id);
        job_id
    }

    /// 把线程池的结果写回会话，只能在交互线程调用
    ///
    /// 预览和裁剪结果只有在仍属于当前分区时才会成为当前视频。
    pub fn apply_event(&mut self, event: JobEvent) -> SessionUpdate {
        let JobEvent {
            job_id,
            region,
            outcome,
        } = event;
        if self.in_flight == Some(job_id) {
            self.in_flight = None;
        } else {
            warn!("Event for job {} arrived while {:?} was in flight", job_id, self.in_flight);
        }

        match outcome {
            JobOutcome::Preview(Ok(frame)) => {
                if self.owns(region) {
                    let asset = VideoAsset::new(frame.source());
                    asset.discover_dimensions(frame.width, frame.height);
                    self.current = Some(asset);
                } else {
                    warn!("Preview {} for {:?} ignored, {:?} is selected", job_id, region, self.selected_region);
                }
                SessionUpdate::PreviewReady { job_id, frame }
            }
            JobOutcome::Cropped(Ok(cropped)) => {
                let output = cropped.path().to_path_buf();
                let crop = cropped.region;
                if !self.owns(region) {
                    warn!("Crop {} for {:?} ignored, {:?} is selected", job_id, region, self.selected_region);
                    return SessionUpdate::Cropped {
                        job_id,
                        output,
                        region: crop,
                        classification_job: None,
                    };
                }
                self.current = Some(cropped.asset.clone());

                let classification_job = match region {
                    Some(region) => Some(self.dispatch_classification(region, cropped.asset)),
                    None => None,
                };
                SessionUpdate::Cropped {
                    job_id,
                    output,
                    region: crop,
                    classification_job,
                }
            }
            JobOutcome::Classified(Ok(score)) => {
                if let Some(key) = region {
                    if let Err(error) = self.report.apply_score(key, score.severity()) {
                        warn!("❌ Score for {} not applied: {}", key, error);
                        return SessionUpdate::Failed { job_id, region, error };
                    }
                    info!("✅ Region {} scored {}", key, score.severity().color());
                }
                SessionUpdate::Scored { job_id, region, score }
            }
            JobOutcome::DirectoryClassified(Ok(mut scores)) => {
                let measured: Vec<_> = scores.regions.measured().collect();
                for (key, severity) in measured {
                    if let Err(error) = self.report.apply_score(key, severity) {
                        warn!("❌ Score for {} not applied: {}", key, error);
                        scores.regions.set(key, self.report.scores().get(key));
                        scores.failures.push(error);
                    }
                }
                SessionUpdate::DirectoryScored { job_id, scores }
            }
            JobOutcome::Preview(Err(error))
            | JobOutcome::Cropped(Err(error))
            | JobOutcome::Classified(Err(error))
            | JobOutcome::DirectoryClassified(Err(error)) => {
                warn!("❌ Job {} failed: {}", job_id, error);
                SessionUpdate::Failed { job_id, region, error }
            }
        }
    }
}
