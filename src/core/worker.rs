//! 后台任务池
//!
//! 解码、推理、转码都在 rayon 线程池里跑，每个任务结束时恰好发送一个 `JobEvent`。
//! 任务内部 panic 会被捕获并变成 `WorkerPanic`，不会跨线程传播。

use log::{debug, error, warn};
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, Sender};

use crate::core::classify::{DirectoryScores, VideoScore};
use crate::core::error::ScoringError;
use crate::core::region::RegionKey;
use crate::core::video::{CroppedVideoAsset, FrameSample};

pub type JobId = u64;

#[derive(Debug)]
pub enum JobOutcome {
    Preview(Result<FrameSample, ScoringError>),
    Cropped(Result<CroppedVideoAsset, ScoringError>),
    Classified(Result<VideoScore, ScoringError>),
    DirectoryClassified(Result<DirectoryScores, ScoringError>),
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        match self {
            JobOutcome::Preview(r) => r.is_ok(),
            JobOutcome::Cropped(r) => r.is_ok(),
            JobOutcome::Classified(r) => r.is_ok(),
            JobOutcome::DirectoryClassified(r) => r.is_ok(),
        }
    }
}

#[derive(Debug)]
pub struct JobEvent {
    pub job_id: JobId,
    pub region: Option<RegionKey>,
    pub outcome: JobOutcome,
}

pub struct WorkerPool {
    pool: ThreadPool,
    sender: Sender<JobEvent>,
    next_id: JobId,
}

impl WorkerPool {
    /// 返回线程池和事件接收端，接收端归交互线程所有
    pub fn new(threads: usize) -> Result<(Self, Receiver<JobEvent>), ScoringError> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads.max(1))
            .thread_name(|i| format!("lung-score-worker-{}", i))
            .build()
            .map_err(|e| ScoringError::Config(format!("worker pool: {}", e)))?;
        let (sender, receiver) = mpsc::channel();
        debug!("Worker pool started with {} thread(s)", pool.current_num_threads());
        Ok((
            Self {
                pool,
                sender,
                next_id: 1,
            },
            receiver,
        ))
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// 提交任务；`wrap` 是对应的 `JobOutcome` 变体
    pub fn dispatch<T, F>(
        &mut self,
        region: Option<RegionKey>,
        job: F,
        wrap: fn(Result<T, ScoringError>) -> JobOutcome,
    ) -> JobId
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, ScoringError> + Send + 'static,
    {
        let job_id = self.next_id;
        self.next_id += 1;
        let sender = self.sender.clone();

        self.pool.spawn(move || {
            let result = catch_unwind(AssertUnwindSafe(job)).unwrap_or_else(|payload| {
                let message = panic_message(payload.as_ref());
                error!("💥 Job {} panicked: {}", job_id, message);
                Err(ScoringError::WorkerPanic(message))
            });
            let event = JobEvent {
                job_id,
                region,
                outcome: wrap(result),
            };
            if sender.send(event).is_err() {
                warn!("Job {} finished after the session closed", job_id);
            }
        });
        debug!("Job {} dispatched (region {:?})", job_id, region);
        job_id
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_one_event_per_job() {
        let (mut pool, events) = WorkerPool::new(2).unwrap();
        let first = pool.dispatch(
            Some(RegionKey::LeftAnteriorApical),
            || Ok(VideoScore { class_index: 2, frames_used: 16 }),
            JobOutcome::Classified,
        );
        let second = pool.dispatch(None, || Ok(DirectoryScores::default()), JobOutcome::DirectoryClassified);
        assert_ne!(first, second);

        let mut received: Vec<JobEvent> = (0..2)
            .map(|_| events.recv_timeout(Duration::from_secs(5)).unwrap())
            .collect();
        received.sort_by_key(|e| e.job_id);

        assert_eq!(received[0].job_id, first);
        assert_eq!(received[0].region, Some(RegionKey::LeftAnteriorApical));
        assert!(matches!(
            received[0].outcome,
            JobOutcome::Classified(Ok(VideoScore { class_index: 2, .. }))
        ));
        assert!(received[1].outcome.is_success());
        assert!(events.recv_timeout(Duration::from_millis(100)).is_err());
    }

    #[test]
    fn test_failure_becomes_event() {
        let (mut pool, events) = WorkerPool::new(1).unwrap();
        pool.dispatch(
            None,
            || -> Result<VideoScore, ScoringError> { Err(ScoringError::media_unavailable("x.avi", "gone")) },
            JobOutcome::Classified,
        );
        let event = events.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(!event.outcome.is_success());
        assert!(matches!(
            event.outcome,
            JobOutcome::Classified(Err(ScoringError::MediaUnavailable { .. }))
        ));
    }

    #[test]
    fn test_panic_becomes_worker_panic() {
        let (mut pool, events) = WorkerPool::new(1).unwrap();
        pool.dispatch(
            Some(RegionKey::RightLateralBasal),
            || -> Result<VideoScore, ScoringError> { panic!("model exploded") },
            JobOutcome::Classified,
        );
        let event = events.recv_timeout(Duration::from_secs(5)).unwrap();
        match event.outcome {
            JobOutcome::Classified(Err(ScoringError::WorkerPanic(message))) => {
                assert!(message.contains("model exploded"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }

        // 线程池在 panic 之后仍然可用
        pool.dispatch(None, || Ok(DirectoryScores::default()), JobOutcome::DirectoryClassified);
        assert!(events.recv_timeout(Duration::from_secs(5)).unwrap().outcome.is_success());
    }
}
