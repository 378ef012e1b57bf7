use std::sync::Arc;
use std::time::Duration;

use crate::config::AnalysisSettings;
use crate::error::{AnalysisError, Result};
use crate::scheduler::{thread_name, Scheduler};

use super::features::{AnalysisResult, FeatureChannels, Note, RawSignal};
use super::filter::apply_channels;
use super::note::extract;
use super::segment::{flatten, segment, FlattenedWave, SegmentedSignal};

/// State handed from one pipeline stage to the next.
struct PipelineContext {
    signal: Arc<RawSignal>,
    settings: AnalysisSettings,
    segmented: Option<SegmentedSignal>,
    waves: Option<Vec<FlattenedWave>>,
    notes: Option<Vec<Note>>,
    channels: Option<FeatureChannels>,
}

impl PipelineContext {
    fn new(signal: Arc<RawSignal>, settings: AnalysisSettings) -> Self {
        Self {
            signal,
            settings,
            segmented: None,
            waves: None,
            notes: None,
            channels: None,
        }
    }

    fn into_result(self, clip: String) -> Result<AnalysisResult> {
        Ok(AnalysisResult {
            clip,
            info: self.signal.info().clone(),
            channels: self
                .channels
                .ok_or(AnalysisError::StageOrder("run ended before filtering"))?,
            segmented: self
                .segmented
                .ok_or(AnalysisError::StageOrder("run ended before segmenting"))?,
            waves: self
                .waves
                .ok_or(AnalysisError::StageOrder("run ended before flattening"))?,
            notes: self
                .notes
                .ok_or(AnalysisError::StageOrder("run ended before extraction"))?,
        })
    }
}

fn queue_stages(scheduler: &mut Scheduler<PipelineContext>) {
    scheduler.queue("segment", |ctx| {
        let info = ctx.signal.info();
        log::info!(
            "Pass 1: Segmenting {} samples (depth={}, lowest_heard_frequency={})...",
            info.total_samples,
            ctx.settings.sample_depth(),
            ctx.settings.lowest_heard_frequency()
        );
        ctx.segmented = Some(segment(
            ctx.signal.samples(),
            info.total_samples,
            ctx.settings.lowest_heard_frequency(),
            ctx.settings.sample_depth(),
        )?);
        Ok(())
    });

    scheduler.queue("flatten", |ctx| {
        let segmented = ctx
            .segmented
            .as_ref()
            .ok_or(AnalysisError::StageOrder("flatten ran before segment"))?;
        log::info!("Pass 2: Flattening {} waves...", segmented.waves.len());
        ctx.waves = Some(flatten(segmented)?);
        Ok(())
    });

    scheduler.queue("extract", |ctx| {
        let waves = ctx
            .waves
            .as_ref()
            .ok_or(AnalysisError::StageOrder("extract ran before flatten"))?;
        log::info!("Pass 3: Building notes...");
        ctx.notes = Some(extract(
            waves,
            ctx.settings.sample_depth(),
            ctx.settings.lowest_heard_frequency(),
            ctx.signal.info().peak,
        )?);
        Ok(())
    });

    scheduler.queue("filter", |ctx| {
        let notes = ctx
            .notes
            .as_ref()
            .ok_or(AnalysisError::StageOrder("filter ran before extract"))?;
        log::info!("Pass 4: Filtering channels...");
        ctx.channels = Some(apply_channels(notes, ctx.settings.filters()));
        Ok(())
    });
}

fn run(clip: String, signal: Arc<RawSignal>, settings: AnalysisSettings) -> Result<AnalysisResult> {
    let info = signal.info();
    log::info!(
        "Analysing '{}': {} samples, {}Hz, {} channel(s), {:.1}s",
        clip,
        info.total_samples,
        info.sample_rate,
        info.channels,
        info.duration
    );

    let mut scheduler = Scheduler::new(clip.clone()).with_timeout(settings.timeout());
    queue_stages(&mut scheduler);

    let name = clip.clone();
    scheduler.on_completed(move |summary| {
        log::info!(
            "Finished analysing '{}' ({} tasks in {:.2?})",
            name,
            summary.completed,
            summary.elapsed
        );
    });

    let (context, _) = scheduler.run_all(PipelineContext::new(signal, settings))?;
    context.into_result(clip)
}

/// Pending result of one analysis run.
pub struct AnalysisHandle {
    clip: String,
    rx: flume::Receiver<Result<AnalysisResult>>,
}

impl AnalysisHandle {
    pub fn clip(&self) -> &str {
        &self.clip
    }

    pub fn is_finished(&self) -> bool {
        !self.rx.is_empty() || self.rx.is_disconnected()
    }

    /// Block until the run ends.
    pub fn wait(self) -> Result<AnalysisResult> {
        self.rx.recv().map_err(|_| run_vanished(&self.clip))?
    }

    /// Block for at most `timeout`. `None` means the run is still going.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Result<AnalysisResult>> {
        match self.rx.recv_timeout(timeout) {
            Ok(result) => Some(result),
            Err(flume::RecvTimeoutError::Timeout) => None,
            Err(flume::RecvTimeoutError::Disconnected) => Some(Err(run_vanished(&self.clip))),
        }
    }
}

fn run_vanished(clip: &str) -> AnalysisError {
    AnalysisError::TaskFailed {
        task: clip.to_string(),
        reason: "analysis thread exited without a result".into(),
    }
}

/// Entry point: one scheduler per run, so clips never share pipeline state.
#[derive(Clone, Debug, Default)]
pub struct Analyser {
    settings: AnalysisSettings,
}

impl Analyser {
    pub fn new(settings: AnalysisSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &AnalysisSettings {
        &self.settings
    }

    /// Start analysing on a background thread.
    pub fn analyse(&self, clip: impl Into<String>, signal: Arc<RawSignal>) -> AnalysisHandle {
        let clip = clip.into();
        let settings = self.settings.clone();
        let (tx, rx) = flume::bounded(1);

        let name = clip.clone();
        let worker_tx = tx.clone();
        let spawned = std::thread::Builder::new()
            .name(thread_name(&format!("analysis-{}", clip)))
            .spawn(move || {
                let _ = worker_tx.send(run(name, signal, settings));
            });

        if let Err(e) = spawned {
            let _ = tx.send(Err(AnalysisError::TaskFailed {
                task: clip.clone(),
                reason: format!("failed to spawn analysis thread: {}", e),
            }));
        }

        AnalysisHandle { clip, rx }
    }

    pub fn analyse_blocking(
        &self,
        clip: impl Into<String>,
        signal: Arc<RawSignal>,
    ) -> Result<AnalysisResult> {
        run(clip.into(), signal, self.settings.clone())
    }

    /// Analyse several clips concurrently, results in input order.
    pub fn analyse_many(&self, clips: Vec<(String, Arc<RawSignal>)>) -> Vec<Result<AnalysisResult>> {
        let handles: Vec<AnalysisHandle> = clips
            .into_iter()
            .map(|(clip, signal)| self.analyse(clip, signal))
            .collect();
        handles.into_iter().map(AnalysisHandle::wait).collect()
    }
}
