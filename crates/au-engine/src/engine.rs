//! PlayerEngine: output stream ownership and transport state machine
//!
//! Control methods run on ordinary threads. They validate against a
//! shadow parameter copy, then queue the change for the audio callback.
//! Post-chain audio is teed into a second ring drained by a worker
//! thread that runs the analyzer and publishes snapshots through a
//! triple buffer.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use rtrb::{Consumer, Producer, RingBuffer};

use au_audio::{get_default_output_device, AudioConfig, OutputStream};
use au_core::{frame_count, Sample};
use au_dsp::dynamics::{DynamicsParams, DynamicsProcessor};
use au_dsp::eq::{EqSettings, FilterBank, ParametricBand, GRAPHIC_BAND_COUNT};

use crate::analyzer::{AnalysisSnapshot, AnalyzerConfig, SpectrumAnalyzer};
use crate::graph::ProcessingGraph;
use crate::params::{EngineCommand, ParamUpdate, COMMAND_QUEUE_CAPACITY};
use crate::source::PcmSource;
use crate::state::{triple_buffer, TripleBufferReader, TripleBufferWriter};
use crate::{EngineError, EngineResult};

/// Frames per analyzer invocation
const ANALYSIS_BLOCK_FRAMES: usize = 1024;

/// Engine configuration
#[derive(Debug, Clone, Copy, Default)]
pub struct EngineConfig {
    pub audio: AudioConfig,
    pub analyzer: AnalyzerConfig,
}

/// Transport state
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum EngineState {
    Uninitialized,
    Ready,
    Playing,
    Paused,
    Stopped,
    Destroyed,
}

/// Counters and flags shared with the audio and analysis threads
struct SharedFlags {
    position_frames: AtomicU64,
    short_reads: AtomicU64,
    visualizer_enabled: AtomicBool,
    shutdown: AtomicBool,
}

/// Control-side mirror of the DSP parameters.
///
/// Validation happens here, on the same code paths the audio thread
/// runs, so a queued update can never fail over there. Getters read
/// this copy instead of poking at real-time state.
struct ShadowParams {
    filter_bank: FilterBank,
    dynamics: DynamicsProcessor,
    eq_enabled: bool,
    volume: f64,
}

/// Everything owned by the audio callback
struct RealtimeContext {
    source: Box<dyn PcmSource>,
    graph: ProcessingGraph,
    commands: Consumer<EngineCommand>,
    analysis_tx: Producer<Sample>,
    shared: Arc<SharedFlags>,
    playing: bool,
}

impl RealtimeContext {
    /// One callback: drain commands, pull PCM, run the chain, tee the
    /// result to the analyzer ring. No locks, no allocation.
    fn render(&mut self, buffer: &mut [Sample]) {
        while let Ok(cmd) = self.commands.pop() {
            match cmd {
                EngineCommand::Play => self.playing = true,
                EngineCommand::Pause => self.playing = false,
                EngineCommand::Stop => {
                    self.playing = false;
                    self.source.seek(0);
                    self.graph.reset_state();
                    self.shared.position_frames.store(0, Ordering::Release);
                }
                EngineCommand::Seek(frame) => {
                    self.source.seek(frame);
                    self.shared.position_frames.store(frame, Ordering::Release);
                }
                EngineCommand::Param(update) => self.graph.apply_update(update),
            }
        }

        let frames = frame_count(buffer, 2);
        if self.playing {
            let read = self.source.read(buffer);
            if read < frames {
                buffer[read * 2..].fill(0.0);
                self.shared.short_reads.fetch_add(1, Ordering::Relaxed);
            }
            self.shared
                .position_frames
                .fetch_add(read as u64, Ordering::Relaxed);
            self.graph.process(buffer, 2);
        } else {
            buffer.fill(0.0);
        }

        if self.shared.visualizer_enabled.load(Ordering::Relaxed) {
            for &sample in buffer.iter() {
                if self.analysis_tx.push(sample).is_err() {
                    break;
                }
            }
        }
    }
}

/// Real-time playback engine
pub struct PlayerEngine {
    config: EngineConfig,
    state: Mutex<EngineState>,
    stream: Mutex<Option<OutputStream>>,
    commands: Mutex<Option<Producer<EngineCommand>>>,
    shadow: Mutex<ShadowParams>,
    shared: Arc<SharedFlags>,
    snapshots: Mutex<Option<TripleBufferReader<AnalysisSnapshot>>>,
    analysis_thread: Mutex<Option<JoinHandle<()>>>,
}

impl PlayerEngine {
    pub fn new(config: EngineConfig) -> Self {
        let sample_rate = config.audio.sample_rate.as_f64();
        Self {
            config,
            state: Mutex::new(EngineState::Uninitialized),
            stream: Mutex::new(None),
            commands: Mutex::new(None),
            shadow: Mutex::new(ShadowParams {
                filter_bank: FilterBank::new(sample_rate),
                dynamics: DynamicsProcessor::new(),
                eq_enabled: true,
                volume: 1.0,
            }),
            shared: Arc::new(SharedFlags {
                position_frames: AtomicU64::new(0),
                short_reads: AtomicU64::new(0),
                visualizer_enabled: AtomicBool::new(true),
                shutdown: AtomicBool::new(false),
            }),
            snapshots: Mutex::new(None),
            analysis_thread: Mutex::new(None),
        }
    }

    /// Open the default output device and wire up the callback.
    ///
    /// On device failure the engine stays Uninitialized and can be
    /// initialized again. A no-op once the engine is Ready.
    pub fn initialize(&self, source: Box<dyn PcmSource>) -> EngineResult<()> {
        let mut state = self.state.lock();
        match *state {
            EngineState::Uninitialized => {}
            EngineState::Destroyed => return Err(EngineError::Destroyed),
            _ => return Ok(()),
        }

        let (cmd_tx, cmd_rx) = RingBuffer::<EngineCommand>::new(COMMAND_QUEUE_CAPACITY);
        // Half a second of stereo audio between callback and analyzer.
        let analysis_capacity = self.config.audio.sample_rate.as_u32() as usize;
        let (analysis_tx, analysis_rx) = RingBuffer::<Sample>::new(analysis_capacity);

        let mut graph = ProcessingGraph::new(self.config.audio.sample_rate.as_f64());
        {
            // Carry over settings made before initialization.
            let shadow = self.shadow.lock();
            let _ = graph
                .filter_bank_mut()
                .apply_settings(&shadow.filter_bank.settings());
            let params = shadow.dynamics.params();
            graph.apply_update(ParamUpdate::Preamp(params.preamp_gain));
            graph.apply_update(ParamUpdate::LimiterThreshold(params.limiter_threshold));
            graph.apply_update(ParamUpdate::LimiterRatio(params.limiter_ratio));
            graph.apply_update(ParamUpdate::EqEnabled(shadow.eq_enabled));
            graph.apply_update(ParamUpdate::Volume(shadow.volume));
        }

        let mut ctx = RealtimeContext {
            source,
            graph,
            commands: cmd_rx,
            analysis_tx,
            shared: Arc::clone(&self.shared),
            playing: false,
        };

        let device = get_default_output_device()?;
        let stream = OutputStream::new(
            &device,
            self.config.audio,
            Box::new(move |buffer| ctx.render(buffer)),
        )?;

        let (writer, reader) = triple_buffer(AnalysisSnapshot::empty(&self.config.analyzer));
        let analyzer = SpectrumAnalyzer::new(self.config.analyzer);
        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name("au-analysis".into())
            .spawn(move || analysis_worker(analysis_rx, analyzer, writer, shared))
            .map_err(|e| EngineError::Device(au_audio::AudioError::BackendError(e.to_string())))?;

        *self.stream.lock() = Some(stream);
        *self.commands.lock() = Some(cmd_tx);
        *self.snapshots.lock() = Some(reader);
        *self.analysis_thread.lock() = Some(handle);
        *state = EngineState::Ready;
        log::info!(
            "Engine initialized: {} Hz, buffer {}",
            self.config.audio.sample_rate.as_u32(),
            self.config.audio.buffer_size.as_usize()
        );
        Ok(())
    }

    pub fn state(&self) -> EngineState {
        *self.state.lock()
    }

    /// Start or resume playback
    pub fn play(&self) -> EngineResult<()> {
        let mut state = self.state.lock();
        self.check_initialized(*state)?;
        if *state == EngineState::Playing {
            return Ok(());
        }
        if let Some(stream) = self.stream.lock().as_ref() {
            stream.start()?;
        }
        self.push_command(EngineCommand::Play)?;
        *state = EngineState::Playing;
        Ok(())
    }

    /// Pause playback; the stream keeps running and emits silence
    pub fn pause(&self) -> EngineResult<()> {
        let mut state = self.state.lock();
        self.check_initialized(*state)?;
        if *state != EngineState::Playing {
            return Ok(());
        }
        self.push_command(EngineCommand::Pause)?;
        *state = EngineState::Paused;
        Ok(())
    }

    /// Stop playback, rewind and clear filter state
    pub fn stop(&self) -> EngineResult<()> {
        let mut state = self.state.lock();
        self.check_initialized(*state)?;
        self.push_command(EngineCommand::Stop)?;
        if let Some(stream) = self.stream.lock().as_ref() {
            stream.stop()?;
        }
        *state = EngineState::Stopped;
        Ok(())
    }

    /// Jump to an absolute position in seconds
    pub fn seek(&self, seconds: f64) -> EngineResult<()> {
        let state = self.state.lock();
        self.check_initialized(*state)?;
        let frame = (seconds.max(0.0) * self.config.audio.sample_rate.as_f64()) as u64;
        self.push_command(EngineCommand::Seek(frame))
    }

    /// Playback position in seconds
    pub fn position_seconds(&self) -> f64 {
        self.shared.position_frames.load(Ordering::Acquire) as f64
            / self.config.audio.sample_rate.as_f64()
    }

    /// Tear down the stream and analysis thread. Terminal.
    pub fn destroy(&self) {
        let mut state = self.state.lock();
        if *state == EngineState::Destroyed {
            return;
        }
        self.shared.shutdown.store(true, Ordering::Release);
        if let Some(stream) = self.stream.lock().take() {
            let _ = stream.stop();
        }
        *self.commands.lock() = None;
        *self.snapshots.lock() = None;
        if let Some(handle) = self.analysis_thread.lock().take() {
            let _ = handle.join();
        }
        *state = EngineState::Destroyed;
        log::info!("Engine destroyed");
    }

    // EQ control

    pub fn set_eq_enabled(&self, enabled: bool) -> EngineResult<()> {
        self.check_initialized(self.state())?;
        self.shadow.lock().eq_enabled = enabled;
        self.push_command(EngineCommand::Param(ParamUpdate::EqEnabled(enabled)))
    }

    pub fn eq_enabled(&self) -> bool {
        self.shadow.lock().eq_enabled
    }

    pub fn set_band_gain(&self, index: usize, gain_db: f64) -> EngineResult<()> {
        self.check_initialized(self.state())?;
        self.shadow.lock().filter_bank.set_band_gain(index, gain_db)?;
        self.push_command(EngineCommand::Param(ParamUpdate::GraphicBandGain {
            index,
            gain_db,
        }))
    }

    pub fn set_band_gains(&self, gains_db: [f64; GRAPHIC_BAND_COUNT]) -> EngineResult<()> {
        self.check_initialized(self.state())?;
        self.shadow.lock().filter_bank.set_band_gains(gains_db);
        self.push_command(EngineCommand::Param(ParamUpdate::GraphicBandGains(gains_db)))
    }

    pub fn band_gains(&self) -> [f64; GRAPHIC_BAND_COUNT] {
        self.shadow.lock().filter_bank.band_gains()
    }

    pub fn set_parametric_band(&self, id: u64, band: ParametricBand) -> EngineResult<()> {
        self.check_initialized(self.state())?;
        self.shadow.lock().filter_bank.set_parametric(id, band)?;
        self.push_command(EngineCommand::Param(ParamUpdate::SetParametricBand {
            id,
            band,
        }))
    }

    pub fn remove_parametric_band(&self, id: u64) -> EngineResult<()> {
        self.check_initialized(self.state())?;
        self.shadow.lock().filter_bank.remove_parametric(id);
        self.push_command(EngineCommand::Param(ParamUpdate::RemoveParametricBand { id }))
    }

    pub fn clear_parametric_bands(&self) -> EngineResult<()> {
        self.check_initialized(self.state())?;
        self.shadow.lock().filter_bank.clear_parametric();
        self.push_command(EngineCommand::Param(ParamUpdate::ClearParametric))
    }

    pub fn reset_eq(&self) -> EngineResult<()> {
        self.check_initialized(self.state())?;
        self.shadow.lock().filter_bank.reset();
        self.push_command(EngineCommand::Param(ParamUpdate::ResetEq))
    }

    pub fn eq_settings(&self) -> EqSettings {
        self.shadow.lock().filter_bank.settings()
    }

    // Dynamics and volume

    pub fn set_preamp(&self, gain: f64) -> EngineResult<()> {
        self.check_initialized(self.state())?;
        self.shadow.lock().dynamics.set_preamp(gain);
        self.push_command(EngineCommand::Param(ParamUpdate::Preamp(gain)))
    }

    pub fn set_limiter_threshold(&self, threshold: f64) -> EngineResult<()> {
        self.check_initialized(self.state())?;
        self.shadow.lock().dynamics.set_limiter_threshold(threshold);
        self.push_command(EngineCommand::Param(ParamUpdate::LimiterThreshold(threshold)))
    }

    pub fn set_limiter_ratio(&self, ratio: f64) -> EngineResult<()> {
        self.check_initialized(self.state())?;
        self.shadow.lock().dynamics.set_limiter_ratio(ratio);
        self.push_command(EngineCommand::Param(ParamUpdate::LimiterRatio(ratio)))
    }

    pub fn dynamics_params(&self) -> DynamicsParams {
        self.shadow.lock().dynamics.params()
    }

    pub fn set_volume(&self, volume: f64) -> EngineResult<()> {
        self.check_initialized(self.state())?;
        let volume = volume.clamp(0.0, 1.0);
        self.shadow.lock().volume = volume;
        self.push_command(EngineCommand::Param(ParamUpdate::Volume(volume)))
    }

    pub fn volume(&self) -> f64 {
        self.shadow.lock().volume
    }

    // Analyzer

    pub fn set_visualizer_enabled(&self, enabled: bool) {
        self.shared.visualizer_enabled.store(enabled, Ordering::Release);
    }

    pub fn visualizer_enabled(&self) -> bool {
        self.shared.visualizer_enabled.load(Ordering::Acquire)
    }

    /// Latest complete analysis snapshot, or None before initialization
    pub fn snapshot(&self) -> Option<AnalysisSnapshot> {
        self.snapshots.lock().as_mut().map(|r| r.read().clone())
    }

    /// Callbacks where the source delivered fewer frames than needed
    pub fn short_read_count(&self) -> u64 {
        self.shared.short_reads.load(Ordering::Relaxed)
    }

    fn check_initialized(&self, state: EngineState) -> EngineResult<()> {
        match state {
            EngineState::Uninitialized => Err(EngineError::NotInitialized),
            EngineState::Destroyed => Err(EngineError::Destroyed),
            _ => Ok(()),
        }
    }

    fn push_command(&self, cmd: EngineCommand) -> EngineResult<()> {
        let mut guard = self.commands.lock();
        let producer = guard.as_mut().ok_or(EngineError::NotInitialized)?;
        producer.push(cmd).map_err(|_| {
            log::warn!("Control queue full, dropping {cmd:?}");
            EngineError::ControlQueueFull
        })
    }
}

impl Drop for PlayerEngine {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Drains the analysis ring in fixed blocks, runs the analyzer and
/// publishes each resulting snapshot.
fn analysis_worker(
    mut rx: Consumer<Sample>,
    mut analyzer: SpectrumAnalyzer,
    mut writer: TripleBufferWriter<AnalysisSnapshot>,
    shared: Arc<SharedFlags>,
) {
    let mut block = vec![0.0_f64; ANALYSIS_BLOCK_FRAMES * 2];
    let mut filled = 0usize;
    while !shared.shutdown.load(Ordering::Acquire) {
        let mut progressed = false;
        while filled < block.len() {
            match rx.pop() {
                Ok(sample) => {
                    block[filled] = sample;
                    filled += 1;
                    progressed = true;
                }
                Err(_) => break,
            }
        }
        if filled == block.len() {
            analyzer.analyze(&block, 2);
            writer.input_buffer().clone_from(analyzer.snapshot());
            writer.publish();
            filled = 0;
        } else if !progressed {
            thread::sleep(Duration::from_millis(2));
        }
    }
}
