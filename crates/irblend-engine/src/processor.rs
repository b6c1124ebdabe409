//! Dual-path IR blending processor
//!
//! Two convolution paths run side by side and are crossfaded by a single
//! blend control in [-1, 1]. In dynamic mode the blend follows the input
//! (or sidechain) level through a soft-knee curve and an attack/release
//! smoother. Paths with different latencies are aligned with delay lines;
//! a single active path is mixed against the dry input delayed to match.
//!
//! Everything under `process_*` is allocation free. Loading, clearing and
//! sample-rate changes run on the control path.

use std::path::Path;

use irblend_core::{
    BLEND, Decibels, DetectionMode, IrSlot, LoadResult, OUTPUT_GAIN_DB, SILENCE_FLOOR_DB, Sample,
    apply_gain, mix_into,
};
use irblend_dsp::{
    BlendCurve, BlendGains, ConvolutionEngine, DelayLine, EnvelopeSmoother, LevelDetector,
    PartitionedConvolver, Processor, ProcessorConfig,
};

use crate::config::{MAX_SAMPLE_RATE, MIN_SAMPLE_RATE};
use crate::{BlendSettings, ConvolutionPath, EngineConfig, PreparedPath};

/// Dual-IR convolution blender
pub struct DualPathProcessor<E: ConvolutionEngine = PartitionedConvolver> {
    config: EngineConfig,
    sample_rate: f64,
    paths: [ConvolutionPath<E>; 2],

    // Blend
    blend: f64,
    current_blend: f64,
    curve: BlendCurve,
    detection_mode: DetectionMode,
    smoother: EnvelopeSmoother,
    detector: LevelDetector,
    dynamic_mode: bool,
    sidechain_enabled: bool,
    input_level_db: f64,

    // Output
    output_gain_db: f64,
    output_gain: f64,

    // Latency alignment, one line per channel
    dry_delay: [DelayLine; 2],
    path_delay: [DelayLine; 2],
    max_latency: usize,
    was_active: [bool; 2],

    // Per-chunk scratch, max_block_size each
    scratch_a: [Vec<Sample>; 2],
    scratch_b: [Vec<Sample>; 2],
    scratch_dry: [Vec<Sample>; 2],
}

impl DualPathProcessor<PartitionedConvolver> {
    /// Processor with the built-in partitioned convolver on both paths
    pub fn new(config: EngineConfig) -> Self {
        let config = config.validated();
        let engine = || PartitionedConvolver::new(config.partition_size, config.max_block_size);
        Self::with_engines(config, engine(), engine())
    }
}

impl Default for DualPathProcessor<PartitionedConvolver> {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl<E: ConvolutionEngine> DualPathProcessor<E> {
    /// Processor driving caller-supplied engines for IR A and IR B
    pub fn with_engines(config: EngineConfig, engine_a: E, engine_b: E) -> Self {
        let config = config.validated();
        let sample_rate = config.sample_rate;
        let block = config.max_block_size;

        let mut smoother = EnvelopeSmoother::new(sample_rate);
        smoother.set_value(BLEND.default);

        log::debug!(
            "DualPathProcessor: {} Hz, max block {}, partition {}",
            sample_rate,
            block,
            config.partition_size
        );

        Self {
            paths: [
                ConvolutionPath::new(IrSlot::A, engine_a, &config),
                ConvolutionPath::new(IrSlot::B, engine_b, &config),
            ],
            blend: BLEND.default,
            current_blend: BLEND.default,
            curve: BlendCurve::default(),
            detection_mode: DetectionMode::default(),
            smoother,
            detector: LevelDetector::new(sample_rate, config.rms_window_ms),
            dynamic_mode: false,
            sidechain_enabled: false,
            input_level_db: SILENCE_FLOOR_DB,
            output_gain_db: OUTPUT_GAIN_DB.default,
            output_gain: 1.0,
            dry_delay: [DelayLine::new(block), DelayLine::new(block)],
            path_delay: [DelayLine::new(block), DelayLine::new(block)],
            max_latency: 0,
            was_active: [false; 2],
            scratch_a: [vec![0.0; block], vec![0.0; block]],
            scratch_b: [vec![0.0; block], vec![0.0; block]],
            scratch_dry: [vec![0.0; block], vec![0.0; block]],
            config,
            sample_rate,
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // IMPULSE RESPONSES (control path)
    // ═══════════════════════════════════════════════════════════════════════════

    /// Load an IR file into a slot
    ///
    /// On failure the slot keeps whatever it held before: an empty slot
    /// stays empty, a loaded slot keeps processing its previous IR.
    pub fn load_impulse_response<P: AsRef<Path>>(&mut self, slot: IrSlot, path: P) -> LoadResult<()> {
        let path = path.as_ref();
        let result = self.paths[slot.index()].load(path, self.sample_rate, &self.config);
        self.finish_load(slot, path, result)
    }

    /// Load already-decoded IR channels into a slot
    pub fn load_impulse_samples(
        &mut self,
        slot: IrSlot,
        channels: Vec<Vec<Sample>>,
        native_rate: u32,
    ) -> LoadResult<()> {
        let name = Path::new("<memory>");
        let result = self.paths[slot.index()].load_samples(
            channels,
            native_rate,
            name,
            self.sample_rate,
            &self.config,
        );
        self.finish_load(slot, name, result)
    }

    fn finish_load(&mut self, slot: IrSlot, path: &Path, result: LoadResult<()>) -> LoadResult<()> {
        match result {
            Ok(()) => {
                log::info!(
                    "{} loaded from {} (latency {} samples)",
                    slot,
                    path.display(),
                    self.paths[slot.index()].latency()
                );
                self.update_latency();
                Ok(())
            }
            Err(e) => {
                log::warn!("{} load failed for {}: {}", slot, path.display(), e);
                Err(e)
            }
        }
    }

    /// Install a slot prepared by a `BackgroundLoader`
    ///
    /// A slot prepared for a different sample rate is re-derived here.
    pub fn install_prepared(&mut self, prepared: PreparedPath<E>) {
        let slot = prepared.slot;
        let prepared_rate = prepared.sample_rate;
        let path = &mut self.paths[slot.index()];
        path.install(prepared);
        log::info!("{} installed from background load", slot);
        if prepared_rate != self.sample_rate {
            if let Err(e) = path.reinitialize(self.sample_rate) {
                log::warn!("{} could not be rebuilt at {} Hz: {}", slot, self.sample_rate, e);
            }
        }
        self.update_latency();
    }

    /// Unload a slot
    pub fn clear_impulse_response(&mut self, slot: IrSlot) {
        self.paths[slot.index()].clear();
        log::debug!("{} cleared", slot);
        self.update_latency();
    }

    /// Resize alignment buffers for the current path latencies
    fn update_latency(&mut self) {
        let max_latency = self.latency_samples();
        if max_latency != self.max_latency {
            let len = max_latency + self.config.max_block_size;
            for line in self.dry_delay.iter_mut().chain(self.path_delay.iter_mut()) {
                line.resize(len);
            }
            log::debug!("Delay lines resized to {} samples (max latency {})", len, max_latency);
            self.max_latency = max_latency;
        } else {
            for line in self.dry_delay.iter_mut().chain(self.path_delay.iter_mut()) {
                line.clear();
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // PROCESSING (audio thread)
    // ═══════════════════════════════════════════════════════════════════════════

    /// Process a mono block
    pub fn process_mono(&mut self, input: &[Sample], output: &mut [Sample]) {
        self.process_channels(&[input], &[input], false, &mut [output]);
    }

    /// Process a mono block, detecting level on `sidechain`
    pub fn process_mono_with_sidechain(
        &mut self,
        input: &[Sample],
        sidechain: &[Sample],
        output: &mut [Sample],
    ) {
        self.process_channels(&[input], &[sidechain], true, &mut [output]);
    }

    /// Process a stereo block
    pub fn process_stereo(
        &mut self,
        input_l: &[Sample],
        input_r: &[Sample],
        output_l: &mut [Sample],
        output_r: &mut [Sample],
    ) {
        self.process_channels(
            &[input_l, input_r],
            &[input_l, input_r],
            false,
            &mut [output_l, output_r],
        );
    }

    /// Process a stereo block, detecting level on the sidechain pair
    pub fn process_stereo_with_sidechain(
        &mut self,
        input_l: &[Sample],
        input_r: &[Sample],
        sidechain_l: &[Sample],
        sidechain_r: &[Sample],
        output_l: &mut [Sample],
        output_r: &mut [Sample],
    ) {
        self.process_channels(
            &[input_l, input_r],
            &[sidechain_l, sidechain_r],
            true,
            &mut [output_l, output_r],
        );
    }

    /// Two independent mono signals (same as stereo: IR channels stay separate)
    pub fn process_dual_mono(
        &mut self,
        input_l: &[Sample],
        input_r: &[Sample],
        output_l: &mut [Sample],
        output_r: &mut [Sample],
    ) {
        self.process_stereo(input_l, input_r, output_l, output_r);
    }

    pub fn process_dual_mono_with_sidechain(
        &mut self,
        input_l: &[Sample],
        input_r: &[Sample],
        sidechain_l: &[Sample],
        sidechain_r: &[Sample],
        output_l: &mut [Sample],
        output_r: &mut [Sample],
    ) {
        self.process_stereo_with_sidechain(
            input_l,
            input_r,
            sidechain_l,
            sidechain_r,
            output_l,
            output_r,
        );
    }

    fn process_channels(
        &mut self,
        inputs: &[&[Sample]],
        detection: &[&[Sample]],
        sidechain_call: bool,
        outputs: &mut [&mut [Sample]],
    ) {
        debug_assert_eq!(inputs.len(), outputs.len());
        let frames = inputs
            .iter()
            .map(|ch| ch.len())
            .chain(outputs.iter().map(|ch| ch.len()))
            .min()
            .unwrap_or(0);
        if frames == 0 {
            return;
        }

        let active = [self.paths[0].is_active(), self.paths[1].is_active()];

        if !active[0] && !active[1] {
            for (output, input) in outputs.iter_mut().zip(inputs) {
                output[..frames].copy_from_slice(&input[..frames]);
            }
            self.was_active = active;
            self.apply_output_gain(outputs, frames);
            return;
        }

        if active != self.was_active {
            self.on_active_change(active);
        }

        self.update_blend(detection, sidechain_call, frames);
        let gains = BlendGains::for_paths(self.current_blend, active[0], active[1]);

        let chunk = self.config.max_block_size;
        let mut offset = 0;
        while offset < frames {
            let n = (frames - offset).min(chunk);
            self.process_chunk(inputs, outputs, offset, n, active, gains);
            offset += n;
        }

        self.apply_output_gain(outputs, frames);
    }

    /// Start newly active engines and alignment lines from silence
    fn on_active_change(&mut self, active: [bool; 2]) {
        for (path, (&now, &before)) in self.paths.iter_mut().zip(active.iter().zip(&self.was_active)) {
            if now && !before {
                path.engine_mut().reset();
            }
        }
        for line in self.dry_delay.iter_mut().chain(self.path_delay.iter_mut()) {
            line.clear();
        }
        self.was_active = active;
    }

    /// Resolve the blend for this call
    fn update_blend(&mut self, detection: &[&[Sample]], sidechain_call: bool, frames: usize) {
        if !self.dynamic_mode {
            self.current_blend = self.blend;
            return;
        }

        // Only the call type matching the sidechain setting drives detection
        if sidechain_call != self.sidechain_enabled {
            self.current_blend = self.smoother.value();
            return;
        }

        let level = match detection {
            [mono] => self.detector.detect(self.detection_mode, mono),
            [left, right, ..] => self.detector.detect_stereo(self.detection_mode, left, right),
            [] => SILENCE_FLOOR_DB,
        };
        self.input_level_db = level;

        let target = self.curve.compute(level);
        self.current_blend = self.smoother.process_block(target, frames);
    }

    fn process_chunk(
        &mut self,
        inputs: &[&[Sample]],
        outputs: &mut [&mut [Sample]],
        offset: usize,
        n: usize,
        active: [bool; 2],
        gains: BlendGains,
    ) {
        let num_channels = inputs.len().min(2);
        let range = offset..offset + n;

        let mut chunk: [&[Sample]; 2] = [&[], &[]];
        for (dst, input) in chunk.iter_mut().zip(inputs) {
            *dst = &input[range.clone()];
        }
        let chunk = &chunk[..num_channels];

        for (line, input) in self.dry_delay.iter_mut().zip(chunk) {
            line.write(input);
        }

        for (path, &on) in self.paths.iter_mut().zip(&active) {
            if on {
                path.engine_mut().add(chunk);
            }
        }

        let underrun = self.paths.iter().zip(&active).any(|(path, &on)| {
            on && (path.engine().available(n) < n
                || (0..num_channels).any(|ch| path.engine().get(ch).len() < n))
        });
        if underrun {
            for output in outputs.iter_mut().take(num_channels) {
                output[range.clone()].fill(0.0);
            }
            return;
        }

        let latency_a = self.paths[0].latency();
        let latency_b = self.paths[1].latency();

        for ch in 0..num_channels {
            let a = &mut self.scratch_a[ch][..n];
            let b = &mut self.scratch_b[ch][..n];
            let dry = &mut self.scratch_dry[ch][..n];

            if active[0] {
                a.copy_from_slice(&self.paths[0].engine().get(ch)[..n]);
            }
            if active[1] {
                b.copy_from_slice(&self.paths[1].engine().get(ch)[..n]);
            }

            match active {
                [true, true] => {
                    // Hold back the faster path
                    if latency_a > latency_b {
                        self.path_delay[ch].process_block(b, latency_a - latency_b);
                    } else if latency_b > latency_a {
                        self.path_delay[ch].process_block(a, latency_b - latency_a);
                    }
                }
                [true, false] => self.dry_delay[ch].read_delayed(dry, latency_a),
                [false, true] => self.dry_delay[ch].read_delayed(dry, latency_b),
                [false, false] => {}
            }

            let output = &mut outputs[ch][range.clone()];
            output.fill(0.0);
            if active[0] {
                mix_into(output, a, gains.a);
            }
            if active[1] {
                mix_into(output, b, gains.b);
            }
            if active[0] != active[1] {
                mix_into(output, dry, gains.dry);
            }
        }

        for (path, &on) in self.paths.iter_mut().zip(&active) {
            if on {
                path.engine_mut().advance(n);
            }
        }
    }

    #[inline]
    fn apply_output_gain(&self, outputs: &mut [&mut [Sample]], frames: usize) {
        if self.output_gain == 1.0 {
            return;
        }
        for output in outputs.iter_mut() {
            apply_gain(&mut output[..frames], self.output_gain);
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // PARAMETERS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Static blend, -1 (all A) to +1 (all B)
    pub fn set_blend(&mut self, blend: f64) {
        self.blend = BLEND.clamp(blend);
        if !self.dynamic_mode {
            self.current_blend = self.blend;
            self.smoother.set_value(self.blend);
        }
    }

    pub fn set_low_blend(&mut self, blend: f64) {
        self.curve.set_low_blend(blend);
    }

    pub fn set_high_blend(&mut self, blend: f64) {
        self.curve.set_high_blend(blend);
    }

    pub fn set_threshold(&mut self, db: f64) {
        self.curve.set_threshold(db);
    }

    pub fn set_range(&mut self, db: f64) {
        self.curve.set_range(db);
    }

    pub fn set_knee_width(&mut self, db: f64) {
        self.curve.set_knee_width(db);
    }

    pub fn set_detection_mode(&mut self, mode: DetectionMode) {
        self.detection_mode = mode;
    }

    pub fn set_attack_time(&mut self, ms: f64) {
        self.smoother.set_attack(ms);
    }

    pub fn set_release_time(&mut self, ms: f64) {
        self.smoother.set_release(ms);
    }

    /// Output gain in dB, clamped to [-24, 24]
    pub fn set_output_gain(&mut self, db: f64) {
        self.output_gain_db = OUTPUT_GAIN_DB.clamp(db);
        self.output_gain = Decibels(self.output_gain_db).to_gain();
    }

    /// Leaving dynamic mode snaps the blend back to the static value
    pub fn set_dynamic_mode_enabled(&mut self, enabled: bool) {
        self.dynamic_mode = enabled;
        if !enabled {
            self.current_blend = self.blend;
            self.smoother.set_value(self.blend);
        }
    }

    pub fn set_sidechain_enabled(&mut self, enabled: bool) {
        self.sidechain_enabled = enabled;
    }

    pub fn set_ir_enabled(&mut self, slot: IrSlot, enabled: bool) {
        self.paths[slot.index()].set_enabled(enabled);
    }

    /// Snapshot of every host-facing parameter
    pub fn settings(&self) -> BlendSettings {
        BlendSettings {
            blend: self.blend,
            low_blend: self.curve.low_blend(),
            high_blend: self.curve.high_blend(),
            threshold_db: self.curve.threshold_db(),
            range_db: self.curve.range_db(),
            knee_width_db: self.curve.knee_width_db(),
            detection_mode: self.detection_mode,
            attack_ms: self.smoother.attack_ms(),
            release_ms: self.smoother.release_ms(),
            output_gain_db: self.output_gain_db,
            ir_a_enabled: self.paths[0].is_enabled(),
            ir_b_enabled: self.paths[1].is_enabled(),
            dynamic_mode: self.dynamic_mode,
            sidechain: self.sidechain_enabled,
        }
    }

    /// Apply a snapshot through the regular (clamping) setters
    pub fn apply_settings(&mut self, settings: &BlendSettings) {
        self.set_low_blend(settings.low_blend);
        self.set_high_blend(settings.high_blend);
        self.set_threshold(settings.threshold_db);
        self.set_range(settings.range_db);
        self.set_knee_width(settings.knee_width_db);
        self.set_detection_mode(settings.detection_mode);
        self.set_attack_time(settings.attack_ms);
        self.set_release_time(settings.release_ms);
        self.set_output_gain(settings.output_gain_db);
        self.set_ir_enabled(IrSlot::A, settings.ir_a_enabled);
        self.set_ir_enabled(IrSlot::B, settings.ir_b_enabled);
        self.set_sidechain_enabled(settings.sidechain);
        self.set_dynamic_mode_enabled(settings.dynamic_mode);
        self.set_blend(settings.blend);
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // GETTERS
    // ═══════════════════════════════════════════════════════════════════════════

    pub fn blend(&self) -> f64 {
        self.blend
    }

    /// Blend used by the most recent block
    pub fn current_blend(&self) -> f64 {
        self.current_blend
    }

    /// Last detected level in dB (dynamic mode only)
    pub fn current_input_level_db(&self) -> f64 {
        self.input_level_db
    }

    pub fn low_blend(&self) -> f64 {
        self.curve.low_blend()
    }

    pub fn high_blend(&self) -> f64 {
        self.curve.high_blend()
    }

    pub fn threshold_db(&self) -> f64 {
        self.curve.threshold_db()
    }

    pub fn range_db(&self) -> f64 {
        self.curve.range_db()
    }

    pub fn knee_width_db(&self) -> f64 {
        self.curve.knee_width_db()
    }

    pub fn detection_mode(&self) -> DetectionMode {
        self.detection_mode
    }

    pub fn attack_ms(&self) -> f64 {
        self.smoother.attack_ms()
    }

    pub fn release_ms(&self) -> f64 {
        self.smoother.release_ms()
    }

    pub fn output_gain_db(&self) -> f64 {
        self.output_gain_db
    }

    pub fn is_dynamic_mode_enabled(&self) -> bool {
        self.dynamic_mode
    }

    pub fn is_sidechain_enabled(&self) -> bool {
        self.sidechain_enabled
    }

    pub fn is_ir_loaded(&self, slot: IrSlot) -> bool {
        self.paths[slot.index()].is_loaded()
    }

    pub fn is_ir_enabled(&self, slot: IrSlot) -> bool {
        self.paths[slot.index()].is_enabled()
    }

    pub fn ir_path(&self, slot: IrSlot) -> Option<&Path> {
        self.paths[slot.index()].path()
    }

    pub fn ir_latency(&self, slot: IrSlot) -> usize {
        self.paths[slot.index()].latency()
    }

    /// Native sample rate of the loaded IR (0 when empty)
    pub fn ir_sample_rate(&self, slot: IrSlot) -> u32 {
        let path = &self.paths[slot.index()];
        if path.is_loaded() { path.loader().native_sample_rate() } else { 0 }
    }

    /// IR length in samples at its native rate
    pub fn ir_num_samples(&self, slot: IrSlot) -> usize {
        let path = &self.paths[slot.index()];
        if path.is_loaded() { path.loader().num_samples() } else { 0 }
    }

    /// Channel count of the IR file as decoded
    pub fn ir_num_channels(&self, slot: IrSlot) -> usize {
        let path = &self.paths[slot.index()];
        if path.is_loaded() { path.loader().num_channels() } else { 0 }
    }

    /// Reported plugin latency: the slower of the two paths
    pub fn latency_samples(&self) -> usize {
        self.paths[0].latency().max(self.paths[1].latency())
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn path(&self, slot: IrSlot) -> &ConvolutionPath<E> {
        &self.paths[slot.index()]
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // STATE
    // ═══════════════════════════════════════════════════════════════════════════

    /// Silence engines and alignment lines, keep IRs and parameters
    pub fn reset(&mut self) {
        for path in &mut self.paths {
            path.engine_mut().reset();
        }
        for line in self.dry_delay.iter_mut().chain(self.path_delay.iter_mut()) {
            line.clear();
        }
        Processor::reset(&mut self.detector);
        self.input_level_db = SILENCE_FLOOR_DB;
    }

    /// Control path: re-derives every loaded IR at the new rate,
    /// clamped to [8 kHz, 384 kHz]
    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        if !sample_rate.is_finite() {
            return;
        }
        let sample_rate = sample_rate.clamp(MIN_SAMPLE_RATE, MAX_SAMPLE_RATE);
        if sample_rate == self.sample_rate {
            return;
        }
        self.sample_rate = sample_rate;
        self.smoother.set_sample_rate(sample_rate);
        self.detector.set_sample_rate(sample_rate);

        for path in &mut self.paths {
            if let Err(e) = path.reinitialize(sample_rate) {
                log::warn!("{} unloaded after rate change to {} Hz: {}", path.slot(), sample_rate, e);
            }
        }
        self.update_latency();
        log::info!("Sample rate set to {} Hz", sample_rate);
    }
}

impl<E: ConvolutionEngine> Processor for DualPathProcessor<E> {
    fn reset(&mut self) {
        DualPathProcessor::reset(self);
    }

    fn latency(&self) -> usize {
        self.latency_samples()
    }
}

impl<E: ConvolutionEngine> ProcessorConfig for DualPathProcessor<E> {
    fn set_sample_rate(&mut self, sample_rate: f64) {
        DualPathProcessor::set_sample_rate(self, sample_rate);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn processor() -> DualPathProcessor {
        DualPathProcessor::new(EngineConfig::default().with_max_block_size(256))
    }

    #[test]
    fn test_defaults() {
        let p = processor();
        assert_eq!(p.blend(), 0.0);
        assert_eq!(p.low_blend(), -1.0);
        assert_eq!(p.high_blend(), 1.0);
        assert_eq!(p.threshold_db(), -30.0);
        assert_eq!(p.range_db(), 20.0);
        assert_eq!(p.knee_width_db(), 5.0);
        assert_eq!(p.attack_ms(), 50.0);
        assert_eq!(p.release_ms(), 200.0);
        assert_eq!(p.output_gain_db(), 0.0);
        assert_eq!(p.detection_mode(), DetectionMode::Peak);
        assert!(p.is_ir_enabled(IrSlot::A) && p.is_ir_enabled(IrSlot::B));
        assert!(!p.is_ir_loaded(IrSlot::A) && !p.is_ir_loaded(IrSlot::B));
        assert!(!p.is_dynamic_mode_enabled());
        assert!(!p.is_sidechain_enabled());
        assert_eq!(p.latency_samples(), 0);
        assert_eq!(p.current_input_level_db(), SILENCE_FLOOR_DB);
    }

    #[test]
    fn test_setters_clamp() {
        let mut p = processor();
        p.set_blend(3.0);
        assert_eq!(p.blend(), 1.0);
        p.set_low_blend(-7.0);
        assert_eq!(p.low_blend(), -1.0);
        p.set_high_blend(2.0);
        assert_eq!(p.high_blend(), 1.0);
        p.set_threshold(10.0);
        assert_eq!(p.threshold_db(), 0.0);
        p.set_range(0.0);
        assert_eq!(p.range_db(), 1.0);
        p.set_knee_width(50.0);
        assert_eq!(p.knee_width_db(), 20.0);
        p.set_attack_time(0.1);
        assert_eq!(p.attack_ms(), 1.0);
        p.set_attack_time(900.0);
        assert_eq!(p.attack_ms(), 500.0);
        p.set_release_time(5000.0);
        assert_eq!(p.release_ms(), 1000.0);
        p.set_output_gain(-40.0);
        assert_eq!(p.output_gain_db(), -24.0);
    }

    #[test]
    fn test_static_blend_applies_immediately() {
        let mut p = processor();
        p.set_blend(0.5);
        assert_eq!(p.current_blend(), 0.5);

        p.set_dynamic_mode_enabled(true);
        p.set_blend(-0.5);
        assert_eq!(p.current_blend(), 0.5);

        p.set_dynamic_mode_enabled(false);
        assert_eq!(p.current_blend(), -0.5);
    }

    #[test]
    fn test_disabling_dynamic_mode_pins_static_blend() {
        let mut p = processor();
        let gain = 1.0 / Decibels(irblend_core::IR_CALIBRATION_DB).to_gain();
        p.load_impulse_samples(IrSlot::A, vec![vec![gain]], 48000).unwrap();
        p.set_blend(-0.3);
        p.set_attack_time(1.0);
        p.set_dynamic_mode_enabled(true);

        let loud = vec![0.9; 256];
        let mut out = vec![0.0; 256];
        for _ in 0..200 {
            p.process_mono(&loud, &mut out);
            if p.current_blend() > 0.99 {
                break;
            }
        }
        assert!(p.current_blend() > 0.99, "smoothed blend {}", p.current_blend());

        p.set_dynamic_mode_enabled(false);
        assert_eq!(p.current_blend(), -0.3);
        p.process_mono(&loud, &mut out);
        assert_eq!(p.current_blend(), -0.3);
    }

    #[test]
    fn test_single_path_mixes_aligned_dry() {
        let mut p = processor();
        // Unit impulse scaled back up so path A is a pure delay
        let gain = 1.0 / Decibels(irblend_core::IR_CALIBRATION_DB).to_gain();
        p.load_impulse_samples(IrSlot::A, vec![vec![gain]], 48000).unwrap();
        // Half way between A and dry
        p.set_blend(0.0);

        let latency = p.latency_samples();
        let input: Vec<f64> = (0..1024).map(|i| ((i * 7) % 13) as f64 / 13.0 - 0.5).collect();
        let mut output = vec![0.0; 1024];
        p.process_mono(&input, &mut output);

        for i in latency..1024 {
            assert_relative_eq!(output[i], input[i - latency], epsilon = 1e-9);
        }
    }

    #[test]
    fn test_settings_round_trip() {
        let mut p = processor();
        let settings = BlendSettings {
            blend: 0.25,
            threshold_db: -12.0,
            detection_mode: DetectionMode::Rms,
            output_gain_db: 99.0,
            ir_b_enabled: false,
            dynamic_mode: true,
            sidechain: true,
            ..BlendSettings::default()
        };
        p.apply_settings(&settings);

        let read = p.settings();
        assert_eq!(read.blend, 0.25);
        assert_eq!(read.threshold_db, -12.0);
        assert_eq!(read.detection_mode, DetectionMode::Rms);
        assert_eq!(read.output_gain_db, 24.0);
        assert!(!read.ir_b_enabled);
        assert!(read.dynamic_mode && read.sidechain);
    }

    #[test]
    fn test_sample_rate_change_rebuilds_paths() {
        let mut p = processor();
        p.load_impulse_samples(IrSlot::B, vec![vec![0.5; 441]], 44100).unwrap();
        p.set_sample_rate(96000.0);
        assert_eq!(p.sample_rate(), 96000.0);
        assert!(p.is_ir_loaded(IrSlot::B));
        assert_eq!(p.ir_sample_rate(IrSlot::B), 44100);
        assert_eq!(p.ir_num_samples(IrSlot::B), 441);

        // Non-finite rates are ignored
        p.set_sample_rate(f64::NAN);
        assert_eq!(p.sample_rate(), 96000.0);
    }

    #[test]
    fn test_sample_rate_is_clamped() {
        let mut p = processor();
        p.load_impulse_samples(IrSlot::A, vec![vec![0.5; 441]], 44100).unwrap();

        p.set_sample_rate(10_000_000.0);
        assert_eq!(p.sample_rate(), 384000.0);
        assert_eq!(p.ir_num_samples(IrSlot::A), 441);
        assert!(p.is_ir_loaded(IrSlot::A));

        p.set_sample_rate(1.0);
        assert_eq!(p.sample_rate(), 8000.0);
        assert!(p.is_ir_loaded(IrSlot::A));

        p.set_sample_rate(0.0);
        assert_eq!(p.sample_rate(), 8000.0);
    }
}
