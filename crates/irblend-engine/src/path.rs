//! One convolution path (IR slot): loader, engine, and load state
//!
//! Loads are transactional. Everything that can fail (decode, resample,
//! buffer checks, engine setup) runs before the slot's state is touched, so
//! a failed load leaves a loaded slot processing its previous impulse.

use std::path::Path;

use irblend_core::{IrSlot, LoadError, LoadResult, Sample};
use irblend_dsp::convolution::ENGINE_CHANNELS;
use irblend_dsp::{ConvolutionEngine, ImpulseBuffer};
use irblend_file::ImpulseLoader;

use crate::EngineConfig;

// ═══════════════════════════════════════════════════════════════════════════════
// PREPARED PATH
// ═══════════════════════════════════════════════════════════════════════════════

/// A fully initialized slot built off the audio thread, ready to install
pub struct PreparedPath<E: ConvolutionEngine> {
    pub slot: IrSlot,
    pub loader: ImpulseLoader,
    pub engine: E,
    pub latency: usize,
    /// Rate the engine was initialized for
    pub sample_rate: f64,
}

impl<E: ConvolutionEngine> std::fmt::Debug for PreparedPath<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreparedPath")
            .field("slot", &self.slot)
            .field("path", &self.loader.path())
            .field("latency", &self.latency)
            .field("sample_rate", &self.sample_rate)
            .finish()
    }
}

impl<E: ConvolutionEngine> PreparedPath<E> {
    /// Decode `path` and initialize `engine` with it at `sample_rate`
    pub fn build<P: AsRef<Path>>(
        slot: IrSlot,
        path: P,
        sample_rate: f64,
        config: &EngineConfig,
        mut engine: E,
    ) -> LoadResult<Self> {
        let mut loader = new_loader(config);
        loader.load_from_file(path)?;
        let latency = initialize(&loader, &mut engine, sample_rate)?;
        Ok(Self {
            slot,
            loader,
            engine,
            latency,
            sample_rate,
        })
    }
}

fn new_loader(config: &EngineConfig) -> ImpulseLoader {
    ImpulseLoader::new()
        .with_quality(config.resample_quality)
        .with_calibration_db(config.calibration_db)
}

/// Derive the engine buffer for `sample_rate`, check it, and hand it to the engine
fn initialize<E: ConvolutionEngine>(
    loader: &ImpulseLoader,
    engine: &mut E,
    sample_rate: f64,
) -> LoadResult<usize> {
    let buffer = loader.resample_and_initialize(sample_rate)?;
    check_buffer(&buffer, sample_rate)?;
    Ok(engine.set_impulse(&buffer)?)
}

fn check_buffer(buffer: &ImpulseBuffer, sample_rate: f64) -> LoadResult<()> {
    if buffer.is_empty() {
        return Err(LoadError::InvalidImpulse("length 0 after resampling".to_string()));
    }
    if buffer.num_channels() != ENGINE_CHANNELS {
        return Err(LoadError::InvalidImpulse(format!(
            "{} channels, expected {}",
            buffer.num_channels(),
            ENGINE_CHANNELS
        )));
    }
    if (buffer.sample_rate() - sample_rate.round()).abs() > 0.5 {
        return Err(LoadError::InvalidImpulse(format!(
            "sample rate {} Hz, expected {} Hz",
            buffer.sample_rate(),
            sample_rate
        )));
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════════
// CONVOLUTION PATH
// ═══════════════════════════════════════════════════════════════════════════════

/// IR slot A or B
pub struct ConvolutionPath<E: ConvolutionEngine> {
    slot: IrSlot,
    loader: ImpulseLoader,
    engine: E,
    loaded: bool,
    enabled: bool,
    latency: usize,
}

impl<E: ConvolutionEngine> ConvolutionPath<E> {
    pub fn new(slot: IrSlot, engine: E, config: &EngineConfig) -> Self {
        Self {
            slot,
            loader: new_loader(config),
            engine,
            loaded: false,
            enabled: true,
            latency: 0,
        }
    }

    /// Load an IR file for `sample_rate`; the slot is untouched on failure
    pub fn load(&mut self, path: &Path, sample_rate: f64, config: &EngineConfig) -> LoadResult<()> {
        let mut loader = new_loader(config);
        loader.load_from_file(path)?;
        self.commit(loader, sample_rate)
    }

    /// Load already-decoded channels as if read from `name`
    pub fn load_samples(
        &mut self,
        channels: Vec<Vec<Sample>>,
        native_rate: u32,
        name: &Path,
        sample_rate: f64,
        config: &EngineConfig,
    ) -> LoadResult<()> {
        let mut loader = new_loader(config);
        loader.load_from_samples(channels, native_rate, name)?;
        self.commit(loader, sample_rate)
    }

    fn commit(&mut self, loader: ImpulseLoader, sample_rate: f64) -> LoadResult<()> {
        // set_impulse leaves the engine untouched when it fails
        let latency = initialize(&loader, &mut self.engine, sample_rate)?;
        self.loader = loader;
        self.loaded = true;
        self.latency = latency;
        Ok(())
    }

    /// Swap in a slot prepared elsewhere
    pub fn install(&mut self, prepared: PreparedPath<E>) {
        self.loader = prepared.loader;
        self.engine = prepared.engine;
        self.latency = prepared.latency;
        self.loaded = true;
    }

    /// Re-derive the engine buffer after a sample-rate change
    ///
    /// A slot that cannot be rebuilt at the new rate drops to not-loaded.
    pub fn reinitialize(&mut self, sample_rate: f64) -> LoadResult<()> {
        if !self.loaded {
            return Ok(());
        }
        match initialize(&self.loader, &mut self.engine, sample_rate) {
            Ok(latency) => {
                self.latency = latency;
                Ok(())
            }
            Err(e) => {
                self.loaded = false;
                self.latency = 0;
                self.engine.reset();
                Err(e)
            }
        }
    }

    /// Unload the IR
    pub fn clear(&mut self) {
        self.loader.clear();
        self.loaded = false;
        self.latency = 0;
        self.engine.reset();
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // ACCESSORS
    // ═══════════════════════════════════════════════════════════════════════════

    pub fn slot(&self) -> IrSlot {
        self.slot
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Loaded and enabled
    #[inline]
    pub fn is_active(&self) -> bool {
        self.loaded && self.enabled
    }

    /// Engine latency in samples (0 when not loaded)
    #[inline]
    pub fn latency(&self) -> usize {
        self.latency
    }

    pub fn loader(&self) -> &ImpulseLoader {
        &self.loader
    }

    pub fn path(&self) -> Option<&Path> {
        if self.loaded { self.loader.path() } else { None }
    }

    #[inline]
    pub fn engine(&self) -> &E {
        &self.engine
    }

    #[inline]
    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }
}
