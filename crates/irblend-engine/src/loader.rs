//! Background IR loading
//!
//! Decoding, resampling and FFT setup of a long impulse can take far longer
//! than an audio callback. `BackgroundLoader` runs them on a worker thread
//! and hands back a `PreparedPath` the control thread installs with
//! `DualPathProcessor::install_prepared`.

use std::path::PathBuf;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, TryRecvError, TrySendError, bounded, never};
use thiserror::Error;

use irblend_core::{IrSlot, LoadResult};
use irblend_dsp::ConvolutionEngine;

use crate::{EngineConfig, PreparedPath};

/// Pending requests (and undelivered results) held at once
const QUEUE_DEPTH: usize = 8;

/// Background loader error
#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("Load queue is full")]
    QueueFull,

    #[error("Load worker has stopped")]
    Disconnected,

    #[error("Failed to spawn load worker: {0}")]
    Spawn(#[from] std::io::Error),
}

/// One slot to load
#[derive(Debug, Clone)]
pub struct LoadRequest {
    pub slot: IrSlot,
    pub path: PathBuf,
    pub sample_rate: f64,
    pub config: EngineConfig,
}

/// Result of one request
pub struct LoadResponse<E: ConvolutionEngine> {
    pub slot: IrSlot,
    pub path: PathBuf,
    pub result: LoadResult<PreparedPath<E>>,
}

/// Worker thread preparing IR slots off the audio thread
pub struct BackgroundLoader<E: ConvolutionEngine + 'static> {
    request_tx: Option<Sender<LoadRequest>>,
    response_rx: Receiver<LoadResponse<E>>,
    worker: Option<JoinHandle<()>>,
}

impl<E: ConvolutionEngine + 'static> BackgroundLoader<E> {
    /// Spawn the worker; `make_engine` builds a fresh engine per request
    pub fn spawn<F>(make_engine: F) -> Result<Self, LoaderError>
    where
        F: Fn(&EngineConfig) -> E + Send + 'static,
    {
        let (request_tx, request_rx) = bounded::<LoadRequest>(QUEUE_DEPTH);
        let (response_tx, response_rx) = bounded::<LoadResponse<E>>(QUEUE_DEPTH);

        let worker = thread::Builder::new()
            .name("irblend-loader".into())
            .spawn(move || {
                // Ends when every request sender is dropped
                for request in request_rx.iter() {
                    let engine = make_engine(&request.config);
                    let result = PreparedPath::build(
                        request.slot,
                        &request.path,
                        request.sample_rate,
                        &request.config,
                        engine,
                    );

                    match &result {
                        Ok(prepared) => log::debug!(
                            "Loader: prepared {} from {} (latency {})",
                            request.slot,
                            request.path.display(),
                            prepared.latency
                        ),
                        Err(e) => log::warn!(
                            "Loader: {} failed for {}: {}",
                            request.slot,
                            request.path.display(),
                            e
                        ),
                    }

                    let response = LoadResponse {
                        slot: request.slot,
                        path: request.path,
                        result,
                    };
                    if response_tx.send(response).is_err() {
                        break;
                    }
                }

                log::info!("Loader thread exiting");
            })?;

        log::info!("Loader thread started");

        Ok(Self {
            request_tx: Some(request_tx),
            response_rx,
            worker: Some(worker),
        })
    }

    /// Queue a load without blocking
    pub fn submit(&self, request: LoadRequest) -> Result<(), LoaderError> {
        let tx = self.request_tx.as_ref().ok_or(LoaderError::Disconnected)?;
        tx.try_send(request).map_err(|e| match e {
            TrySendError::Full(_) => LoaderError::QueueFull,
            TrySendError::Disconnected(_) => LoaderError::Disconnected,
        })
    }

    /// Take a finished load, if any
    pub fn try_recv(&self) -> Option<LoadResponse<E>> {
        match self.response_rx.try_recv() {
            Ok(response) => Some(response),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Block until the next load finishes (control thread only)
    pub fn recv(&self) -> Result<LoadResponse<E>, LoaderError> {
        if self.worker.is_none() {
            return Err(LoaderError::Disconnected);
        }
        self.response_rx.recv().map_err(|_| LoaderError::Disconnected)
    }

    /// Stop accepting requests, discard undelivered results and join the worker
    pub fn shutdown(&mut self) {
        self.request_tx = None;
        // Dropping the receiver fails the worker's next send, even one
        // blocked on a full queue
        self.response_rx = never();

        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}

impl<E: ConvolutionEngine + 'static> Drop for BackgroundLoader<E> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
