//! Pont vers le périphérique audio (cycle de vie + file de commandes)
//!
//! [`AudioEngine`] vit côté contrôle. Il ouvre le périphérique de sortie
//! par cpal, installe le [`MixerCore`](crate::MixerCore) dans le callback,
//! et poste les commandes au thread audio par un canal crossbeam borné.
//! Le `Stream` cpal n'étant pas `Send`, il vit sur un thread dédié commandé
//! par un canal d'arrêt, comme les sinks du pipeline de référence.

use crate::command::MixerCommand;
use crate::error::{MixerError, Result};
use crate::mixer::{MixerConfig, MixerCore};
use crate::sample::SamplePcm;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SizedSample};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::sync::mpsc as std_mpsc;
use std::sync::Arc;
use std::thread;

/// Profondeur de la file contrôle → audio
const COMMAND_QUEUE_SIZE: usize = 256;

/// États du pont audio
///
/// L'initialisation est un appel explicite (l'équivalent natif du geste
/// utilisateur exigé par les hôtes web) ; la réinitialisation après une
/// erreur est permise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Uninitialized,
    Initializing,
    Ready,
    Error,
}

/// Poignée de contrôle du mixeur temps réel
///
/// Toute opération avant `ready` est un no-op journalisé : charger ou
/// déclencher un son sans périphérique ouvert n'est pas une erreur, juste
/// une opération perdue.
pub struct AudioEngine {
    state: EngineState,
    config: MixerConfig,
    sample_rate: Option<u32>,
    commands: Option<Sender<MixerCommand>>,
    stream_stop: Option<std_mpsc::Sender<()>>,
    stream_thread: Option<thread::JoinHandle<()>>,
}

impl AudioEngine {
    pub fn new(config: MixerConfig) -> Self {
        Self {
            state: EngineState::Uninitialized,
            config,
            sample_rate: None,
            commands: None,
            stream_stop: None,
            stream_thread: None,
        }
    }

    /// Ouvre le périphérique par défaut et démarre le flux
    ///
    /// Sur échec, l'état passe à `Error` ; un nouvel appel à `init` est
    /// alors autorisé.
    pub fn init(&mut self) -> Result<()> {
        if self.state == EngineState::Ready {
            tracing::warn!("Audio engine already initialized, ignoring init");
            return Ok(());
        }
        self.state = EngineState::Initializing;

        match self.open_device() {
            Ok(()) => {
                self.state = EngineState::Ready;
                tracing::info!(
                    sample_rate = self.sample_rate,
                    "Audio engine ready"
                );
                Ok(())
            }
            Err(err) => {
                self.state = EngineState::Error;
                tracing::error!("Audio engine initialization failed: {}", err);
                Err(err)
            }
        }
    }

    fn open_device(&mut self) -> Result<()> {
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or(MixerError::NoDevice)?;

        tracing::debug!(
            "Using audio device: {}",
            device.name().unwrap_or_else(|_| "Unknown".to_string())
        );

        let supported = device
            .default_output_config()
            .map_err(|err| MixerError::DeviceConfig(err.to_string()))?;

        let sample_format = supported.sample_format();
        let stream_config = supported.config();
        let sample_rate = stream_config.sample_rate.0;
        let channels = stream_config.channels as usize;

        tracing::debug!(
            "Output config: {} channels, {} Hz, {:?}",
            channels,
            sample_rate,
            sample_format
        );

        let (command_tx, command_rx) = bounded(COMMAND_QUEUE_SIZE);
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();
        let core = MixerCore::new(sample_rate, self.config.clone());

        // Thread dédié : le Stream cpal n'est pas Send. Il porte le nom
        // sous lequel le processeur de mixage est publié.
        let stream_thread = thread::Builder::new()
            .name("mixer-processor".to_string())
            .spawn(move || {
                let stream = match sample_format {
                    cpal::SampleFormat::F32 => {
                        build_stream::<f32>(&device, &stream_config, core, command_rx, channels)
                    }
                    cpal::SampleFormat::I16 => {
                        build_stream::<i16>(&device, &stream_config, core, command_rx, channels)
                    }
                    cpal::SampleFormat::U16 => {
                        build_stream::<u16>(&device, &stream_config, core, command_rx, channels)
                    }
                    other => {
                        tracing::error!("Unsupported sample format: {:?}", other);
                        return;
                    }
                };

                let stream = match stream {
                    Ok(stream) => stream,
                    Err(err) => {
                        tracing::error!("Failed to build output stream: {}", err);
                        return;
                    }
                };

                if let Err(err) = stream.play() {
                    tracing::error!("Failed to start stream: {}", err);
                    return;
                }

                tracing::debug!("Stream thread started");

                // Attendre la commande d'arrêt ; le stream se ferme au drop.
                let _ = stop_rx.recv();
                tracing::debug!("Stream thread exiting");
            })
            .map_err(|err| MixerError::StreamBuild(err.to_string()))?;

        self.sample_rate = Some(sample_rate);
        self.commands = Some(command_tx);
        self.stream_stop = Some(stop_tx);
        self.stream_thread = Some(stream_thread);
        Ok(())
    }

    /// Ferme le flux et rend le moteur réinitialisable
    pub fn shutdown(&mut self) {
        if let Some(stop) = self.stream_stop.take() {
            let _ = stop.send(());
        }
        if let Some(handle) = self.stream_thread.take() {
            let _ = handle.join();
        }
        self.commands = None;
        self.sample_rate = None;
        self.state = EngineState::Uninitialized;
        tracing::debug!("Audio engine shut down");
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Sample rate du périphérique, connu après `init`
    ///
    /// Les PCM fournis à `load_sample` doivent déjà être à ce rate : aucune
    /// conversion n'a lieu pendant la lecture.
    pub fn sample_rate(&self) -> Option<u32> {
        self.sample_rate
    }

    /// Installe un PCM dans la banque du thread audio
    ///
    /// Le buffer est transféré ; l'appelant ne doit plus le référencer.
    pub fn load_sample(&self, sound_id: &str, pcm: SamplePcm) {
        self.post(
            MixerCommand::LoadSample {
                sound_id: Arc::from(sound_id),
                pcm,
            },
            "load-sample",
        );
    }

    /// Retire un PCM ; les voix liées passent en release au bloc suivant
    pub fn unload_sample(&self, sound_id: &str) {
        self.post(
            MixerCommand::UnloadSample {
                sound_id: Arc::from(sound_id),
            },
            "unload-sample",
        );
    }

    /// Déclenche la lecture d'un son
    pub fn trigger(&self, sound_id: &str) {
        self.post(
            MixerCommand::Trigger {
                sound_id: Arc::from(sound_id),
            },
            "trigger",
        );
    }

    /// Toutes les voix actives passent en release
    pub fn stop_all(&self) {
        self.post(MixerCommand::StopAll, "stop-all");
    }

    fn post(&self, command: MixerCommand, label: &str) {
        match (&self.state, &self.commands) {
            (EngineState::Ready, Some(tx)) => {
                if tx.try_send(command).is_err() {
                    tracing::warn!("Audio command queue full, dropping {}", label);
                }
            }
            _ => {
                tracing::warn!("Audio engine not ready, dropping {}", label);
            }
        }
    }
}

impl Drop for AudioEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Construit le flux de sortie pour un format hardware donné
///
/// Le mixage interne est toujours en f32 ; la conversion vers le format du
/// périphérique se fait échantillon par échantillon en sortie de bloc.
fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut core: MixerCore,
    command_rx: Receiver<MixerCommand>,
    channels: usize,
) -> Result<cpal::Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let mut scratch: Vec<f32> = vec![0.0; 4096 * channels.max(1)];

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                // Drainer les commandes entre deux blocs, sans jamais bloquer
                while let Ok(command) = command_rx.try_recv() {
                    core.apply_command(command);
                }

                if scratch.len() < data.len() {
                    scratch.resize(data.len(), 0.0);
                }
                core.render_interleaved(&mut scratch[..data.len()], channels);

                for (out, value) in data.iter_mut().zip(&scratch) {
                    *out = T::from_sample(*value);
                }
            },
            |err| {
                tracing::error!("Audio stream error: {}", err);
            },
            None,
        )
        .map_err(|err| MixerError::StreamBuild(err.to_string()))
}
