//! Flash session - high-level orchestrator for a provisioning run.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::error::{FlashError, read_file};
use crate::events::{FlashEvent, FlashObserver, FlashPhase, PacketDirection, TracingObserver};
use crate::image::{Asset, LoaderImage, LoaderLayout, PartitionTable};
use crate::protocol::{
    BootInfo, DEFAULT_BAUD_RATE, FLASH_DATA_MAX_FRAME, MAX_POLLS, PT_TABLE0_ADDRESS,
    PT_TABLE1_ADDRESS, POST_HANDSHAKE_DELAY_MS, RETRY_BACKOFF_MS, SETTLE_DELAY_MS, Stage,
};
use crate::state::handlers::{HandlerContext, handle_transition};
use crate::state::machine::{AssetOutcome, SessionState, StateMachineContext};
use crate::transport::{SerialPortTransport, SerialTransport, TransportError};

/// What to do when the device reports a different digest than expected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestPolicy {
    /// Log the mismatch and carry on with the next asset.
    #[default]
    Lenient,
    /// Abort the session with `IntegrityMismatch`.
    Strict,
}

/// Delays and polling bounds for the request/response cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timing {
    /// Wait before every read of a response.
    pub settle_ms: u64,
    /// Extra wait after a read that returned nothing.
    pub backoff_ms: u64,
    /// Pause after a successful handshake.
    pub post_handshake_ms: u64,
    /// Reads attempted before giving up on a silent device.
    pub max_polls: u32,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            settle_ms: SETTLE_DELAY_MS,
            backoff_ms: RETRY_BACKOFF_MS,
            post_handshake_ms: POST_HANDSHAKE_DELAY_MS,
            max_polls: MAX_POLLS,
        }
    }
}

impl Timing {
    /// No delays at all, for scripted transports.
    pub fn immediate() -> Self {
        Self {
            settle_ms: 0,
            backoff_ms: 0,
            post_handshake_ms: 0,
            max_polls: MAX_POLLS,
        }
    }

    pub(crate) fn settle(&self) {
        sleep_ms(self.settle_ms);
    }

    pub(crate) fn backoff(&self) {
        sleep_ms(self.backoff_ms);
    }

    pub(crate) fn post_handshake(&self) {
        sleep_ms(self.post_handshake_ms);
    }
}

fn sleep_ms(ms: u64) {
    if ms > 0 {
        thread::sleep(Duration::from_millis(ms));
    }
}

/// A file to program at a fixed address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetSpec {
    pub address: u32,
    pub path: PathBuf,
}

/// A file to program at the address of a partition table entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedImage {
    pub name: String,
    pub path: PathBuf,
}

/// Configuration for a flash session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Serial port path.
    pub port: String,
    pub baud_rate: u32,
    /// Path to the eflash loader image.
    pub loader_path: Option<PathBuf>,
    /// Assets at explicit addresses.
    pub assets: Vec<AssetSpec>,
    /// Partition table, flashed to both table slots.
    pub partition_table: Option<PathBuf>,
    /// Images placed by partition entry name.
    pub images: Vec<NamedImage>,
    pub digest_policy: DigestPolicy,
    /// Trust the sign/encrypt bits of the boot-info option blob.
    pub decode_security_flags: bool,
    /// Data bytes per `FLASH_DATA` frame.
    pub flash_frame_size: usize,
    pub timing: Timing,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            port: String::new(),
            baud_rate: DEFAULT_BAUD_RATE,
            loader_path: None,
            assets: Vec::new(),
            partition_table: None,
            images: Vec::new(),
            digest_policy: DigestPolicy::default(),
            decode_security_flags: true,
            flash_frame_size: FLASH_DATA_MAX_FRAME,
            timing: Timing::default(),
        }
    }
}

impl SessionConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: SessionConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject settings the protocol cannot honor.
    pub fn validate(&self) -> Result<(), FlashError> {
        if self.flash_frame_size == 0 || self.flash_frame_size > FLASH_DATA_MAX_FRAME {
            return Err(FlashError::Config(format!(
                "flash_frame_size must be 1..={}, got {}",
                FLASH_DATA_MAX_FRAME, self.flash_frame_size
            )));
        }
        if self.timing.max_polls == 0 {
            return Err(FlashError::Config("timing.max_polls must be at least 1".into()));
        }
        if !self.images.is_empty() && self.partition_table.is_none() {
            return Err(FlashError::Config(
                "images placed by name need a partition table".into(),
            ));
        }
        Ok(())
    }
}

/// Loader and assets, read and split before the port is touched.
#[derive(Debug, Clone)]
pub struct SessionInputs {
    pub loader: LoaderImage,
    pub assets: Vec<Asset>,
}

impl SessionInputs {
    pub fn new(loader: LoaderImage, assets: Vec<Asset>) -> Self {
        Self { loader, assets }
    }

    /// Read every file named by `config`.
    pub fn load(config: &SessionConfig) -> Result<Self, FlashError> {
        config.validate()?;
        let loader_path = config
            .loader_path
            .as_deref()
            .ok_or_else(|| FlashError::Config("no loader image configured".into()))?;

        info!(path = %loader_path.display(), "Loading eflash loader");
        let loader = LoaderImage::from_bytes(read_file(loader_path)?, LoaderLayout::V1)?;
        loader.inspect();

        let mut assets = Vec::new();

        if let Some(pt_path) = &config.partition_table {
            info!(path = %pt_path.display(), "Loading partition table");
            let table = PartitionTable::from_bytes(&read_file(pt_path)?)?;
            let label = pt_path.display().to_string();
            for address in [PT_TABLE0_ADDRESS, PT_TABLE1_ADDRESS] {
                assets.push(Asset::new(address, table.as_bytes().to_vec(), label.clone())?);
            }

            for image in &config.images {
                let entry = table.find(&image.name)?;
                let data = read_file(&image.path)?;
                let max_len = entry.max_len[(entry.active_index & 1) as usize];
                if max_len != 0 && data.len() > max_len as usize {
                    warn!(
                        name = %image.name,
                        len = data.len(),
                        max_len,
                        "Image larger than its partition"
                    );
                }
                let address = entry.active_address();
                info!(name = %image.name, address = %format!("0x{:08X}", address), "Placing image");
                assets.push(Asset::new(address, data, image.path.display().to_string())?);
            }
        }

        for spec in &config.assets {
            let data = read_file(&spec.path)?;
            assets.push(Asset::new(spec.address, data, spec.path.display().to_string())?);
        }

        Ok(Self { loader, assets })
    }
}

/// What a finished session observed.
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub trail: Vec<SessionState>,
    /// Whether the machine reached its terminal state.
    pub finished: bool,
    pub boot_info: Option<BootInfo>,
    pub stage: Stage,
    pub outcomes: Vec<AssetOutcome>,
}

impl SessionReport {
    pub fn all_verified(&self) -> bool {
        self.outcomes.iter().all(AssetOutcome::verified)
    }
}

impl From<StateMachineContext> for SessionReport {
    fn from(state: StateMachineContext) -> Self {
        Self {
            finished: state.is_complete(),
            trail: state.trail,
            boot_info: state.boot_info,
            stage: state.stage,
            outcomes: state.outcomes,
        }
    }
}

/// Flash session - orchestrates the complete provisioning run.
pub struct FlashSession<O: FlashObserver> {
    config: SessionConfig,
    observer: Arc<O>,
}

impl FlashSession<TracingObserver> {
    /// Create a new session with default tracing observer.
    pub fn new(config: SessionConfig) -> Self {
        Self::with_observer(config, Arc::new(TracingObserver))
    }
}

impl<O: FlashObserver + 'static> FlashSession<O> {
    /// Create a new session with a custom observer.
    pub fn with_observer(config: SessionConfig, observer: Arc<O>) -> Self {
        Self { config, observer }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Load inputs, open the configured port and run to completion.
    #[instrument(skip(self), fields(port = %self.config.port))]
    pub fn run(&self) -> Result<SessionReport> {
        if self.config.port.is_empty() {
            return Err(FlashError::Config("no serial port configured".into()).into());
        }
        let inputs = SessionInputs::load(&self.config)?;

        let transport = SerialPortTransport::open(&self.config.port, self.config.baud_rate)
            .map_err(FlashError::from)?;
        self.observer.on_event(&FlashEvent::PortOpened {
            name: transport.name().to_string(),
            baud_rate: transport.baud_rate(),
        });

        self.run_with_transport(&transport, &inputs)
    }

    /// Run the state machine over an already open transport. The transport
    /// is closed exactly once before this returns, whatever the outcome.
    pub fn run_with_transport<T: SerialTransport + ?Sized>(
        &self,
        transport: &T,
        inputs: &SessionInputs,
    ) -> Result<SessionReport> {
        let observable = ObservableTransport {
            inner: transport,
            observer: &self.observer,
        };

        let result = self
            .config
            .validate()
            .and_then(|_| self.run_state_machine(&observable, inputs));

        if let Err(e) = transport.close() {
            warn!(error = %e, "Failed to close transport");
        }

        match result {
            Ok(state) => Ok(state.into()),
            Err(e) => {
                self.observer.on_event(&FlashEvent::Error {
                    code: e.device_code(),
                    message: e.to_string(),
                });
                Err(e.into())
            }
        }
    }

    fn run_state_machine<T: SerialTransport + ?Sized>(
        &self,
        transport: &T,
        inputs: &SessionInputs,
    ) -> Result<StateMachineContext, FlashError> {
        let mut state = StateMachineContext::new();
        let mut phase = state.state.phase();

        while let Some(target) = state.next_state() {
            let mut ctx = HandlerContext {
                transport,
                observer: self.observer.as_ref(),
                state: &mut state,
                config: &self.config,
                inputs,
            };

            if let Err(e) = handle_transition(target, &mut ctx) {
                warn!(state = %target, error = %e, "Transition failed");
                self.observer.on_event(&FlashEvent::PhaseChanged {
                    from: phase,
                    to: FlashPhase::Error,
                });
                return Err(e);
            }

            state.goto_state(target);
            self.observer
                .on_event(&FlashEvent::StateEntered { state: target });

            if target.phase() != phase {
                self.observer.on_event(&FlashEvent::PhaseChanged {
                    from: phase,
                    to: target.phase(),
                });
                phase = target.phase();
            }
        }

        Ok(state)
    }
}

/// Transport wrapper that emits packet events.
struct ObservableTransport<'a, T: SerialTransport + ?Sized, O: FlashObserver> {
    inner: &'a T,
    observer: &'a Arc<O>,
}

impl<T: SerialTransport + ?Sized, O: FlashObserver> SerialTransport
    for ObservableTransport<'_, T, O>
{
    fn write(&self, data: &[u8]) -> Result<usize, TransportError> {
        let res = self.inner.write(data);
        if res.is_ok() {
            self.observer.on_event(&FlashEvent::Packet {
                direction: PacketDirection::Tx,
                length: data.len(),
                data: Some(data.iter().take(32).cloned().collect()),
            });
        }
        res
    }

    fn read(&self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let res = self.inner.read(buf);
        if let Ok(n) = &res
            && *n > 0
        {
            self.observer.on_event(&FlashEvent::Packet {
                direction: PacketDirection::Rx,
                length: *n,
                data: Some(buf[..*n].iter().take(32).cloned().collect()),
            });
        }
        res
    }

    fn close(&self) -> Result<(), TransportError> {
        // The session closes the real transport itself.
        Ok(())
    }

    fn name(&self) -> &str {
        self.inner.name()
    }

    fn baud_rate(&self) -> u32 {
        self.inner.baud_rate()
    }
}
