//! FPGA configuration sequencer
//!
//! Drives the full SPI-slave configuration protocol (Lattice TN1248, figure
//! 13.3 style): reset pulse, dummy clocks, chunked bitstream streaming,
//! completion padding + CDONE poll, activation padding, and chip-select
//! handoff back to the hardware-routed signal.
//!
//! One `load` call is one session. The loader registers a transient logical
//! SPI device and takes the bus token for the whole session; both are
//! released on every exit path once acquired, so a failed load leaves the
//! system ready for a fresh attempt. There are no internal retries.

use crate::arbiter::BusArbiter;
use crate::buffer::TransferBuffer;
use crate::error::{LoadError, Result};
use crate::hal::{
    ChipSelect, Clock, CsPolicy, DeviceHandle, GpioPin, SpiBus, SpiDeviceConfig, SpiMode,
};
use crate::source::{BitstreamSource, FileSource, MemorySource};

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Completion padding: 13 bytes = 104 clocks, above the required 100
const COMPLETION_PADDING_BYTES: usize = 13;

/// Activation padding: 7 bytes = 56 clocks, above the required 49
const ACTIVATION_PADDING_BYTES: usize = 7;

/// Default SPI clock for configuration mode
const DEFAULT_CLOCK_HZ: u32 = 10_000_000;

/// Default maximum chunk size for one streaming transaction
const DEFAULT_MAX_CHUNK: usize = 4096;

/// Tunable timing and sizing for a deployment. Fixed per deployment, not
/// negotiated at runtime.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// SPI clock frequency while configuring
    pub clock_hz: u32,
    /// Maximum bytes per streaming transaction
    pub max_chunk: usize,
    /// How long to wait for CDONE after the bitstream
    pub completion_timeout: Duration,
    /// Sleep between CDONE samples
    pub poll_interval: Duration,
    /// Reset-low hold time (datasheet floor is 200 ns)
    pub reset_pulse: Duration,
    /// Settle time after releasing reset (datasheet floor is 1.2 ms)
    pub reset_settle: Duration,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        LoaderConfig {
            clock_hz: DEFAULT_CLOCK_HZ,
            max_chunk: DEFAULT_MAX_CHUNK,
            completion_timeout: Duration::from_millis(100),
            poll_interval: Duration::from_millis(1),
            reset_pulse: Duration::from_millis(1),
            reset_settle: Duration::from_millis(2),
        }
    }
}

/// The three control lines the protocol sequences besides the SPI signals
#[derive(Debug)]
pub struct ControlPins<R, D, C> {
    /// CRESET, active low: asserts configuration mode
    pub creset: R,
    /// CDONE, input: asserted by the FPGA once configuration loaded
    pub cdone: D,
    /// Chip select with manual/hardware routing control
    pub cs: C,
}

/// Observer for streaming progress. All methods default to no-ops.
pub trait LoadProgress {
    /// Streaming is about to begin for `total` bytes
    fn started(&mut self, total: usize) {
        let _ = total;
    }

    /// A chunk was transmitted; `sent` of `total` bytes are on the wire
    fn chunk_loaded(&mut self, sent: usize, total: usize) {
        let _ = (sent, total);
    }

    /// The whole bitstream has been transmitted
    fn finished(&mut self) {}
}

/// No-op progress observer
#[derive(Debug, Default)]
pub struct NoProgress;

impl LoadProgress for NoProgress {}

/// Configuration sequencer for one FPGA on one shared bus.
///
/// Owns its HAL endpoints; the [`BusArbiter`] is shared with every other
/// user of the same physical bus.
pub struct Loader<B, R, D, C, K> {
    bus: B,
    arbiter: Arc<BusArbiter>,
    pins: ControlPins<R, D, C>,
    clock: K,
    config: LoaderConfig,
}

impl<B, R, D, C, K> Loader<B, R, D, C, K>
where
    B: SpiBus,
    R: GpioPin,
    D: GpioPin,
    C: ChipSelect,
    K: Clock,
{
    /// Create a loader from its hardware endpoints
    pub fn new(
        bus: B,
        arbiter: Arc<BusArbiter>,
        pins: ControlPins<R, D, C>,
        clock: K,
        config: LoaderConfig,
    ) -> Self {
        Loader {
            bus,
            arbiter,
            pins,
            clock,
            config,
        }
    }

    /// Load a bitstream from an in-memory region
    pub fn load_from_slice(&mut self, data: &[u8]) -> Result<()> {
        let mut source = MemorySource::new(data)?;
        self.load(&mut source)
    }

    /// Load a bitstream from sequential file storage
    pub fn load_from_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let mut source = FileSource::open(path)?;
        self.load(&mut source)
    }

    /// Run one full configuration session
    pub fn load<S: BitstreamSource + ?Sized>(&mut self, source: &mut S) -> Result<()> {
        self.load_with_progress(source, &mut NoProgress)
    }

    /// Run one full configuration session, reporting streaming progress
    pub fn load_with_progress<S: BitstreamSource + ?Sized>(
        &mut self,
        source: &mut S,
        progress: &mut dyn LoadProgress,
    ) -> Result<()> {
        let device_config = SpiDeviceConfig {
            clock_hz: self.config.clock_hz,
            mode: SpiMode::Mode3,
            cs: CsPolicy::Manual,
        };
        let device = self
            .bus
            .register_device(&device_config)
            .map_err(LoadError::BusInitFailed)?;

        // Acquire through a local handle so the token does not borrow `self`
        // across the session.
        let arbiter = Arc::clone(&self.arbiter);
        let token = match arbiter.acquire() {
            Ok(token) => token,
            Err(e) => {
                log::error!("failed to acquire SPI bus");
                if let Err(e) = self.bus.deregister_device(device) {
                    log::warn!("failed to deregister configuration device: {}", e);
                }
                return Err(e);
            }
        };

        let result = self.run_session(device, source, progress);

        // Cleanup runs on every path from here on: the transient device and
        // the bus token are never leaked past the session.
        if let Err(e) = self.bus.deregister_device(device) {
            log::warn!("failed to deregister configuration device: {}", e);
        }
        drop(token);

        if result.is_ok() {
            log::info!("FPGA configuration complete");
        }
        result
    }

    fn run_session<S: BitstreamSource + ?Sized>(
        &mut self,
        device: DeviceHandle,
        source: &mut S,
        progress: &mut dyn LoadProgress,
    ) -> Result<()> {
        let chunk_size = self.config.max_chunk.min(self.bus.max_transfer_len());
        if chunk_size == 0 {
            return Err(LoadError::InvalidInput(
                "chunk size must be nonzero".to_string(),
            ));
        }
        // The padding phases reuse the same buffer, so it must fit them too.
        let mut buffer = TransferBuffer::allocate(chunk_size.max(COMPLETION_PADDING_BYTES))?;

        // Reset: CRESET low, CS driven low manually, hold, release, settle.
        self.pins.creset.set(false);
        self.pins.cs.set_manual(false);
        self.clock.delay(self.config.reset_pulse);
        self.pins.creset.set(true);
        self.clock.delay(self.config.reset_settle);

        // Dummy clocks: 8 edges with CS high before the real stream.
        self.pins.cs.set_manual(true);
        self.bus
            .transmit(device, buffer.zeroed(1))
            .map_err(LoadError::TransmitFailed)?;
        self.pins.cs.set_manual(false);

        // Stream the bitstream in bounded chunks.
        let total = source.size();
        let mut remaining = total;
        log::info!("loading {} byte bitstream", total);
        progress.started(total);

        while remaining > 0 {
            let len = remaining.min(chunk_size);
            let chunk = buffer.chunk_mut(len);
            let got = source.read(chunk);
            if got != len {
                log::error!("source read mismatch: expected {}, got {}", len, got);
                return Err(LoadError::SourceReadMismatch { expected: len, got });
            }
            self.bus
                .transmit(device, chunk)
                .map_err(LoadError::TransmitFailed)?;
            remaining -= len;
            progress.chunk_loaded(total - remaining, total);
        }
        progress.finished();

        // Completion: CS high, >=100 padding clocks, then poll CDONE. A
        // timeout is recorded but activation and handoff still run, so the
        // bus is parked in a known state even on failure.
        self.pins.cs.set_manual(true);
        self.bus
            .transmit(device, buffer.zeroed(COMPLETION_PADDING_BYTES))
            .map_err(LoadError::TransmitFailed)?;
        let completion = self.wait_for_completion();

        // Activation: >=49 more clocks to bring up the device I/O.
        self.bus
            .transmit(device, buffer.zeroed(ACTIVATION_PADDING_BYTES))
            .map_err(LoadError::TransmitFailed)?;

        // Handoff: CS back to the hardware-routed signal for steady-state use.
        self.pins.cs.set_manual(true);
        self.pins.cs.restore_hardware();

        completion
    }

    fn wait_for_completion(&mut self) -> Result<()> {
        let deadline = self.clock.now() + self.config.completion_timeout;
        while !self.pins.cdone.get() {
            if self.clock.now() > deadline {
                log::error!("CDONE timeout: configuration failed");
                return Err(LoadError::CompletionTimeout(self.config.completion_timeout));
            }
            self.clock.delay(self.config.poll_interval);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HalError;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Event {
        Register,
        Deregister,
        Transmit(usize),
        Creset(bool),
        Cs(bool),
        CsHardware,
        CdoneSample(bool),
    }

    type Log = Rc<RefCell<Vec<Event>>>;

    struct MockBus {
        log: Log,
        registered: Option<u32>,
        next_id: u32,
        fail_register: bool,
        fail_transmit_at: Option<usize>,
        transmits: usize,
        max_len: usize,
    }

    impl MockBus {
        fn new(log: Log) -> Self {
            MockBus {
                log,
                registered: None,
                next_id: 0,
                fail_register: false,
                fail_transmit_at: None,
                transmits: 0,
                max_len: usize::MAX,
            }
        }
    }

    impl SpiBus for MockBus {
        fn register_device(
            &mut self,
            config: &SpiDeviceConfig,
        ) -> std::result::Result<DeviceHandle, HalError> {
            assert_eq!(config.mode, SpiMode::Mode3);
            assert_eq!(config.cs, CsPolicy::Manual);
            if self.fail_register {
                return Err(HalError::DeviceRegistration);
            }
            if self.registered.is_some() {
                return Err(HalError::DeviceBusy);
            }
            self.next_id += 1;
            self.registered = Some(self.next_id);
            self.log.borrow_mut().push(Event::Register);
            Ok(DeviceHandle::from_raw(self.next_id))
        }

        fn deregister_device(&mut self, handle: DeviceHandle) -> std::result::Result<(), HalError> {
            if self.registered != Some(handle.raw()) {
                return Err(HalError::InvalidHandle);
            }
            self.registered = None;
            self.log.borrow_mut().push(Event::Deregister);
            Ok(())
        }

        fn transmit(
            &mut self,
            handle: DeviceHandle,
            data: &[u8],
        ) -> std::result::Result<(), HalError> {
            assert_eq!(self.registered, Some(handle.raw()));
            assert!(data.len() <= self.max_len);
            if self.fail_transmit_at == Some(self.transmits) {
                self.transmits += 1;
                return Err(HalError::Transfer);
            }
            self.transmits += 1;
            self.log.borrow_mut().push(Event::Transmit(data.len()));
            Ok(())
        }

        fn max_transfer_len(&self) -> usize {
            self.max_len
        }
    }

    struct MockCreset {
        log: Log,
    }

    impl GpioPin for MockCreset {
        fn set(&mut self, level: bool) {
            self.log.borrow_mut().push(Event::Creset(level));
        }

        fn get(&self) -> bool {
            unreachable!("CRESET is never sampled")
        }
    }

    struct MockCdone {
        log: Log,
        asserted: bool,
    }

    impl GpioPin for MockCdone {
        fn set(&mut self, _level: bool) {
            unreachable!("CDONE is input only")
        }

        fn get(&self) -> bool {
            self.log.borrow_mut().push(Event::CdoneSample(self.asserted));
            self.asserted
        }
    }

    struct MockCs {
        log: Log,
    }

    impl ChipSelect for MockCs {
        fn set_manual(&mut self, level: bool) {
            self.log.borrow_mut().push(Event::Cs(level));
        }

        fn restore_hardware(&mut self) {
            self.log.borrow_mut().push(Event::CsHardware);
        }
    }

    /// Virtual clock: delays advance time without sleeping
    struct MockClock {
        now: Duration,
    }

    impl Clock for MockClock {
        fn delay(&mut self, duration: Duration) {
            self.now += duration;
        }

        fn now(&self) -> Duration {
            self.now
        }
    }

    type TestLoader = Loader<MockBus, MockCreset, MockCdone, MockCs, MockClock>;

    fn harness(cdone_asserted: bool) -> (TestLoader, Log, Arc<BusArbiter>) {
        let log: Log = Rc::new(RefCell::new(Vec::new()));
        let arbiter = Arc::new(BusArbiter::new());
        let loader = Loader::new(
            MockBus::new(Rc::clone(&log)),
            Arc::clone(&arbiter),
            ControlPins {
                creset: MockCreset {
                    log: Rc::clone(&log),
                },
                cdone: MockCdone {
                    log: Rc::clone(&log),
                    asserted: cdone_asserted,
                },
                cs: MockCs {
                    log: Rc::clone(&log),
                },
            },
            MockClock {
                now: Duration::ZERO,
            },
            LoaderConfig::default(),
        );
        (loader, log, arbiter)
    }

    /// Source with a declared size that its reads may not honor
    struct ScriptedSource {
        declared: usize,
        yields: Vec<usize>,
        call: usize,
    }

    impl BitstreamSource for ScriptedSource {
        fn size(&self) -> usize {
            self.declared
        }

        fn read(&mut self, buf: &mut [u8]) -> usize {
            let cap = self.yields.get(self.call).copied().unwrap_or(0);
            self.call += 1;
            let n = buf.len().min(cap);
            buf[..n].fill(0);
            n
        }
    }

    fn transmit_lens(log: &Log) -> Vec<usize> {
        log.borrow()
            .iter()
            .filter_map(|e| match e {
                Event::Transmit(len) => Some(*len),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn full_protocol_order() {
        let (mut loader, log, _) = harness(true);
        let data = vec![0xA5u8; 100];
        loader.load_from_slice(&data).unwrap();

        let events = log.borrow().clone();
        assert_eq!(
            events,
            vec![
                Event::Register,
                Event::Creset(false),
                Event::Cs(false),
                Event::Creset(true),
                Event::Cs(true),
                Event::Transmit(1),
                Event::Cs(false),
                Event::Transmit(100),
                Event::Cs(true),
                Event::Transmit(13),
                Event::CdoneSample(true),
                Event::Transmit(7),
                Event::Cs(true),
                Event::CsHardware,
                Event::Deregister,
            ]
        );
    }

    #[test]
    fn streaming_chunk_accounting() {
        let (mut loader, log, _) = harness(true);
        loader.config.max_chunk = 4096;
        let data = vec![0u8; 10_000];
        loader.load_from_slice(&data).unwrap();

        let lens = transmit_lens(&log);
        // dummy byte, then ceil(10000/4096) = 3 chunks, then the two pads
        assert_eq!(lens.first(), Some(&1));
        let chunks = &lens[1..lens.len() - 2];
        assert_eq!(chunks, &[4096, 4096, 1808]);
        assert!(chunks.iter().all(|&c| c <= 4096));
        assert_eq!(chunks.iter().sum::<usize>(), 10_000);
        assert_eq!(&lens[lens.len() - 2..], &[13, 7]);
    }

    #[test]
    fn chunk_size_clamps_to_bus_limit() {
        let (mut loader, log, _) = harness(true);
        loader.bus.max_len = 1024;
        let data = vec![0u8; 3000];
        loader.load_from_slice(&data).unwrap();

        let lens = transmit_lens(&log);
        let chunks = &lens[1..lens.len() - 2];
        assert_eq!(chunks, &[1024, 1024, 952]);
    }

    #[test]
    fn empty_source_skips_streaming_but_completes() {
        let (mut loader, log, _) = harness(true);
        let mut source = ScriptedSource {
            declared: 0,
            yields: vec![],
            call: 0,
        };
        loader.load(&mut source).unwrap();

        assert_eq!(transmit_lens(&log), vec![1, 13, 7]);
        assert!(log.borrow().contains(&Event::CsHardware));
    }

    #[test]
    fn single_chunk_bitstream() {
        let (mut loader, log, _) = harness(true);
        loader.config.max_chunk = 256;
        let data = vec![0u8; 256];
        loader.load_from_slice(&data).unwrap();

        let lens = transmit_lens(&log);
        assert_eq!(lens, vec![1, 256, 13, 7]);
    }

    #[test]
    fn short_read_aborts_with_no_further_transmissions() {
        let (mut loader, log, arbiter) = harness(true);
        loader.config.max_chunk = 60;
        let mut source = ScriptedSource {
            declared: 100,
            yields: vec![60, 20],
            call: 0,
        };

        let err = loader.load(&mut source).unwrap_err();
        assert!(matches!(
            err,
            LoadError::SourceReadMismatch {
                expected: 40,
                got: 20
            }
        ));

        // Dummy byte and the one good chunk went out; nothing after.
        assert_eq!(transmit_lens(&log), vec![1, 60]);
        assert!(!log.borrow().contains(&Event::CsHardware));
        // Resources are released regardless.
        assert_eq!(log.borrow().last(), Some(&Event::Deregister));
        assert!(arbiter.try_acquire().is_some());
    }

    #[test]
    fn completion_timeout_still_hands_off() {
        let (mut loader, log, arbiter) = harness(false);
        let data = vec![0u8; 32];

        let err = loader.load_from_slice(&data).unwrap_err();
        assert!(matches!(err, LoadError::CompletionTimeout(_)));

        // Activation padding and handoff still ran, and the bus is free.
        let lens = transmit_lens(&log);
        assert_eq!(&lens[lens.len() - 2..], &[13, 7]);
        assert!(log.borrow().contains(&Event::CsHardware));
        assert_eq!(log.borrow().last(), Some(&Event::Deregister));
        assert!(arbiter.try_acquire().is_some());
    }

    #[test]
    fn cdone_sampled_before_activation_padding() {
        let (mut loader, log, _) = harness(true);
        let data = vec![0u8; 16];
        loader.load_from_slice(&data).unwrap();

        let events = log.borrow().clone();
        let sample = events
            .iter()
            .position(|e| matches!(e, Event::CdoneSample(true)))
            .expect("CDONE never sampled");
        let activation = events
            .iter()
            .rposition(|e| matches!(e, Event::Transmit(7)))
            .unwrap();
        assert!(sample < activation);
    }

    #[test]
    fn transmit_failure_aborts_and_releases() {
        let (mut loader, log, arbiter) = harness(true);
        loader.bus.fail_transmit_at = Some(0); // dummy-clock byte fails
        let data = vec![0u8; 64];

        let err = loader.load_from_slice(&data).unwrap_err();
        assert!(matches!(err, LoadError::TransmitFailed(HalError::Transfer)));
        assert_eq!(transmit_lens(&log), Vec::<usize>::new());
        assert_eq!(log.borrow().last(), Some(&Event::Deregister));
        assert!(arbiter.try_acquire().is_some());
    }

    #[test]
    fn register_failure_runs_no_protocol_steps() {
        let (mut loader, log, arbiter) = harness(true);
        loader.bus.fail_register = true;

        let err = loader.load_from_slice(&[0u8; 8]).unwrap_err();
        assert!(matches!(err, LoadError::BusInitFailed(_)));
        assert!(log.borrow().is_empty());
        assert!(arbiter.try_acquire().is_some());
    }

    #[test]
    fn zero_chunk_size_is_rejected() {
        let (mut loader, log, arbiter) = harness(true);
        loader.config.max_chunk = 0;

        let err = loader.load_from_slice(&[0u8; 16]).unwrap_err();
        assert!(matches!(err, LoadError::InvalidInput(_)));

        // No protocol steps ran; the device and the bus are released.
        let events = log.borrow().clone();
        assert_eq!(events, vec![Event::Register, Event::Deregister]);
        assert!(arbiter.try_acquire().is_some());
    }

    #[test]
    fn zero_bus_transfer_limit_is_rejected() {
        let (mut loader, _, arbiter) = harness(true);
        loader.bus.max_len = 0;

        let err = loader.load_from_slice(&[0u8; 16]).unwrap_err();
        assert!(matches!(err, LoadError::InvalidInput(_)));
        assert!(arbiter.try_acquire().is_some());
    }

    #[test]
    fn progress_reports_monotonic_byte_counts() {
        struct Recorder {
            started: Option<usize>,
            updates: Vec<usize>,
            finished: bool,
        }
        impl LoadProgress for Recorder {
            fn started(&mut self, total: usize) {
                self.started = Some(total);
            }
            fn chunk_loaded(&mut self, sent: usize, _total: usize) {
                self.updates.push(sent);
            }
            fn finished(&mut self) {
                self.finished = true;
            }
        }

        let (mut loader, _, _) = harness(true);
        loader.config.max_chunk = 1000;
        let data = vec![0u8; 2500];
        let mut source = MemorySource::new(&data).unwrap();
        let mut progress = Recorder {
            started: None,
            updates: vec![],
            finished: false,
        };
        loader.load_with_progress(&mut source, &mut progress).unwrap();

        assert_eq!(progress.started, Some(2500));
        assert_eq!(progress.updates, vec![1000, 2000, 2500]);
        assert!(progress.finished);
    }
}
