//! The SkifIO board driver.
//!
//! One SPI transfer per sample tick, plus the discrete I/O and the
//! sample-ready/DAC-enable GPIOs around it. Generic over any
//! `embedded-hal`/`embedded-hal-async` implementation, the way
//! `vorago-shared-hal`'s GPIO/SPI modules are generic over pin/bus
//! traits rather than tied to one chip family — this board can sit
//! behind whatever MCU HAL is available.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use embassy_time::{with_timeout, Duration, Instant};
use embedded_hal::digital::OutputPin;
use embedded_hal::spi::SpiBus;

use core::cell::Cell;
use core::sync::atomic::{AtomicU32, Ordering};

use skifio_core::point::Point;

use crate::frame::{decode_rx, encode_tx, FRAME_LEN};

/// Busy-wait delay after the sample-ready edge, before the SPI transfer,
/// to let the external ADC's sampled value settle.
pub const READY_DELAY_NS: u32 = 500;

/// Number of sample-ready interrupts to ignore at startup
/// (`FIRST_SAMPLES_TO_SKIP`).
pub use skifio_core::constants::FIRST_SAMPLES_TO_SKIP;

/// Discrete I/O: 8 input pins read as a bitmask, 4 output pins written
/// from the low nibble of a bitmask.
///
/// The SkifIO board multiplexes these through a single register rather
/// than exposing 12 individual GPIO lines, so this is a board-level
/// trait rather than per-pin `embedded-hal` traits.
pub trait DiscreteIo {
    fn read_din(&mut self) -> u8;
    fn write_dout(&mut self, mask: u8);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<SpiE> {
    /// `wait_ready` did not see the sample-ready edge within the timeout.
    TimedOut,
    /// The underlying SPI bus reported an error.
    Spi(SpiE),
}

/// ISR-side counters, shared with [`SkifIo`] via `&'static` references.
///
/// The real ISR handler (board-specific, not written here) calls
/// [`SampleReadyIrq::on_edge`] on the
/// sample-ready pin's rising edge; everything after that is portable.
pub struct SampleReadyIrq {
    signal: Signal<CriticalSectionRawMutex, ()>,
    intr_count: AtomicU32,
    /// Sample-ready edges still to be swallowed at startup
    /// (`FIRST_SAMPLES_TO_SKIP`).
    skip_remaining: AtomicU32,
}

impl SampleReadyIrq {
    pub const fn new() -> Self {
        Self {
            signal: Signal::new(),
            intr_count: AtomicU32::new(0),
            skip_remaining: AtomicU32::new(FIRST_SAMPLES_TO_SKIP),
        }
    }

    /// Call from interrupt context on the sample-ready edge.
    ///
    /// The first `FIRST_SAMPLES_TO_SKIP` edges are swallowed entirely —
    /// no interrupt count, no semaphore give — matching
    /// `smp_rdy_handler`'s `sample_skip_counter` gate in the original
    /// firmware: while the counter is nonzero it is only decremented,
    /// and the sample-loop task never wakes for that edge.
    pub fn on_edge(&self) {
        if self.skip_remaining.load(Ordering::Relaxed) > 0 {
            self.skip_remaining.fetch_sub(1, Ordering::Relaxed);
            return;
        }
        self.intr_count.fetch_add(1, Ordering::Relaxed);
        self.signal.signal(());
    }

    /// Current raw interrupt count, used by the sample loop to derive
    /// `max_intrs_per_sample`.
    pub fn intr_count(&self) -> u32 {
        self.intr_count.load(Ordering::Relaxed)
    }
}

impl Default for SampleReadyIrq {
    fn default() -> Self {
        Self::new()
    }
}

/// ISR-level discrete-input edge hook, independent of the sample loop's
/// own per-tick `din_read` polling: the real board's GPIO edge ISR
/// (board-specific, out of scope here) calls
/// [`DinIrq::on_edge`] with the freshly-read bitmask, and whatever is
/// registered via [`DinIrq::subscribe`] runs from that interrupt context.
///
/// Plain `fn` pointer rather than a boxed closure, the way `hpm-hal`'s
/// own GPIO edge callbacks are registered — no allocator, no captured
/// state beyond what the caller encodes in the mask itself.
pub struct DinIrq {
    callback: critical_section::Mutex<Cell<Option<fn(u8)>>>,
}

impl DinIrq {
    pub const fn new() -> Self {
        Self {
            callback: critical_section::Mutex::new(Cell::new(None)),
        }
    }

    /// Register (or replace) the edge callback.
    pub fn subscribe(&self, cb: fn(u8)) {
        critical_section::with(|cs| self.callback.borrow(cs).set(Some(cb)));
    }

    /// Call from interrupt context on any din-pin edge, with the current
    /// din bitmask.
    pub fn on_edge(&self, value: u8) {
        let cb = critical_section::with(|cs| self.callback.borrow(cs).get());
        if let Some(cb) = cb {
            cb(value);
        }
    }
}

impl Default for DinIrq {
    fn default() -> Self {
        Self::new()
    }
}

/// The SkifIO board driver.
pub struct SkifIo<'a, SPI, DAC, DIO> {
    spi: SPI,
    dac_key: DAC,
    dio: DIO,
    irq: &'a SampleReadyIrq,
}

impl<'a, SPI, DAC, DIO, SpiE> SkifIo<'a, SPI, DAC, DIO>
where
    SPI: SpiBus<u8, Error = SpiE>,
    DAC: OutputPin,
    DIO: DiscreteIo,
{
    /// Wire up the already-configured peripherals. Pin mux / SPI
    /// clock-rate configuration is assumed done by the caller (board
    /// bring-up is out of scope here); this only assembles the handles.
    /// Most callers want [`SkifIo::init`] instead, which also puts the
    /// board into its running state.
    pub fn new(spi: SPI, dac_key: DAC, dio: DIO, irq: &'a SampleReadyIrq) -> Self {
        Self {
            spi,
            dac_key,
            dio,
            irq,
        }
    }

    /// Bring the board up: wire the peripherals together (as [`SkifIo::new`])
    /// and leave the DAC disabled until a `Connect` handshake enables it
    /// (§4.E/§4.F) — the GPIO group/SPI master configuration itself
    /// (clock tree, pin mux) is board bring-up, out of scope here and
    /// assumed already done by the caller before the peripherals are
    /// handed over.
    pub fn init(spi: SPI, dac_key: DAC, dio: DIO, irq: &'a SampleReadyIrq) -> Self {
        let mut skif = Self::new(spi, dac_key, dio, irq);
        skif.dac_disable();
        skif
    }

    /// Tear the board down: disable the DAC output key. Releases the
    /// peripheral handles back to the caller; nothing else to undo since
    /// this driver never enables any board state `new`/`init` didn't
    /// already own.
    pub fn deinit(mut self) -> (SPI, DAC, DIO) {
        self.dac_disable();
        (self.spi, self.dac_key, self.dio)
    }

    /// Block until the sample-ready semaphore is signalled, or time out.
    /// On success, busy-waits `READY_DELAY_NS` before returning so the
    /// caller's subsequent `transfer` sees a settled ADC input.
    pub async fn wait_ready(&mut self, timeout_ms: u64) -> Result<(), Error<SpiE>> {
        with_timeout(Duration::from_millis(timeout_ms), self.irq.signal.wait())
            .await
            .map_err(|_| Error::TimedOut)?;
        let deadline = Instant::now() + Duration::from_micros((READY_DELAY_NS / 1000).max(1) as u64);
        while Instant::now() < deadline {
            core::hint::spin_loop();
        }
        Ok(())
    }

    /// The sample-ready interrupt counter, for deriving
    /// `max_intrs_per_sample`.
    pub fn irq(&self) -> &'a SampleReadyIrq {
        self.irq
    }

    /// One SPI transfer: write `dac_code` out, return the six ADC codes
    /// (plus temp/status, plus whether the RX CRC matched) read back.
    /// Fails only if the bus itself errors; a CRC mismatch is reported
    /// through [`crate::frame::RxFrame::crc_ok`] rather than as an `Err`,
    /// since the readback is still usable best-effort — the sample loop
    /// counts the error and keeps going rather than retrying.
    pub fn transfer(&mut self, dac_code: Point) -> Result<crate::frame::RxFrame, Error<SpiE>> {
        let mut tx = [0u8; FRAME_LEN];
        encode_tx(dac_code, &mut tx);
        let mut rx = [0u8; FRAME_LEN];
        self.spi.transfer(&mut rx, &tx).map_err(Error::Spi)?;
        Ok(decode_rx(&rx))
    }

    pub fn dac_enable(&mut self) {
        let _ = self.dac_key.set_high();
    }

    pub fn dac_disable(&mut self) {
        let _ = self.dac_key.set_low();
    }

    pub fn din_read(&mut self) -> u8 {
        self.dio.read_din()
    }

    /// Write the discrete output nibble. Silently masks to the low 4
    /// bits; callers that care about the high-bit-set case should check
    /// before calling (the mask-and-warn invariant lives in the caller
    /// that owns logging — this driver only does the mask).
    pub fn dout_write(&mut self, mask: u8) {
        self.dio.write_dout(mask & 0x0F);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal::spi::ErrorType;

    struct LoopbackSpi;
    impl ErrorType for LoopbackSpi {
        type Error = core::convert::Infallible;
    }
    impl SpiBus<u8> for LoopbackSpi {
        fn read(&mut self, _words: &mut [u8]) -> Result<(), Self::Error> {
            Ok(())
        }
        fn write(&mut self, _words: &[u8]) -> Result<(), Self::Error> {
            Ok(())
        }
        fn transfer(&mut self, read: &mut [u8], write: &[u8]) -> Result<(), Self::Error> {
            // Echo back a validly-CRC'd all-zero ADC frame regardless of tx.
            let mut buf = [0u8; FRAME_LEN];
            let crc = crate::frame::crc16(&buf[0..26]);
            buf[26..28].copy_from_slice(&crc.to_ne_bytes());
            read.copy_from_slice(&buf);
            let _ = write;
            Ok(())
        }
        fn transfer_in_place(&mut self, _words: &mut [u8]) -> Result<(), Self::Error> {
            Ok(())
        }
        fn flush(&mut self) -> Result<(), Self::Error> {
            Ok(())
        }
    }

    struct DummyPin(bool);
    impl embedded_hal::digital::ErrorType for DummyPin {
        type Error = core::convert::Infallible;
    }
    impl OutputPin for DummyPin {
        fn set_low(&mut self) -> Result<(), Self::Error> {
            self.0 = false;
            Ok(())
        }
        fn set_high(&mut self) -> Result<(), Self::Error> {
            self.0 = true;
            Ok(())
        }
    }

    struct DummyDio {
        din: u8,
        dout: u8,
    }
    impl DiscreteIo for DummyDio {
        fn read_din(&mut self) -> u8 {
            self.din
        }
        fn write_dout(&mut self, mask: u8) {
            self.dout = mask;
        }
    }

    #[test]
    fn transfer_decodes_valid_frame() {
        let irq = SampleReadyIrq::new();
        let mut skif = SkifIo::new(
            LoopbackSpi,
            DummyPin(false),
            DummyDio { din: 0, dout: 0 },
            &irq,
        );
        let frame = skif.transfer(7).expect("bus transfer succeeds");
        assert!(frame.crc_ok);
        assert_eq!(frame.adc, [0; 6]);
    }

    #[test]
    fn on_edge_swallows_first_samples_to_skip() {
        let irq = SampleReadyIrq::new();
        for _ in 0..FIRST_SAMPLES_TO_SKIP {
            irq.on_edge();
        }
        assert_eq!(irq.intr_count(), 0);
        assert!(!irq.signal.signaled());

        irq.on_edge();
        assert_eq!(irq.intr_count(), 1);
        assert!(irq.signal.signaled());
    }

    #[test]
    fn init_leaves_dac_disabled() {
        let irq = SampleReadyIrq::new();
        let skif = SkifIo::init(
            LoopbackSpi,
            DummyPin(true),
            DummyDio { din: 0, dout: 0 },
            &irq,
        );
        assert!(!skif.dac_key.0);
    }

    #[test]
    fn deinit_disables_dac_and_returns_peripherals() {
        let irq = SampleReadyIrq::new();
        let mut skif = SkifIo::new(
            LoopbackSpi,
            DummyPin(false),
            DummyDio { din: 0, dout: 0 },
            &irq,
        );
        skif.dac_enable();
        let (_spi, dac_key, _dio) = skif.deinit();
        assert!(!dac_key.0);
    }

    #[test]
    fn dout_write_masks_high_bits() {
        let irq = SampleReadyIrq::new();
        let mut skif = SkifIo::new(
            LoopbackSpi,
            DummyPin(false),
            DummyDio { din: 0, dout: 0 },
            &irq,
        );
        skif.dout_write(0xF5);
        assert_eq!(skif.dio.dout, 0x05);
    }

    #[test]
    fn din_irq_invokes_registered_callback() {
        static LAST_SEEN: AtomicU32 = AtomicU32::new(0);
        fn on_din_edge(value: u8) {
            LAST_SEEN.store(value as u32, Ordering::Relaxed);
        }

        let din_irq = DinIrq::new();
        din_irq.on_edge(0x2A);
        assert_eq!(LAST_SEEN.load(Ordering::Relaxed), 0);

        din_irq.subscribe(on_din_edge);
        din_irq.on_edge(0x2A);
        assert_eq!(LAST_SEEN.load(Ordering::Relaxed), 0x2A);
    }

    #[test]
    fn dac_enable_disable_toggles_pin() {
        let irq = SampleReadyIrq::new();
        let mut skif = SkifIo::new(
            LoopbackSpi,
            DummyPin(false),
            DummyDio { din: 0, dout: 0 },
            &irq,
        );
        skif.dac_enable();
        assert!(skif.dac_key.0);
        skif.dac_disable();
        assert!(!skif.dac_key.0);
    }
}
