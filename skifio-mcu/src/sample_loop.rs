//! The per-tick sample loop task.
//!
//! Runs as a single `embassy-executor` task, intended to be spawned at
//! the board's highest task priority (board bring-up itself is out of
//! scope here). Owns the [`SkifIo`] driver exclusively — nothing else
//! ever touches the SPI bus or the DAC-enable pins — so the DAC
//! enable/disable edge implied by a `Connect`/disconnect transition is
//! applied here, polled once per tick against [`Session::is_dac_running`],
//! rather than from the RPMSG receive task that observes the transition.
//! At a 10 kHz tick rate that adds at most 100 us of latency versus
//! calling it directly from the receive task, which is not worth a
//! second owner of the hardware handle.

use core::cell::RefCell;

use critical_section::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use embedded_hal::digital::OutputPin;
use embedded_hal::spi::SpiBus;

use skifio_core::constants::{ADC_MSG_MAX_POINTS, DAC_BUFFER_SIZE, DAC_MSG_MAX_POINTS};
use skifio_core::point::{AdcArray, Point};
use skifio_core::ring::RingBuffer;
use skifio_core::stats::Statistics;

use skifio_hal::{DiscreteIo, SkifIo};

use crate::session::Session;

/// The MCU-side ADC ring holds one [`AdcArray`] per sample tick: one
/// combined ring, not `ADC_COUNT` separate ones, since every channel is
/// sampled together on every SPI transfer.
pub const ADC_RING_CAPACITY: usize = skifio_core::constants::ADC_BUFFER_SIZE;

/// Shared state the sample loop reads and writes every tick, alongside
/// the RPMSG tasks.
pub struct SampleLoop<'a, SPI, DAC, DIO> {
    skif: SkifIo<'a, SPI, DAC, DIO>,
    session: &'a Session,
    stats: &'a Mutex<RefCell<Statistics>>,
    dac_ring: &'a Mutex<RefCell<RingBuffer<Point, DAC_BUFFER_SIZE>>>,
    adc_ring: &'a Mutex<RefCell<RingBuffer<AdcArray, ADC_RING_CAPACITY>>>,
    send_signal: &'a Signal<CriticalSectionRawMutex, ()>,

    last_dac_point: Point,
    was_running: bool,
    prev_intr_count: u32,
    dac_msg_counter: usize,
    adc_msg_counter: usize,
}

impl<'a, SPI, DAC, DIO, SpiE> SampleLoop<'a, SPI, DAC, DIO>
where
    SPI: SpiBus<u8, Error = SpiE>,
    DAC: OutputPin,
    DIO: DiscreteIo,
{
    pub fn new(
        skif: SkifIo<'a, SPI, DAC, DIO>,
        session: &'a Session,
        stats: &'a Mutex<RefCell<Statistics>>,
        dac_ring: &'a Mutex<RefCell<RingBuffer<Point, DAC_BUFFER_SIZE>>>,
        adc_ring: &'a Mutex<RefCell<RingBuffer<AdcArray, ADC_RING_CAPACITY>>>,
        send_signal: &'a Signal<CriticalSectionRawMutex, ()>,
    ) -> Self {
        Self {
            skif,
            session,
            stats,
            dac_ring,
            adc_ring,
            send_signal,
            last_dac_point: 0,
            was_running: false,
            prev_intr_count: 0,
            dac_msg_counter: DAC_MSG_MAX_POINTS - 1,
            adc_msg_counter: ADC_MSG_MAX_POINTS - 1,
        }
    }

    /// Run forever, one iteration per sample-ready edge. Never returns;
    /// intended as the body of a spawned `embassy-executor` task.
    pub async fn run_forever(&mut self) -> ! {
        loop {
            self.tick().await;
        }
    }

    /// One pass of the ten-step pipeline. Returns on `wait_ready` timeout
    /// without advancing any counter, per step 1.
    pub async fn tick(&mut self) {
        // Step 1.
        if self.skif.wait_ready(1000).await.is_err() {
            return;
        }

        // DAC enable/disable edge, see module doc.
        let running = self.session.is_dac_running();
        if running && !self.was_running {
            self.skif.dac_enable();
        } else if !running && self.was_running {
            self.skif.dac_disable();
        }
        self.was_running = running;

        // Step 2.
        if let Some(dout) = self.session.take_dout_if_changed() {
            self.skif.dout_write(dout);
        }

        // Step 3.
        let din = self.skif.din_read();
        let mut ready = self.session.update_din(din);

        // Step 4.
        let intr_count = self.skif.irq().intr_count();
        critical_section::with(|cs| {
            let mut stats = self.stats.borrow(cs).borrow_mut();
            let delta = intr_count.wrapping_sub(self.prev_intr_count);
            if delta > stats.max_intrs_per_sample {
                stats.max_intrs_per_sample = delta;
            }
        });
        self.prev_intr_count = intr_count;

        // Step 5.
        if running {
            let popped = critical_section::with(|cs| {
                let mut ring = self.dac_ring.borrow(cs).borrow_mut();
                let mut out = [0 as Point; 1];
                if ring.read(&mut out) == 1 {
                    Some(out[0])
                } else {
                    None
                }
            });
            match popped {
                Some(point) => {
                    self.last_dac_point = point;
                    if self.dac_msg_counter == 0 {
                        self.dac_msg_counter = DAC_MSG_MAX_POINTS - 1;
                        ready = true;
                    } else {
                        self.dac_msg_counter -= 1;
                    }
                }
                None => {
                    critical_section::with(|cs| {
                        self.stats.borrow(cs).borrow_mut().dac.lost_empty += 1;
                    });
                }
            }
        }

        // Step 6. A CRC mismatch still yields a (best-effort) readback —
        // it's counted, not discarded, matching `smp_rdy_handler`/
        // `control.c`'s `ret = HAL_SUCCESS` after bumping
        // `crc_error_count`: steps 7-8 below run unconditionally on
        // whatever came back, only a real bus error skips them.
        let adc = match self.skif.transfer(self.last_dac_point) {
            Ok(frame) => {
                if !frame.crc_ok {
                    critical_section::with(|cs| {
                        self.stats.borrow(cs).borrow_mut().crc_error_count += 1;
                    });
                }
                Some(frame.adc)
            }
            Err(_) => None,
        };

        if let Some(adc) = adc {
            // Step 7.
            let pushed = critical_section::with(|cs| {
                let mut ring = self.adc_ring.borrow(cs).borrow_mut();
                ring.write(&[adc])
            });
            if pushed == 0 {
                critical_section::with(|cs| {
                    for lane in self.stats.borrow(cs).borrow_mut().adc.iter_mut() {
                        lane.lost_full += 1;
                    }
                });
            } else {
                critical_section::with(|cs| {
                    let mut stats = self.stats.borrow(cs).borrow_mut();
                    for (lane, value) in stats.adc.iter_mut().zip(adc.iter()) {
                        lane.value.update(*value);
                    }
                });
            }

            // Step 8.
            if self.adc_msg_counter == 0 {
                self.adc_msg_counter = ADC_MSG_MAX_POINTS - 1;
                ready = true;
            } else {
                self.adc_msg_counter -= 1;
            }
        }

        // Step 9.
        if ready {
            self.send_signal.signal(());
        }

        // Step 10.
        critical_section::with(|cs| {
            self.stats.borrow(cs).borrow_mut().sample_count += 1;
        });
    }
}
