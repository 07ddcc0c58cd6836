//! Loopback pulse driver.
//!
//! Stands in for the GPIO/PWM hardware: every emission is echoed back
//! verbatim, and an acknowledgment edge is scheduled onto the event channel
//! after a configurable delay, simulating the device's ack line response.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tracing::{debug, info};

use irtrans_core::{DriverEvent, PulseDriver, PulsePair, Result};

pub struct LoopbackDriver {
    events: mpsc::Sender<DriverEvent>,
    ack_delay: Duration,
    level: AtomicBool,
}

impl LoopbackDriver {
    pub fn new(events: mpsc::Sender<DriverEvent>, ack_delay: Duration) -> Self {
        Self {
            events,
            ack_delay,
            level: AtomicBool::new(false),
        }
    }
}

impl PulseDriver for LoopbackDriver {
    fn emit(&self, pairs: &[PulsePair]) -> Result<Vec<PulsePair>> {
        info!("loopback emit of {} pairs", pairs.len());
        // the simulated device toggles its state line on every command
        self.level.fetch_xor(true, Ordering::SeqCst);

        let events = self.events.clone();
        let delay = self.ack_delay;
        std::thread::spawn(move || {
            std::thread::sleep(delay);
            if events
                .blocking_send(DriverEvent::AckEdge(Instant::now()))
                .is_err()
            {
                debug!("event channel closed, ack edge dropped");
            }
        });

        Ok(pairs.to_vec())
    }

    fn ack_level(&self) -> Option<bool> {
        Some(self.level.load(Ordering::SeqCst))
    }
}
