// Recording flight sink shared by the integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use flowdeck_pilot::control::setpoint::VelocitySetpoint;
use flowdeck_pilot::supervisor::{sensor_channel, SensorLink};
use flowdeck_pilot::{Error, FlightCommander, Pilot, PilotConfig, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Arm,
    TakeOff(f32),
    SetVelocity(VelocitySetpoint),
    Land,
    Disarm,
}

pub struct RecordingSink {
    calls: Mutex<Vec<Call>>,
    land_duration: Duration,
    pub fail_velocity: AtomicBool,
    pub fail_take_off: AtomicBool,
}

impl RecordingSink {
    pub fn new(land_duration: Duration) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            land_duration,
            fail_velocity: AtomicBool::new(false),
            fail_take_off: AtomicBool::new(false),
        })
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, filter: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| filter(c)).count()
    }

    pub fn lands(&self) -> usize {
        self.count(|c| *c == Call::Land)
    }

    pub fn velocities(&self) -> Vec<VelocitySetpoint> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter_map(|c| match c {
                Call::SetVelocity(sp) => Some(*sp),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl FlightCommander for RecordingSink {
    async fn arm(&self) -> Result<()> {
        self.record(Call::Arm);
        Ok(())
    }

    async fn take_off(&self, height: f32) -> Result<()> {
        self.record(Call::TakeOff(height));
        if self.fail_take_off.load(Ordering::SeqCst) {
            return Err(Error::CommandFailure("take-off refused".to_owned()));
        }
        Ok(())
    }

    async fn set_velocity(&self, setpoint: &VelocitySetpoint) -> Result<()> {
        self.record(Call::SetVelocity(*setpoint));
        if self.fail_velocity.load(Ordering::SeqCst) {
            return Err(Error::CommandFailure("radio lost".to_owned()));
        }
        Ok(())
    }

    async fn land(&self) -> Result<()> {
        self.record(Call::Land);
        tokio::time::sleep(self.land_duration).await;
        Ok(())
    }

    async fn disarm(&self) -> Result<()> {
        self.record(Call::Disarm);
        Ok(())
    }
}

pub fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Start a pilot with the flow deck already confirmed
pub async fn armed(config: PilotConfig, sink: &Arc<RecordingSink>) -> (Pilot, SensorLink) {
    init();
    let (link, monitor) = sensor_channel();
    link.confirm_sensor(true);
    let pilot = Pilot::start(config, sink.clone(), monitor).await.unwrap();
    (pilot, link)
}
