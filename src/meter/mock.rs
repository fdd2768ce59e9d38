use crate::error::AppError;
use crate::meter::{PowerMeter, PowerReading};

#[derive(Debug, Clone, Copy)]
pub enum MockMeterBehavior {
    Reading(PowerReading),
    Fail,
}

impl MockMeterBehavior {
    pub fn charging(power_w: f64) -> Self {
        Self::Reading(PowerReading::charging(power_w))
    }

    pub fn idle() -> Self {
        Self::Reading(PowerReading::idle())
    }

    pub fn fail() -> Self {
        Self::Fail
    }
}

/// Replays scripted behaviors in order, then keeps reporting an idle charger.
#[derive(Debug)]
pub struct MockPowerMeter {
    behaviors: Vec<MockMeterBehavior>,
    next_index: usize,
}

impl MockPowerMeter {
    pub fn new(behaviors: Vec<MockMeterBehavior>) -> Self {
        Self {
            behaviors,
            next_index: 0,
        }
    }

    pub fn remaining(&self) -> usize {
        self.behaviors.len().saturating_sub(self.next_index)
    }

    fn next_behavior(&mut self) -> MockMeterBehavior {
        let behavior = self
            .behaviors
            .get(self.next_index)
            .copied()
            .unwrap_or_else(MockMeterBehavior::idle);
        self.next_index += 1;
        behavior
    }
}

impl PowerMeter for MockPowerMeter {
    fn read_power(&mut self) -> Result<PowerReading, AppError> {
        match self.next_behavior() {
            MockMeterBehavior::Reading(reading) => Ok(reading),
            MockMeterBehavior::Fail => Err(AppError::Meter("mock read failed".to_string())),
        }
    }
}
