use std::time::Duration;

/// Delay schedule for polling an eventually consistent listing. Each wait is
/// one `unit` plus `growth` times the time already spent waiting; polling
/// gives up once the elapsed time exceeds `limit`.
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    unit: Duration,
    growth: u32,
    limit: Duration,
}

impl Backoff {
    pub fn new(unit: Duration, growth: u32, limit: Duration) -> Self {
        Self {
            unit,
            growth,
            limit,
        }
    }

    /// The schedule used for folder creation: `1 + 2 * elapsed` units, giving
    /// up after `limit_units` units.
    pub fn folder_poll(unit: Duration, limit_units: u32) -> Self {
        Self::new(unit, 2, unit.saturating_mul(limit_units))
    }

    pub fn delay(&self, elapsed: Duration) -> Duration {
        self.unit
            .saturating_add(elapsed.saturating_mul(self.growth))
    }

    pub fn is_exhausted(&self, elapsed: Duration) -> bool {
        elapsed > self.limit
    }

    pub fn limit(&self) -> Duration {
        self.limit
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::folder_poll(Duration::from_secs(1), 10)
    }
}
