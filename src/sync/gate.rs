use std::time::Duration;

pub const DEFAULT_RENDER_GATE_DELAY: Duration = Duration::from_millis(1000);

/// Tells the map surface whether markers may re-measure their layout.
///
/// Live right after mount, frozen once the delay elapses, never re-armed.
#[derive(Debug)]
pub struct RenderGate {
    tracking_enabled: bool,
}

impl Default for RenderGate {
    fn default() -> Self {
        Self {
            tracking_enabled: true,
        }
    }
}

impl RenderGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tracking_enabled(&self) -> bool {
        self.tracking_enabled
    }

    /// Returns true only on the call that actually froze the gate.
    pub fn freeze(&mut self) -> bool {
        std::mem::replace(&mut self.tracking_enabled, false)
    }
}
