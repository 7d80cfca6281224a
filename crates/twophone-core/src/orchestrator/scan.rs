//! Demand-driven scan gating

/// Scan action to issue to the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanTransition {
    Start,
    Stop,
}

/// Edge detector for "scanning should be on"
///
/// Fed the desired-registry emptiness after every mutation, it yields a
/// transition only when the wanted state differs from the current one.
#[derive(Debug, Default, Clone, Copy)]
pub struct ScanGate {
    active: bool,
}

impl ScanGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn update(&mut self, wanted: bool) -> Option<ScanTransition> {
        if wanted == self.active {
            return None;
        }
        self.active = wanted;
        Some(if wanted {
            ScanTransition::Start
        } else {
            ScanTransition::Stop
        })
    }

    /// Forget an active scan the transport ended on its own
    pub fn reset(&mut self) {
        self.active = false;
    }
}
