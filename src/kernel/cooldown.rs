/// Rate limiter for one event kind: at most one fire per window.
#[derive(Debug, Clone)]
pub struct CooldownGate {
    last_fired_at: Option<u64>,
    window_ms: u64,
}

impl CooldownGate {
    pub fn new(window_ms: u64) -> Self {
        Self {
            last_fired_at: None,
            window_ms,
        }
    }

    pub fn window_ms(&self) -> u64 {
        self.window_ms
    }

    pub fn last_fired_at(&self) -> Option<u64> {
        self.last_fired_at
    }

    /// True when an event at `now_ms` would be let through.
    pub fn is_open(&self, now_ms: u64) -> bool {
        match self.last_fired_at {
            None => true,
            Some(last) => now_ms.saturating_sub(last) >= self.window_ms,
        }
    }

    /// Records a fire and returns true if the window allows it, otherwise
    /// leaves the gate untouched.
    pub fn try_fire(&mut self, now_ms: u64) -> bool {
        if !self.is_open(now_ms) {
            return false;
        }
        self.last_fired_at = Some(now_ms);
        true
    }

    pub fn reset(&mut self) {
        self.last_fired_at = None;
    }
}
