use tokio::sync::broadcast;
use tracing::trace;

/// Page-level transitions the session watches for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvironmentEvent {
    VisibilityChanged { hidden: bool },
    /// `active` is whether any element is fullscreen after the change.
    FullscreenChanged { active: bool },
}

/// Injectable source of page events, so the controller never touches a real
/// page.
pub trait EnvironmentEvents: Send + Sync {
    fn subscribe(&self) -> broadcast::Receiver<EnvironmentEvent>;
}

/// In-process fan-out of environment events.
#[derive(Debug, Clone)]
pub struct EnvironmentBus {
    tx: broadcast::Sender<EnvironmentEvent>,
}

impl EnvironmentBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Returns how many listeners received the event.
    pub fn emit(&self, event: EnvironmentEvent) -> usize {
        trace!("environment event {:?}", event);
        self.tx.send(event).unwrap_or(0)
    }

    pub fn hide(&self) -> usize {
        self.emit(EnvironmentEvent::VisibilityChanged { hidden: true })
    }

    pub fn show(&self) -> usize {
        self.emit(EnvironmentEvent::VisibilityChanged { hidden: false })
    }

    pub fn enter_fullscreen(&self) -> usize {
        self.emit(EnvironmentEvent::FullscreenChanged { active: true })
    }

    pub fn exit_fullscreen(&self) -> usize {
        self.emit(EnvironmentEvent::FullscreenChanged { active: false })
    }

    pub fn listener_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EnvironmentBus {
    fn default() -> Self {
        Self::new(64)
    }
}

impl EnvironmentEvents for EnvironmentBus {
    fn subscribe(&self) -> broadcast::Receiver<EnvironmentEvent> {
        self.tx.subscribe()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageViolation {
    TabSwitch,
    FullscreenExit,
}

/// Turns raw page events into violations, one per transition. Repeated
/// "hidden" or "not fullscreen" notifications without an intervening change
/// do not count again.
#[derive(Debug, Clone, Default)]
pub struct TransitionTracker {
    hidden: bool,
    /// Unknown until the first fullscreen event.
    fullscreen: Option<bool>,
}

impl TransitionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, event: EnvironmentEvent) -> Option<PageViolation> {
        match event {
            EnvironmentEvent::VisibilityChanged { hidden } => {
                let was_hidden = std::mem::replace(&mut self.hidden, hidden);
                (hidden && !was_hidden).then_some(PageViolation::TabSwitch)
            }
            EnvironmentEvent::FullscreenChanged { active } => {
                let previous = self.fullscreen.replace(active);
                (!active && previous != Some(false)).then_some(PageViolation::FullscreenExit)
            }
        }
    }
}
