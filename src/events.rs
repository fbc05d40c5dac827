// ============================================================================
// EVENTS — typed change notifications raised to collaborators
// ============================================================================
//
// The engine has no dependency on any UI toolkit's signal mechanism; instead
// the store and the canvas controller each own an `EventBus` that collaborators
// subscribe to.  Everything runs on the single interaction thread, so
// listeners are plain `FnMut` closures with no synchronization.

use crate::fragment::FragmentId;

/// Notifications raised by the engine.  `FragmentMoved` is a *request*: the
/// canvas does not own authoritative position state, the collaborator applies
/// the move back into the store.
#[derive(Clone, Debug, PartialEq)]
pub enum CanvasEvent {
    /// The fragment set changed in some way; observers should re-read the store.
    FragmentsChanged,
    /// Primary selection changed to the given fragment (or none).
    SelectionChanged(Option<FragmentId>),
    /// A drag wants this fragment placed at (x, y) in world units.
    FragmentMoved { id: FragmentId, x: f32, y: f32 },
    ViewportChanged { zoom: f32, pan_x: f32, pan_y: f32 },
    /// The user asked to delete this fragment (e.g. Delete key).
    DeleteRequested(FragmentId),
}

type Listener = Box<dyn FnMut(&CanvasEvent)>;

#[derive(Default)]
pub struct EventBus {
    listeners: Vec<Listener>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, listener: impl FnMut(&CanvasEvent) + 'static) {
        self.listeners.push(Box::new(listener));
    }

    pub fn emit(&mut self, event: CanvasEvent) {
        for listener in &mut self.listeners {
            listener(&event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn all_listeners_receive_events_in_order() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut bus = EventBus::new();
        for _ in 0..2 {
            let seen = Rc::clone(&seen);
            bus.subscribe(move |ev| seen.borrow_mut().push(ev.clone()));
        }
        bus.emit(CanvasEvent::FragmentsChanged);
        bus.emit(CanvasEvent::ViewportChanged { zoom: 2.0, pan_x: 0.0, pan_y: 0.0 });
        let seen = seen.borrow();
        assert_eq!(seen.len(), 4);
        assert_eq!(seen[0], CanvasEvent::FragmentsChanged);
        assert_eq!(seen[1], CanvasEvent::FragmentsChanged);
    }
}
