//! # Hierarchical State Dispatch
//!
//! States form a tree (see [`Hierarchy`]). An event is offered to the
//! current leaf state first; a handler that returns [`Outcome::Unhandled`]
//! passes it to the parent, and so on up to the root.
//!
//! A handler that returns [`Outcome::Transition`] moves the machine:
//! exit actions run from the current leaf up to (not including) the least
//! common ancestor of leaf and target, then entry actions run from below
//! that ancestor down to the target. A transition to the current state or to
//! one of its ancestors exits and re-enters the target.
//!
//! Entry and exit actions must not transition; they post events instead.

use driver_protocol::Hierarchy;

/// What a state handler did with an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome<S> {
    /// Consumed, stay where we are
    Handled,
    /// Not for this state, offer it to the parent
    Unhandled,
    /// Consumed, move to the given state
    Transition(S),
}

/// Result of dispatching one event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch<S> {
    Handled { by: S },
    Transitioned { by: S, from: S, to: S },
    /// No state up to the root handled it
    Unhandled,
}

/// Per-state behavior of one machine
///
/// `on_event` is the dispatch table: match on the state, call that state's
/// handler. The engine walks the hierarchy; implementations never call
/// their parent's handler themselves.
pub trait StateHandlers<S: Hierarchy> {
    type Event;

    fn on_event(&mut self, state: S, event: &Self::Event) -> Outcome<S>;

    fn on_entry(&mut self, _state: S) {}

    fn on_exit(&mut self, _state: S) {}
}

/// Current position of a hierarchical state machine
#[derive(Debug, Clone)]
pub struct Hsm<S> {
    current: S,
    started: bool,
}

impl<S: Hierarchy> Hsm<S> {
    /// Machine that will start in `initial`
    pub fn new(initial: S) -> Self {
        Self {
            current: initial,
            started: false,
        }
    }

    pub fn state(&self) -> S {
        self.current
    }

    /// True if the current leaf is `state` or nested inside it
    pub fn is_in(&self, state: S) -> bool {
        self.current.is_within(state)
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Run entry actions from the root down to the initial state
    ///
    /// Calling it again is a no-op.
    pub fn start<H: StateHandlers<S>>(&mut self, handlers: &mut H) {
        if self.started {
            return;
        }
        self.started = true;
        for state in self.current.path_from_root() {
            handlers.on_entry(state);
        }
    }

    /// Offer `event` to the current state and its ancestors
    pub fn dispatch<H: StateHandlers<S>>(
        &mut self,
        handlers: &mut H,
        event: &H::Event,
    ) -> Dispatch<S> {
        let mut candidate = Some(self.current);
        while let Some(state) = candidate {
            match handlers.on_event(state, event) {
                Outcome::Handled => return Dispatch::Handled { by: state },
                Outcome::Transition(target) => {
                    let from = self.current;
                    self.transition(handlers, target);
                    return Dispatch::Transitioned {
                        by: state,
                        from,
                        to: target,
                    };
                }
                Outcome::Unhandled => candidate = state.parent(),
            }
        }
        Dispatch::Unhandled
    }

    fn transition<H: StateHandlers<S>>(&mut self, handlers: &mut H, target: S) {
        let source_path = self.current.path_from_root();
        let target_path = target.path_from_root();

        let mut common = source_path
            .iter()
            .zip(target_path.iter())
            .take_while(|(a, b)| a == b)
            .count();
        // Target is the current state or one of its ancestors: leave and re-enter it
        if common == target_path.len() {
            common = common.saturating_sub(1);
        }

        for state in source_path.iter().skip(common).rev() {
            handlers.on_exit(*state);
        }
        self.current = target;
        for state in target_path.iter().skip(common) {
            handlers.on_entry(*state);
        }
    }
}
