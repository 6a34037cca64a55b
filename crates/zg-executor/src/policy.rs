//! Completion policies: which finalized event is "this operation's effect".

use std::sync::Arc;

use zg_core::ChainEvent;

type EventPredicate = dyn Fn(&ChainEvent) -> bool + Send + Sync;

/// Selects the event that represents an operation's effect.
///
/// Events are scanned in arrival order; the first match wins. The full
/// event list is surfaced regardless of the policy.
#[derive(Clone, Default)]
pub enum CompletionPolicy {
    /// Select nothing.
    #[default]
    AllEvents,
    /// First event with this origin pallet and name.
    First { pallet: String, name: String },
    /// First event accepted by the predicate.
    Custom(Arc<EventPredicate>),
}

impl CompletionPolicy {
    pub fn first(pallet: impl Into<String>, name: impl Into<String>) -> Self {
        Self::First {
            pallet: pallet.into(),
            name: name.into(),
        }
    }

    pub fn custom<F>(predicate: F) -> Self
    where
        F: Fn(&ChainEvent) -> bool + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(predicate))
    }

    /// Parse `Pallet.Name`.
    pub fn parse_event(spec: &str) -> Option<Self> {
        let (pallet, name) = spec.split_once('.')?;
        if pallet.is_empty() || name.is_empty() {
            return None;
        }
        Some(Self::first(pallet, name))
    }

    pub fn select(&self, events: &[ChainEvent]) -> Option<ChainEvent> {
        match self {
            Self::AllEvents => None,
            Self::First { pallet, name } => events.iter().find(|e| e.is(pallet, name)).cloned(),
            Self::Custom(predicate) => events.iter().find(|e| predicate(e)).cloned(),
        }
    }
}

impl std::fmt::Debug for CompletionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AllEvents => f.write_str("AllEvents"),
            Self::First { pallet, name } => write!(f, "First({pallet}.{name})"),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}
