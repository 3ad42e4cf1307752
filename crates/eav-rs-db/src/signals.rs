//! Model lifecycle signals.
//!
//! Each [`Database`] owns a [`ModelSignals`] set. Receivers are registered
//! under a string id (connecting the same id again replaces the receiver)
//! and may be restricted to one sender model. Receivers get mutable access
//! to the instance and may fail; the first error aborts the dispatch and is
//! returned to whoever sent the signal.
//!
//! ```
//! use std::sync::Arc;
//! use eav_rs_db::model::ModelKey;
//! use eav_rs_db::signals::Signal;
//!
//! let signal = Signal::new();
//! signal.connect("audit", None, Arc::new(|_ctx| Ok(())));
//! assert!(signal.has_receiver("audit"));
//! assert!(signal.disconnect("audit"));
//! ```

use std::sync::{Arc, RwLock};

use eav_rs_core::EavResult;

use crate::connection::Database;
use crate::model::{ModelInstance, ModelKey};

/// The payload handed to receivers.
pub struct SignalContext<'a> {
    /// The database the instance lives in.
    pub db: &'a Database,
    /// The model that sent the signal.
    pub sender: ModelKey,
    /// The instance being initialized, saved, or deleted.
    pub instance: &'a mut dyn ModelInstance,
    /// For `post_save`, whether a new row was inserted.
    pub created: bool,
}

/// The type signature for a signal receiver callback.
pub type SignalReceiver = Arc<dyn Fn(&mut SignalContext<'_>) -> EavResult<()> + Send + Sync>;

struct Connection {
    id: String,
    sender: Option<ModelKey>,
    receiver: SignalReceiver,
}

/// A signal that can be connected to and dispatched.
///
/// Receivers are called in the order they were connected.
#[derive(Default)]
pub struct Signal {
    receivers: RwLock<Vec<Connection>>,
}

impl Signal {
    /// Creates a new signal with no connected receivers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Connects a receiver, optionally only for one sender model.
    ///
    /// If a receiver with the same ID is already connected, it is replaced.
    pub fn connect(
        &self,
        receiver_id: impl Into<String>,
        sender: Option<ModelKey>,
        receiver: SignalReceiver,
    ) {
        let id = receiver_id.into();
        let mut receivers = self.receivers.write().expect("signal lock poisoned");

        // Replace if already connected with this ID
        if let Some(entry) = receivers.iter_mut().find(|c| c.id == id) {
            entry.sender = sender;
            entry.receiver = receiver;
        } else {
            receivers.push(Connection {
                id,
                sender,
                receiver,
            });
        }
    }

    /// Disconnects the receiver with the given ID.
    ///
    /// Returns `true` if a receiver was found and removed.
    pub fn disconnect(&self, receiver_id: &str) -> bool {
        let mut receivers = self.receivers.write().expect("signal lock poisoned");
        let len_before = receivers.len();
        receivers.retain(|c| c.id != receiver_id);
        receivers.len() < len_before
    }

    /// Sends the signal to every receiver interested in `ctx.sender`.
    ///
    /// Receivers run outside the lock, so they may connect or disconnect.
    ///
    /// # Errors
    ///
    /// Returns the first receiver error; later receivers are not called.
    pub fn send(&self, ctx: &mut SignalContext<'_>) -> EavResult<()> {
        let matching: Vec<SignalReceiver> = {
            let receivers = self.receivers.read().expect("signal lock poisoned");
            receivers
                .iter()
                .filter(|c| c.sender.map_or(true, |s| s == ctx.sender))
                .map(|c| Arc::clone(&c.receiver))
                .collect()
        };
        for receiver in matching {
            receiver(ctx)?;
        }
        Ok(())
    }

    /// Returns the number of connected receivers.
    pub fn receiver_count(&self) -> usize {
        self.receivers.read().expect("signal lock poisoned").len()
    }

    /// Returns `true` if a receiver with this ID is connected.
    pub fn has_receiver(&self, receiver_id: &str) -> bool {
        self.receivers
            .read()
            .expect("signal lock poisoned")
            .iter()
            .any(|c| c.id == receiver_id)
    }
}

/// The lifecycle signals of one database.
#[derive(Default)]
pub struct ModelSignals {
    /// Fired after an instance is constructed by the ORM or a manager.
    pub post_init: Signal,
    /// Fired before an instance is written.
    pub pre_save: Signal,
    /// Fired after an instance is written.
    pub post_save: Signal,
    /// Fired before an instance is deleted.
    pub pre_delete: Signal,
    /// Fired after an instance is deleted.
    pub post_delete: Signal,
}

impl ModelSignals {
    /// Creates a new signal set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Disconnects `receiver_id` from every signal. Returns how many were removed.
    pub fn disconnect_all(&self, receiver_id: &str) -> usize {
        [
            &self.post_init,
            &self.pre_save,
            &self.post_save,
            &self.pre_delete,
            &self.post_delete,
        ]
        .iter()
        .filter(|signal| signal.disconnect(receiver_id))
        .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{test_db, Author};
    use eav_rs_core::EavError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn send(signal: &Signal, db: &Database, author: &mut Author) -> EavResult<()> {
        let mut ctx = SignalContext {
            db,
            sender: ModelKey::new("library", "author"),
            instance: author,
            created: false,
        };
        signal.send(&mut ctx)
    }

    #[test]
    fn test_connect_replaces_same_id() {
        let signal = Signal::new();
        signal.connect("a", None, Arc::new(|_| Ok(())));
        signal.connect("a", None, Arc::new(|_| Ok(())));
        assert_eq!(signal.receiver_count(), 1);
    }

    #[test]
    fn test_sender_filter() {
        let db = test_db();
        let hits = Arc::new(AtomicUsize::new(0));
        let signal = Signal::new();
        let counter = Arc::clone(&hits);
        signal.connect(
            "authors",
            Some(ModelKey::new("library", "author")),
            Arc::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        );
        let counter = Arc::clone(&hits);
        signal.connect(
            "books",
            Some(ModelKey::new("library", "book")),
            Arc::new(move |_| {
                counter.fetch_add(100, Ordering::SeqCst);
                Ok(())
            }),
        );
        send(&signal, &db, &mut Author::default()).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_receiver_can_mutate_instance() {
        let db = test_db();
        let signal = Signal::new();
        signal.connect(
            "rename",
            None,
            Arc::new(|ctx| {
                if let Some(author) = ctx.instance.as_any_mut().downcast_mut::<Author>() {
                    author.name = "changed".into();
                }
                Ok(())
            }),
        );
        let mut author = Author::default();
        send(&signal, &db, &mut author).unwrap();
        assert_eq!(author.name, "changed");
    }

    #[test]
    fn test_first_error_stops_dispatch() {
        let db = test_db();
        let hits = Arc::new(AtomicUsize::new(0));
        let signal = Signal::new();
        signal.connect(
            "fail",
            None,
            Arc::new(|_| Err(EavError::NotSupported("nope".into()))),
        );
        let counter = Arc::clone(&hits);
        signal.connect(
            "after",
            None,
            Arc::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        );
        assert!(send(&signal, &db, &mut Author::default()).is_err());
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_disconnect_all() {
        let signals = ModelSignals::new();
        signals.pre_save.connect("x", None, Arc::new(|_| Ok(())));
        signals.post_save.connect("x", None, Arc::new(|_| Ok(())));
        assert_eq!(signals.disconnect_all("x"), 2);
        assert!(!signals.pre_save.has_receiver("x"));
    }
}
