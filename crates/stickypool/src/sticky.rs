//! Sticky binding of worker identities to engine slots.
//!
//! A [`StickyPool`] owns `N` engines and a binding table of `N` entries. The
//! first time a [`SlotToken`] asks for an engine it is bound to the first free
//! slot; every later request from the same token resolves to that slot again.
//! Bindings are never released, so once `N` distinct tokens have been seen any
//! further token is refused with [`Error::Unavailable`].
//!
//! The binding table is only touched inside [`StickyPool::acquire`], under a
//! single lock. Engines sit behind their own locks, which are uncontended as
//! long as each token is used by one thread at a time.

use crate::{Engine, Error, Result, SlotToken};
use core::ops::{Deref, DerefMut};
use parking_lot::{Mutex, MutexGuard};

/// A fixed set of engines, each permanently bound to one worker identity.
pub struct StickyPool<E> {
    bindings: Mutex<Vec<Option<SlotToken>>>,
    engines: Box<[Mutex<E>]>,
}

impl<E: Engine> StickyPool<E> {
    /// Builds a pool of `size` engines by calling `factory` once per slot.
    ///
    /// The factory receives the slot index, which deployments can use to place
    /// engines on different devices.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidPoolSize`] if `size` is zero.
    /// - [`Error::EngineConstruction`] if any engine fails to build. No pool
    ///   is returned with fewer slots than requested.
    pub fn new<F>(size: usize, mut factory: F) -> Result<Self>
    where
        F: FnMut(usize) -> Result<E>,
    {
        if size == 0 {
            return Err(Error::InvalidPoolSize);
        }

        let mut engines = Vec::with_capacity(size);
        for slot in 0..size {
            let engine = factory(slot).map_err(|e| Error::EngineConstruction {
                slot,
                reason: e.to_string(),
            })?;

            #[cfg(feature = "tracing")]
            tracing::debug!("Engine for slot {slot} constructed");

            engines.push(Mutex::new(engine));
        }

        Ok(Self {
            bindings: Mutex::new(vec![None; size]),
            engines: engines.into_boxed_slice(),
        })
    }
}

impl<E> StickyPool<E> {
    /// Lends out the engine bound to `token`, binding a free slot on first use.
    ///
    /// An existing binding always wins over a free slot, even when the free
    /// slot comes first in the table.
    ///
    /// # Errors
    ///
    /// - [`Error::Unavailable`] if `token` is unbound and every slot is taken.
    ///   This is a sizing mismatch between the pool and the workers using it,
    ///   not a transient condition.
    /// - [`Error::SlotBusy`] if the engine is already lent out, which only
    ///   happens when the same token is used from two threads at once.
    pub fn acquire(&self, token: SlotToken) -> Result<EngineHandle<'_, E>> {
        let slot = self.resolve(token)?;
        let guard = self.engines[slot]
            .try_lock()
            .ok_or(Error::SlotBusy { slot })?;
        Ok(EngineHandle { slot, guard })
    }

    fn resolve(&self, token: SlotToken) -> Result<usize> {
        let mut bindings = self.bindings.lock();
        let mut free = None;

        for (slot, bound) in bindings.iter().enumerate() {
            match bound {
                Some(t) if *t == token => return Ok(slot),
                None if free.is_none() => free = Some(slot),
                _ => {}
            }
        }

        match free {
            Some(slot) => {
                bindings[slot] = Some(token);

                #[cfg(feature = "tracing")]
                tracing::info!("Worker {token} bound to engine slot {slot}");

                Ok(slot)
            }
            None => Err(Error::Unavailable {
                token,
                capacity: bindings.len(),
            }),
        }
    }

    /// Number of engine slots.
    pub fn capacity(&self) -> usize {
        self.engines.len()
    }

    /// Number of slots currently bound to a worker.
    pub fn bound(&self) -> usize {
        self.bindings.lock().iter().flatten().count()
    }
}

impl<E> core::fmt::Debug for StickyPool<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("StickyPool")
            .field("capacity", &self.capacity())
            .field("bound", &self.bound())
            .finish()
    }
}

/// Exclusive loan of one engine for the duration of a call.
pub struct EngineHandle<'a, E> {
    slot: usize,
    guard: MutexGuard<'a, E>,
}

impl<E> EngineHandle<'_, E> {
    /// Index of the slot this engine lives in.
    pub const fn slot(&self) -> usize {
        self.slot
    }
}

impl<E> Deref for EngineHandle<'_, E> {
    type Target = E;

    fn deref(&self) -> &E {
        &self.guard
    }
}

impl<E> DerefMut for EngineHandle<'_, E> {
    fn deref_mut(&mut self) -> &mut E {
        &mut self.guard
    }
}
