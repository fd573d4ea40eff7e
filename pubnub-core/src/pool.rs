//! Static context pool (§3 "Lifecycle", §5 "Static context pools are
//! guarded by a pool-level lock", §9 "express this as an explicit pool
//! object owned by the embedding program").

use std::sync::Mutex;

use crate::clock::Clock;
use crate::dns::Resolver;
use crate::error::ResultCode;
use crate::state_machine::Context;
use crate::transport::Transport;

/// A fixed-capacity pool of `PUBNUB_CTX_MAX` contexts. Acquiring when
/// empty reports `context-pool-exhausted` rather than growing; freeing
/// a context that is mid-transaction is refused since free is only
/// valid on an idle context (§3).
pub struct ContextPool<R: Resolver, T: Transport, Clk: Clock> {
    slots: Mutex<Vec<Option<Context<R, T, Clk>>>>,
}

impl<R: Resolver, T: Transport, Clk: Clock> ContextPool<R, T, Clk> {
    pub fn new(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        ContextPool {
            slots: Mutex::new(slots),
        }
    }

    /// Hand a freshly constructed context into the pool, occupying the
    /// first free slot.
    pub fn insert(&self, context: Context<R, T, Clk>) -> Result<usize, ResultCode> {
        let mut slots = self.slots.lock().unwrap();
        let index = slots.iter().position(|s| s.is_none()).ok_or(ResultCode::ContextPoolExhausted)?;
        slots[index] = Some(context);
        Ok(index)
    }

    /// Run `f` against the context at `index`, if occupied.
    pub fn with<F, Out>(&self, index: usize, f: F) -> Option<Out>
    where
        F: FnOnce(&mut Context<R, T, Clk>) -> Out,
    {
        let mut slots = self.slots.lock().unwrap();
        slots.get_mut(index).and_then(|slot| slot.as_mut()).map(f)
    }

    /// Free the context at `index`. Refuses (returns `false`, leaving
    /// the slot occupied) if the context is not idle.
    pub fn free(&self, index: usize) -> bool {
        let mut slots = self.slots.lock().unwrap();
        match slots.get_mut(index) {
            Some(slot @ Some(_)) if slot.as_ref().unwrap().is_idle() => {
                *slot = None;
                true
            }
            Some(Some(_)) => false,
            _ => true,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.lock().unwrap().len()
    }

    pub fn in_use(&self) -> usize {
        self.slots.lock().unwrap().iter().filter(|s| s.is_some()).count()
    }
}
