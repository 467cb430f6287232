//! Lock-free pool of partial accumulators and the consumer built on it.
//!
//! A consumer pops a partial (or allocates one) when a catalog begins and
//! pushes it back when the catalog ends. The queue's internal CAS is the
//! only synchronization between workers on the hot path.

use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam_queue::SegQueue;
use etas_common::{Error, GenerationInfo, Result, Rupture};

use super::{CatalogConsumer, ScanContext};

/// Pool of reusable partial accumulators.
#[derive(Debug)]
pub struct PartialPool<P> {
    queue: SegQueue<Box<P>>,
    open_consumers: AtomicUsize,
    allocated: AtomicUsize,
}

impl<P> Default for PartialPool<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> PartialPool<P> {
    pub fn new() -> Self {
        Self {
            queue: SegQueue::new(),
            open_consumers: AtomicUsize::new(0),
            allocated: AtomicUsize::new(0),
        }
    }

    /// Pop a pooled partial, or build one.
    pub fn acquire(&self, make: impl FnOnce() -> P) -> Box<P> {
        match self.queue.pop() {
            Some(partial) => partial,
            None => {
                self.allocated.fetch_add(1, Ordering::Relaxed);
                Box::new(make())
            }
        }
    }

    pub fn release(&self, partial: Box<P>) {
        self.queue.push(partial);
    }

    /// Take every pooled partial. Exclusive access means none is checked out.
    pub fn drain(&mut self) -> Vec<Box<P>> {
        let mut out = Vec::with_capacity(self.queue.len());
        while let Some(partial) = self.queue.pop() {
            out.push(partial);
        }
        self.allocated.store(0, Ordering::Relaxed);
        out
    }

    /// Partials built since the last drain.
    pub fn allocated(&self) -> usize {
        self.allocated.load(Ordering::Relaxed)
    }

    pub fn open_consumers(&self) -> usize {
        self.open_consumers.load(Ordering::Acquire)
    }

    fn consumer_opened(&self) {
        self.open_consumers.fetch_add(1, Ordering::AcqRel);
    }

    fn consumer_closed(&self) {
        self.open_consumers.fetch_sub(1, Ordering::AcqRel);
    }

    /// Error unless every consumer has been closed.
    pub fn ensure_quiescent(&self, what: &str) -> Result<()> {
        match self.open_consumers() {
            0 => Ok(()),
            n => Err(Error::ConsumerState(format!(
                "{what} called with {n} consumer(s) still open"
            ))),
        }
    }
}

/// Per-catalog behaviour of one accumulator flavor.
///
/// A partial keeps whatever it must merge later plus scratch for the
/// catalog in progress, and counts the catalogs it completed.
pub(crate) trait Partial: Send {
    type Shared: Sync;

    fn new(shared: &Self::Shared) -> Self
    where
        Self: Sized;

    fn begin_catalog(&mut self, shared: &Self::Shared, ctx: &ScanContext<'_>) -> Result<()>;

    fn next_seed_rupture(&mut self, _shared: &Self::Shared, _ctx: &ScanContext<'_>, _rupture: &Rupture) {}

    fn next_rupture(&mut self, _shared: &Self::Shared, _ctx: &ScanContext<'_>, _rupture: &Rupture) {}

    fn end_catalog(&mut self, shared: &Self::Shared, ctx: &ScanContext<'_>) -> Result<()>;

    /// Drop the scratch of an unfinished catalog.
    fn abandon_catalog(&mut self);

    fn catalogs(&self) -> u64;
}

/// Consumer that checks a partial out of a pool for each catalog.
pub(crate) struct PooledConsumer<'a, P: Partial> {
    pool: &'a PartialPool<P>,
    shared: &'a P::Shared,
    open: bool,
    current: Option<Box<P>>,
}

impl<'a, P: Partial> PooledConsumer<'a, P> {
    pub(crate) fn new(pool: &'a PartialPool<P>, shared: &'a P::Shared) -> Self {
        Self {
            pool,
            shared,
            open: false,
            current: None,
        }
    }

    fn current(&mut self) -> Result<&mut P> {
        self.current
            .as_deref_mut()
            .ok_or_else(|| Error::ConsumerState("rupture delivered outside a catalog".to_string()))
    }
}

impl<P: Partial> CatalogConsumer for PooledConsumer<'_, P> {
    fn open(&mut self) -> Result<()> {
        if self.open {
            return Err(Error::ConsumerState("consumer is already open".to_string()));
        }
        self.pool.consumer_opened();
        self.open = true;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(mut partial) = self.current.take() {
            partial.abandon_catalog();
            self.pool.release(partial);
        }
        if self.open {
            self.open = false;
            self.pool.consumer_closed();
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn begin_catalog(&mut self, ctx: &ScanContext<'_>) -> Result<()> {
        if !self.open {
            return Err(Error::ConsumerState(format!(
                "begin_catalog({}) on a closed consumer",
                ctx.catalog_index
            )));
        }
        if self.current.is_some() {
            return Err(Error::ConsumerState(format!(
                "begin_catalog({}) while another catalog is in progress",
                ctx.catalog_index
            )));
        }
        let shared = self.shared;
        let mut partial = self.pool.acquire(|| P::new(shared));
        if let Err(err) = partial.begin_catalog(shared, ctx) {
            partial.abandon_catalog();
            self.pool.release(partial);
            return Err(err);
        }
        self.current = Some(partial);
        Ok(())
    }

    fn end_catalog(&mut self, ctx: &ScanContext<'_>) -> Result<()> {
        let mut partial = self.current.take().ok_or_else(|| {
            Error::ConsumerState(format!(
                "end_catalog({}) without begin_catalog",
                ctx.catalog_index
            ))
        })?;
        let result = partial.end_catalog(self.shared, ctx);
        if result.is_err() {
            partial.abandon_catalog();
        }
        self.pool.release(partial);
        result
    }

    fn begin_seed_generation(&mut self, _ctx: &ScanContext<'_>, _info: &GenerationInfo) -> Result<()> {
        self.current().map(|_| ())
    }

    fn next_seed_rupture(&mut self, ctx: &ScanContext<'_>, rupture: &Rupture) -> Result<()> {
        let shared = self.shared;
        self.current()?.next_seed_rupture(shared, ctx, rupture);
        Ok(())
    }

    fn next_rupture(&mut self, ctx: &ScanContext<'_>, rupture: &Rupture) -> Result<()> {
        let shared = self.shared;
        self.current()?.next_rupture(shared, ctx, rupture);
        Ok(())
    }
}

impl<P: Partial> Drop for PooledConsumer<'_, P> {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// Sum of the catalog counts of drained partials.
pub(crate) fn merged_catalogs<P: Partial>(partials: &[Box<P>]) -> u64 {
    partials.iter().map(|p| p.catalogs()).sum()
}
