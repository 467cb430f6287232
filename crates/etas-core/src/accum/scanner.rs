//! Drives a set of consumers over one finished catalog.

use etas_common::Result;

use super::{Accumulator, CatalogConsumer, ScanContext};
use crate::engine::CatalogView;

/// One consumer per accumulator, owned by a single worker.
pub struct CatalogScanner<'a> {
    consumers: Vec<Box<dyn CatalogConsumer + Send + 'a>>,
}

impl<'a> CatalogScanner<'a> {
    pub fn new(accumulators: &[&'a dyn Accumulator]) -> Self {
        Self {
            consumers: accumulators.iter().map(|acc| acc.make_consumer()).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.consumers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.consumers.is_empty()
    }

    pub fn open(&mut self) -> Result<()> {
        for consumer in &mut self.consumers {
            consumer.open()?;
        }
        Ok(())
    }

    /// Stream every generation of `view` into each consumer.
    ///
    /// Generation 0 goes through the seed callbacks; later generations go
    /// through `next_rupture`.
    pub fn scan(&mut self, view: &dyn CatalogView, catalog_index: u64) -> Result<()> {
        let ctx = ScanContext {
            view,
            catalog_index,
        };
        for consumer in &mut self.consumers {
            scan_one(consumer.as_mut(), &ctx)?;
        }
        Ok(())
    }

    /// Close every consumer, reporting the first failure.
    pub fn close(&mut self) -> Result<()> {
        let mut first = Ok(());
        for consumer in &mut self.consumers {
            let result = consumer.close();
            if first.is_ok() {
                first = result;
            }
        }
        first
    }
}

fn scan_one(consumer: &mut (dyn CatalogConsumer + Send + '_), ctx: &ScanContext<'_>) -> Result<()> {
    let view = ctx.view;
    consumer.begin_catalog(ctx)?;
    for generation in 0..view.generation_count() {
        let info = view.generation_info(generation);
        let size = view.generation_size(generation);
        if generation == 0 {
            consumer.begin_seed_generation(ctx, &info)?;
            for i in 0..size {
                consumer.next_seed_rupture(ctx, view.rupture(0, i))?;
            }
            consumer.end_seed_generation(ctx)?;
        } else {
            consumer.begin_generation(ctx, generation, &info)?;
            for i in 0..size {
                consumer.next_rupture(ctx, view.rupture(generation, i))?;
            }
            consumer.end_generation(ctx, generation)?;
        }
    }
    consumer.end_catalog(ctx)
}
