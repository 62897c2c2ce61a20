//! Projection runner utilities (read model builders).
//!
//! Read models are **disposable**; snapshots + events are the source of
//! truth. This module provides deterministic replay and per-stream cursor
//! tracking without making storage assumptions.

use std::collections::HashMap;

use khata_core::{AggregateId, ShopId};
use thiserror::Error;

use crate::{EventEnvelope, Projection};

/// Replay position within a single aggregate stream.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ProjectionCursor {
    shop_id: ShopId,
    aggregate_id: AggregateId,
    last_sequence_number: u64,
}

impl ProjectionCursor {
    pub fn shop_id(&self) -> ShopId {
        self.shop_id
    }

    pub fn aggregate_id(&self) -> AggregateId {
        self.aggregate_id
    }

    pub fn last_sequence_number(&self) -> u64 {
        self.last_sequence_number
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProjectionError {
    #[error("envelope from shop {found} on a projection pinned to shop {expected}")]
    ShopMismatch { expected: ShopId, found: ShopId },

    #[error("non-monotonic sequence within stream: last {last}, found {found}")]
    NonMonotonicSequence { last: u64, found: u64 },
}

/// Runs envelopes through a projection and tracks progress.
///
/// Sequence numbers are scoped to an aggregate stream (each invoice numbers
/// its own events from 1), so the runner keeps one cursor per
/// `(shop, aggregate)` stream: interleaved histories of many invoices replay
/// fine, while duplicate or out-of-order delivery within a single stream is
/// rejected.
#[derive(Debug)]
pub struct ProjectionRunner<P>
where
    P: Projection,
{
    projection: P,
    pinned_shop: Option<ShopId>,
    cursors: HashMap<(ShopId, AggregateId), u64>,
}

impl<P> ProjectionRunner<P>
where
    P: Projection,
{
    pub fn new(projection: P) -> Self {
        Self {
            projection,
            pinned_shop: None,
            cursors: HashMap::new(),
        }
    }

    /// Create a runner pinned to a specific shop.
    ///
    /// Envelopes from any other shop are rejected, so a shop-local read
    /// model can never accidentally mix shops.
    pub fn new_for_shop(shop_id: ShopId, projection: P) -> Self {
        Self {
            projection,
            pinned_shop: Some(shop_id),
            cursors: HashMap::new(),
        }
    }

    pub fn projection(&self) -> &P {
        &self.projection
    }

    pub fn projection_mut(&mut self) -> &mut P {
        &mut self.projection
    }

    pub fn into_projection(self) -> P {
        self.projection
    }

    /// Replay position for one aggregate stream, if any of its envelopes
    /// were applied.
    pub fn cursor(&self, shop_id: ShopId, aggregate_id: AggregateId) -> Option<ProjectionCursor> {
        self.cursors
            .get(&(shop_id, aggregate_id))
            .map(|&last_sequence_number| ProjectionCursor {
                shop_id,
                aggregate_id,
                last_sequence_number,
            })
    }

    /// Apply a single envelope, enforcing shop pinning and per-stream
    /// monotonic sequencing.
    pub fn apply(&mut self, envelope: &EventEnvelope<P::Ev>) -> Result<(), ProjectionError> {
        let found_shop = envelope.shop_id();
        if let Some(expected) = self.pinned_shop {
            if expected != found_shop {
                return Err(ProjectionError::ShopMismatch {
                    expected,
                    found: found_shop,
                });
            }
        }

        let key = (found_shop, envelope.aggregate_id());
        let found_seq = envelope.sequence_number();
        if let Some(&last) = self.cursors.get(&key) {
            if found_seq <= last {
                return Err(ProjectionError::NonMonotonicSequence {
                    last,
                    found: found_seq,
                });
            }
        }

        self.projection.apply(envelope);
        self.cursors.insert(key, found_seq);
        Ok(())
    }

    /// Apply many envelopes in order.
    pub fn run<'a>(
        &mut self,
        envelopes: impl IntoIterator<Item = &'a EventEnvelope<P::Ev>>,
    ) -> Result<(), ProjectionError>
    where
        P::Ev: 'a,
    {
        for env in envelopes {
            self.apply(env)?;
        }
        Ok(())
    }

    /// Rebuild a projection from scratch by replaying the full event history.
    ///
    /// The factory is used to create a fresh projection instance; the
    /// returned runner carries the replayed stream cursors.
    pub fn rebuild_from_scratch<'a>(
        factory: impl FnOnce() -> P,
        envelopes: impl IntoIterator<Item = &'a EventEnvelope<P::Ev>>,
    ) -> Result<ProjectionRunner<P>, ProjectionError>
    where
        P::Ev: 'a,
    {
        let mut runner = ProjectionRunner::new(factory());
        runner.run(envelopes)?;
        Ok(runner)
    }
}
