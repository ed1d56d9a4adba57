//! Point-scoped dependencies.

use std::ops::Deref;

use anyhow::Result;
use flowline_events::TimelinePosition;
use tracing::trace;

use crate::traits::DependencySource;

/// Dependencies resolved for exactly one point.
///
/// Release is `Drop`: the inner value goes away when the point's attempt
/// ends, whether it returned normally or bailed out with an error.
pub struct ScopedDependencies<D> {
    deps: D,
    position: TimelinePosition,
}

impl<D> ScopedDependencies<D> {
    pub fn resolve<S>(source: &S, position: TimelinePosition) -> Result<Self>
    where
        S: DependencySource<D> + ?Sized,
    {
        let deps = source.resolve()?;
        trace!(position = %position, "[timeline] dependency scope opened");
        Ok(Self { deps, position })
    }

    pub fn position(&self) -> TimelinePosition {
        self.position
    }
}

impl<D> Deref for ScopedDependencies<D> {
    type Target = D;

    fn deref(&self) -> &D {
        &self.deps
    }
}

impl<D> Drop for ScopedDependencies<D> {
    fn drop(&mut self) {
        trace!(position = %self.position, "[timeline] dependency scope released");
    }
}
