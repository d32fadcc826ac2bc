//! Disposal traits for resource cleanup.
//!
//! Anything the host releases at shutdown is expressed as a [`Disposable`]:
//! a resource that supports asynchronous release, synchronous release, or
//! neither. The [`DisposalSequencer`] walks an ordered list of them.

mod sequencer;

pub use sequencer::DisposalSequencer;

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// Trait for synchronous resource disposal.
///
/// # Example
///
/// ```rust
/// use meshestra_hosting::dispose::Dispose;
///
/// struct Cache;
///
/// impl Dispose for Cache {
///     fn dispose(&self) -> anyhow::Result<()> {
///         // flush entries...
///         Ok(())
///     }
/// }
/// ```
pub trait Dispose: Send + Sync + 'static {
    /// Perform synchronous cleanup of resources.
    fn dispose(&self) -> anyhow::Result<()>;
}

/// Trait for asynchronous resource disposal.
///
/// Preferred over [`Dispose`] when a resource supports both.
#[async_trait]
pub trait AsyncDispose: Send + Sync + 'static {
    /// Perform asynchronous cleanup of resources.
    async fn dispose(&self) -> anyhow::Result<()>;
}

/// A resource the host may release, tagged by the release style it supports.
#[derive(Clone, Default)]
pub enum Disposable {
    Async(Arc<dyn AsyncDispose>),
    Sync(Arc<dyn Dispose>),
    /// Supports neither; releasing is a no-op.
    #[default]
    Inert,
}

impl Disposable {
    pub fn from_async<T: AsyncDispose>(resource: Arc<T>) -> Self {
        Self::Async(resource)
    }

    pub fn from_sync<T: Dispose>(resource: Arc<T>) -> Self {
        Self::Sync(resource)
    }

    pub fn is_inert(&self) -> bool {
        matches!(self, Self::Inert)
    }

    /// Releases the underlying resource using whichever style it supports.
    pub async fn release(&self) -> anyhow::Result<()> {
        match self {
            Self::Async(resource) => resource.dispose().await,
            Self::Sync(resource) => resource.dispose(),
            Self::Inert => Ok(()),
        }
    }
}

impl fmt::Debug for Disposable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            Self::Async(_) => "Async",
            Self::Sync(_) => "Sync",
            Self::Inert => "Inert",
        };
        f.debug_tuple("Disposable").field(&kind).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counter {
        sync_calls: AtomicUsize,
        async_calls: AtomicUsize,
    }

    impl Dispose for Counter {
        fn dispose(&self) -> anyhow::Result<()> {
            self.sync_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[async_trait]
    impl AsyncDispose for Counter {
        async fn dispose(&self) -> anyhow::Result<()> {
            self.async_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_release_uses_tagged_style() {
        let counter = Arc::new(Counter::default());

        Disposable::from_async(Arc::clone(&counter))
            .release()
            .await
            .unwrap();
        Disposable::from_sync(Arc::clone(&counter))
            .release()
            .await
            .unwrap();

        assert_eq!(counter.async_calls.load(Ordering::SeqCst), 1);
        assert_eq!(counter.sync_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_inert_release_is_noop() {
        let inert = Disposable::default();
        assert!(inert.is_inert());
        assert!(inert.release().await.is_ok());
    }
}
