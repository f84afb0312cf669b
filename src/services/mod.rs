//! Use-case layer
//!
//! Each use case takes the store it works on, the strategy for the target
//! service, a cancellation token, and a small input struct; it returns a
//! serializable output struct. The CLI and the agent server both call these
//! functions, so behavior is identical across front-ends.

pub mod apply_service;
pub mod diff_service;
pub mod entry_service;
pub mod reset_service;
pub mod status_service;
pub mod tag_service;
pub mod transfer_service;

pub use apply_service::{
    apply, ApplyConflict, ApplyEntryResult, ApplyEntryStatus, ApplyInput, ApplyOutput,
    ApplyTagResult,
};
pub use diff_service::{diff, DiffEntry, DiffEntryType, DiffInput, DiffOutput, DiffTagEntry};
pub use entry_service::{
    add, delete, edit, AddInput, AddOutput, DeleteInput, DeleteOutput, EditInput, EditOutput,
};
pub use reset_service::{reset, reset_all, unstage, ResetInput, ResetResult};
pub use status_service::{status, StatusEntry, StatusInput, StatusOutput, StatusTagEntry};
pub use tag_service::{
    cancel_add_tag, cancel_remove_tag, tag, untag, CancelTagInput, CancelTagOutput, TagInput,
    TagOutput, UntagInput,
};
pub use transfer_service::{drain, persist, DrainInput, DrainOutput, PersistInput, PersistOutput};

use crate::error::{StageError, StageResult};
use crate::models::Service;
use tokio_util::sync::CancellationToken;

/// Fail with `Cancelled` once the caller has given up
pub(crate) fn ensure_active(cancel: &CancellationToken) -> StageResult<()> {
    if cancel.is_cancelled() {
        return Err(StageError::Cancelled);
    }
    Ok(())
}

/// Parse an optional service tag from a request
pub(crate) fn parse_service_filter(tag: Option<&str>) -> StageResult<Option<Service>> {
    tag.map(str::parse).transpose()
}

#[cfg(test)]
pub(crate) mod testing {
    use crate::remote::LocalRemote;
    use crate::store::MemoryStore;
    use crate::strategy::{ServiceStrategy, StrategyFactory};
    use crate::models::Service;
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    pub struct Fixture {
        pub remote: Arc<LocalRemote>,
        pub store: MemoryStore,
        pub factory: StrategyFactory,
        pub cancel: CancellationToken,
    }

    impl Fixture {
        pub fn new() -> Self {
            let remote = Arc::new(LocalRemote::new());
            Self {
                factory: StrategyFactory::from_remote(remote.clone()),
                remote,
                store: MemoryStore::new(),
                cancel: CancellationToken::new(),
            }
        }

        pub fn params(&self) -> Box<dyn ServiceStrategy> {
            self.factory.create(Service::Parameter)
        }

        pub fn secrets(&self) -> Box<dyn ServiceStrategy> {
            self.factory.create(Service::Secret)
        }
    }
}
