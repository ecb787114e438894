//! The idempotent lifecycle protocol shared by every Sumo Logic handler.
//!
//! - **Create** tries the remote create. A name collision is resolved by
//!   looking the existing object up by exact name and adopting it, so a
//!   repeated create returns the same remote id without making a duplicate.
//! - **Delete** only touches the remote side when the caller asked for it,
//!   and treats an object that is already gone as deleted.
//!
//! Update is a plain fetch / modify / write with the fetched ETag and lives in
//! the handlers.

use std::future::Future;

use tracing::{debug, info, warn};

use crate::api::{ApiError, ApiErrorKind, Named};
use crate::error::ResourceError;
use crate::types::EntityKind;

/// Page size used when scanning list endpoints.
pub const PAGE_LIMIT: usize = 300;

/// Outcome of [`create_or_adopt`].
#[derive(Debug, Clone, PartialEq)]
pub enum Created<T> {
    /// The remote create succeeded.
    New(T),
    /// The name was taken and the existing object was adopted.
    Adopted(T),
}

impl<T> Created<T> {
    pub fn into_inner(self) -> T {
        match self {
            Self::New(value) | Self::Adopted(value) => value,
        }
    }

    pub fn is_adopted(&self) -> bool {
        matches!(self, Self::Adopted(_))
    }
}

/// Run `create`; on a name collision fall back to `lookup`.
///
/// Errors other than a collision propagate unchanged. A collision that
/// `lookup` cannot resolve becomes [`ResourceError::NotFoundAfterCollision`].
pub async fn create_or_adopt<T, C, L, LFut>(
    kind: EntityKind,
    name: &str,
    create: C,
    lookup: L,
) -> Result<Created<T>, ResourceError>
where
    C: Future<Output = Result<T, ApiError>>,
    L: FnOnce() -> LFut,
    LFut: Future<Output = Result<Option<T>, ApiError>>,
{
    match create.await {
        Ok(created) => {
            info!(%kind, name, "Created remote object");
            Ok(Created::New(created))
        },
        Err(err) if err.kind == ApiErrorKind::Collision => {
            warn!(%kind, name, code = %err.code, "Name already taken, looking up existing object");
            match lookup().await? {
                Some(existing) => {
                    info!(%kind, name, "Adopted existing remote object");
                    Ok(Created::Adopted(existing))
                },
                None => Err(ResourceError::NotFoundAfterCollision {
                    kind,
                    name: name.to_string(),
                }),
            }
        },
        Err(err) => Err(err.into()),
    }
}

/// Scan a paginated list endpoint for an object with exactly `name`.
///
/// `list_page(limit, offset)` is called with [`PAGE_LIMIT`] and an offset
/// advancing one page at a time. The scan stops at the first match or the
/// first page shorter than the limit.
pub async fn find_by_name<T, F, Fut>(name: &str, mut list_page: F) -> Result<Option<T>, ApiError>
where
    T: Named,
    F: FnMut(usize, usize) -> Fut,
    Fut: Future<Output = Result<Vec<T>, ApiError>>,
{
    let mut offset = 0;
    loop {
        let page = list_page(PAGE_LIMIT, offset).await?;
        let page_len = page.len();
        debug!(name, offset, page_len, "Scanning page for name");

        if let Some(found) = page.into_iter().find(|item| item.name() == name) {
            return Ok(Some(found));
        }
        if page_len < PAGE_LIMIT {
            return Ok(None);
        }
        offset += PAGE_LIMIT;
    }
}

/// Delete a remote object if `remove` is set.
///
/// With `remove == false` the object is intentionally orphaned and `delete`
/// is never called. A not-found response counts as success.
pub async fn delete_if_requested<D, DFut>(
    kind: EntityKind,
    id: &str,
    remove: bool,
    delete: D,
) -> Result<(), ResourceError>
where
    D: FnOnce() -> DFut,
    DFut: Future<Output = Result<(), ApiError>>,
{
    if !remove {
        info!(%kind, id, "RemoveOnDeleteStack is not set, leaving remote object in place");
        return Ok(());
    }

    match delete().await {
        Ok(()) => {
            info!(%kind, id, "Deleted remote object");
            Ok(())
        },
        Err(err) if err.kind == ApiErrorKind::NotFound => {
            info!(%kind, id, "Remote object already gone");
            Ok(())
        },
        Err(err) => Err(err.into()),
    }
}
