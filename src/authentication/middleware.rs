use std::convert::Infallible;

use warp::{reject::Rejection, Filter};

use super::session::{authenticate, SessionData};
use crate::store::SharedStore;

pub fn with_store(
    store: SharedStore,
) -> impl Filter<Extract = (SharedStore,), Error = Infallible> + Clone {
    warp::any().map(move || store.clone())
}

/// Resolves the `Authorization` header into the caller's session, rejecting with
/// `ApiError::Unauthorized` when it is missing or stale.
pub fn with_session(
    store: SharedStore,
) -> impl Filter<Extract = (SessionData,), Error = Rejection> + Clone {
    warp::header::optional::<String>("authorization")
        .and(with_store(store))
        .and_then(|header: Option<String>, store: SharedStore| async move {
            authenticate(store.as_ref(), header.as_deref())
                .await
                .map_err(warp::reject::custom)
        })
}
