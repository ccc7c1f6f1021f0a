use std::convert::Infallible;

use serde::Serialize;
use warp::{
    filters::BoxedFilter,
    http::StatusCode,
    reject::Rejection,
    reply::{Reply, Response},
    Filter,
};

use crate::{
    error::ApiResult,
    media::MediaStorage,
    schema::TermKind,
    store::SharedStore,
};

pub mod recipes;
pub mod rejection;
pub mod terms;
pub mod users;

/// Everything a request handler needs, cloned into each request.
#[derive(Clone)]
pub struct Context {
    pub store: SharedStore,
    pub media: MediaStorage,
    pub max_body_bytes: u64,
    pub max_upload_bytes: u64,
}

impl Context {
    pub fn new(store: SharedStore, media: MediaStorage, max_upload_bytes: u64) -> Self {
        Self {
            store,
            media,
            max_body_bytes: 64 * 1024,
            max_upload_bytes,
        }
    }
}

pub fn with_context(ctx: Context) -> impl Filter<Extract = (Context,), Error = Infallible> + Clone {
    warp::any().map(move || ctx.clone())
}

pub fn json_body(ctx: &Context) -> BoxedFilter<(serde_json::Value,)> {
    warp::body::content_length_limit(ctx.max_body_bytes)
        .and(warp::body::json())
        .boxed()
}

pub fn reply<T: Serialize>(result: ApiResult<T>, status: StatusCode) -> Result<Response, Rejection> {
    match result {
        Ok(body) => Ok(warp::reply::with_status(warp::reply::json(&body), status).into_response()),
        Err(e) => Err(warp::reject::custom(e)),
    }
}

pub fn no_content(result: ApiResult<()>) -> Result<Response, Rejection> {
    match result {
        Ok(()) => Ok(StatusCode::NO_CONTENT.into_response()),
        Err(e) => Err(warp::reject::custom(e)),
    }
}

/// The whole HTTP API with errors rendered as JSON.
pub fn api(ctx: Context) -> impl Filter<Extract = impl Reply, Error = Infallible> + Clone {
    users::routes(ctx.clone())
        .or(recipes::routes(ctx.clone()))
        .unify()
        .or(terms::routes(ctx.clone(), TermKind::Tag))
        .unify()
        .or(terms::routes(ctx, TermKind::Ingredient))
        .unify()
        .recover(rejection::recover)
        .unify()
        .with(warp::log("recipe_api::http"))
}
