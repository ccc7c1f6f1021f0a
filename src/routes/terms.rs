use std::collections::HashMap;

use serde_json::Value;
use warp::{filters::BoxedFilter, http::StatusCode, reject::Rejection, reply::Response, Filter};

use super::{json_body, no_content, reply, with_context, Context};
use crate::{
    actions::{create_term, delete_term, get_term, list_terms, rename_term},
    authentication::{middleware::with_session, session::SessionData},
    error::{ApiError, ApiResult, ValidationError},
    form::parse_term_name,
    schema::TermKind,
};

fn assigned_only(query: &HashMap<String, String>) -> bool {
    matches!(
        query.get("assigned_only").map(|v| v.trim().to_ascii_lowercase()).as_deref(),
        Some("1" | "true")
    )
}

/// Names arrive percent-encoded in the path.
fn decode_name(raw: &str) -> ApiResult<String> {
    urlencoding::decode(raw)
        .map(|name| name.into_owned())
        .map_err(|_| ApiError::NotFound)
}

async fn index(
    kind: TermKind,
    query: HashMap<String, String>,
    session: SessionData,
    ctx: Context,
) -> Result<Response, Rejection> {
    let result = list_terms(ctx.store.as_ref(), &session, kind, assigned_only(&query)).await;
    reply(result, StatusCode::OK)
}

async fn add(kind: TermKind, session: SessionData, body: Value, ctx: Context) -> Result<Response, Rejection> {
    let result = match parse_term_name(body, true) {
        Ok(Some(name)) => create_term(ctx.store.as_ref(), &session, kind, &name).await,
        Ok(None) => Err(ValidationError::non_field("Missing required fields.").into()),
        Err(e) => Err(e.into()),
    };
    reply(result, StatusCode::CREATED)
}

async fn show(kind: TermKind, raw: String, session: SessionData, ctx: Context) -> Result<Response, Rejection> {
    let result = match decode_name(&raw) {
        Ok(name) => get_term(ctx.store.as_ref(), &session, kind, &name).await,
        Err(e) => Err(e),
    };
    reply(result, StatusCode::OK)
}

async fn rename(
    kind: TermKind,
    raw: String,
    require_all: bool,
    session: SessionData,
    body: Value,
    ctx: Context,
) -> Result<Response, Rejection> {
    let store = ctx.store.as_ref();
    let result = match (decode_name(&raw), parse_term_name(body, require_all)) {
        (Err(e), _) => Err(e),
        (Ok(name), Ok(new_name)) => rename_term(store, &session, kind, &name, new_name).await,
        // Unknown names are a 404 even when the payload is also bad.
        (Ok(name), Err(e)) => match get_term(store, &session, kind, &name).await {
            Ok(_) => Err(e.into()),
            Err(missing) => Err(missing),
        },
    };
    reply(result, StatusCode::OK)
}

async fn remove(kind: TermKind, raw: String, session: SessionData, ctx: Context) -> Result<Response, Rejection> {
    let result = match decode_name(&raw) {
        Ok(name) => delete_term(ctx.store.as_ref(), &session, kind, &name).await,
        Err(e) => Err(e),
    };
    no_content(result)
}

/// Collection and per-name routes for one term kind, e.g. `/tags` and `/tags/{name}`.
pub fn routes(ctx: Context, kind: TermKind) -> BoxedFilter<(Response,)> {
    let session = with_session(ctx.store.clone());
    let kind_filter = warp::any().map(move || kind);
    let collection = warp::path(kind.table()).and(warp::path::end());
    let item = warp::path(kind.table())
        .and(warp::path::param::<String>())
        .and(warp::path::end());

    let list = kind_filter
        .clone()
        .and(collection.clone())
        .and(warp::get())
        .and(warp::query::<HashMap<String, String>>())
        .and(session.clone())
        .and(with_context(ctx.clone()))
        .and_then(index);

    let create = kind_filter
        .clone()
        .and(collection)
        .and(warp::post())
        .and(session.clone())
        .and(json_body(&ctx))
        .and(with_context(ctx.clone()))
        .and_then(add);

    let detail = kind_filter
        .clone()
        .and(item.clone())
        .and(warp::get())
        .and(session.clone())
        .and(with_context(ctx.clone()))
        .and_then(show);

    let put = item.clone().and(warp::put()).map(|raw: String| (raw, true)).untuple_one();
    let patch = item.clone().and(warp::patch()).map(|raw: String| (raw, false)).untuple_one();
    let update = kind_filter
        .clone()
        .and(put.or(patch).unify())
        .and(session.clone())
        .and(json_body(&ctx))
        .and(with_context(ctx.clone()))
        .and_then(rename);

    let destroy = kind_filter
        .and(item)
        .and(warp::delete())
        .and(session)
        .and(with_context(ctx))
        .and_then(remove);

    list.or(create)
        .unify()
        .or(detail)
        .unify()
        .or(update)
        .unify()
        .or(destroy)
        .unify()
        .boxed()
}
