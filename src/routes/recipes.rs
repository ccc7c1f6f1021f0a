use bytes::Bytes;
use serde::Deserialize;
use serde_json::Value;
use warp::{filters::BoxedFilter, http::StatusCode, reject::Rejection, reply::Response, Filter};

use super::{json_body, no_content, reply, with_context, Context};
use crate::{
    actions::{create_recipe, delete_recipe, get_recipe, list_recipes, update_recipe, upload_photo},
    authentication::{middleware::with_session, session::SessionData},
    error::ApiError,
    form::{parse_recipe_changes, parse_recipe_draft},
    schema::Id,
    store::RecipeFilter,
};

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub tags: Option<String>,
    pub ingredients: Option<String>,
}

/// Comma separated names, blanks dropped. Nothing left means no filter.
fn split_names(raw: Option<&str>) -> Option<Vec<String>> {
    let names: Vec<String> = raw?
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect();

    (!names.is_empty()).then_some(names)
}

impl ListQuery {
    pub fn filter(&self) -> RecipeFilter {
        RecipeFilter {
            tags: split_names(self.tags.as_deref()),
            ingredients: split_names(self.ingredients.as_deref()),
        }
    }
}

async fn handle_list(query: ListQuery, session: SessionData, ctx: Context) -> Result<Response, Rejection> {
    let result = list_recipes(ctx.store.as_ref(), &session, &query.filter())
        .await
        .map(|records| {
            records
                .into_iter()
                .map(|record| record.with_media_url(ctx.media.base_url()))
                .collect::<Vec<_>>()
        });
    reply(result, StatusCode::OK)
}

async fn handle_create(session: SessionData, body: Value, ctx: Context) -> Result<Response, Rejection> {
    let result = match parse_recipe_draft(body) {
        Ok(draft) => create_recipe(ctx.store.as_ref(), &session, draft).await,
        Err(e) => Err(ApiError::from(e)),
    };
    reply(
        result.map(|record| record.with_media_url(ctx.media.base_url())),
        StatusCode::CREATED,
    )
}

async fn handle_detail(id: Id, session: SessionData, ctx: Context) -> Result<Response, Rejection> {
    let result = get_recipe(ctx.store.as_ref(), &session, id).await;
    reply(
        result.map(|record| record.with_media_url(ctx.media.base_url())),
        StatusCode::OK,
    )
}

async fn handle_update(
    id: Id,
    require_all: bool,
    session: SessionData,
    body: Value,
    ctx: Context,
) -> Result<Response, Rejection> {
    let result = match parse_recipe_changes(body, require_all) {
        Ok(changes) => update_recipe(ctx.store.as_ref(), &session, id, changes).await,
        Err(e) => Err(ApiError::from(e)),
    };
    reply(
        result.map(|record| record.with_media_url(ctx.media.base_url())),
        StatusCode::OK,
    )
}

async fn handle_destroy(id: Id, session: SessionData, ctx: Context) -> Result<Response, Rejection> {
    no_content(delete_recipe(ctx.store.as_ref(), &session, id).await)
}

async fn handle_upload(
    id: Id,
    session: SessionData,
    content_type: Option<String>,
    body: Bytes,
    ctx: Context,
) -> Result<Response, Rejection> {
    let result = upload_photo(
        ctx.store.as_ref(),
        &ctx.media,
        &session,
        id,
        content_type.as_deref(),
        &body,
    )
    .await;
    reply(result, StatusCode::OK)
}

/// `/recipes`, `/recipes/{id}` and `/recipes/{id}/upload-photos`.
pub fn routes(ctx: Context) -> BoxedFilter<(Response,)> {
    let session = with_session(ctx.store.clone());

    let list = warp::path!("recipes")
        .and(warp::get())
        .and(warp::query::<ListQuery>())
        .and(session.clone())
        .and(with_context(ctx.clone()))
        .and_then(handle_list);

    let create = warp::path!("recipes")
        .or(warp::path!("recipe"))
        .unify()
        .and(warp::post())
        .and(session.clone())
        .and(json_body(&ctx))
        .and(with_context(ctx.clone()))
        .and_then(handle_create);

    let detail = warp::path!("recipes" / Id)
        .and(warp::get())
        .and(session.clone())
        .and(with_context(ctx.clone()))
        .and_then(handle_detail);

    let replace = warp::path!("recipes" / Id)
        .and(warp::put())
        .map(|id| (id, true))
        .untuple_one();
    let patch = warp::path!("recipes" / Id)
        .and(warp::patch())
        .map(|id| (id, false))
        .untuple_one();
    let update = replace
        .or(patch)
        .unify()
        .and(session.clone())
        .and(json_body(&ctx))
        .and(with_context(ctx.clone()))
        .and_then(handle_update);

    let destroy = warp::path!("recipes" / Id)
        .and(warp::delete())
        .and(session.clone())
        .and(with_context(ctx.clone()))
        .and_then(handle_destroy);

    let upload = warp::path!("recipes" / Id / "upload-photos")
        .and(warp::patch().or(warp::post()).unify())
        .and(session)
        .and(warp::header::optional::<String>("content-type"))
        .and(warp::body::content_length_limit(ctx.max_upload_bytes))
        .and(warp::body::bytes())
        .and(with_context(ctx))
        .and_then(handle_upload);

    list.or(create)
        .unify()
        .or(detail)
        .unify()
        .or(update)
        .unify()
        .or(destroy)
        .unify()
        .or(upload)
        .unify()
        .boxed()
}
