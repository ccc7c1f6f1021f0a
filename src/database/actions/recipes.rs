use crate::{
    authentication::session::SessionData,
    error::{ApiError, ApiResult, StoreResult},
    schema::{Id, Recipe, RecipeChanges, RecipeDraft, RecipeRecord, TermKind},
    store::{RecipeFilter, RecipeStore},
};

async fn load_record(
    store: &dyn RecipeStore,
    recipe: Recipe,
    detail: bool,
) -> StoreResult<RecipeRecord> {
    let tags = store.recipe_terms(TermKind::Tag, recipe.id).await?;
    let ingredients = store.recipe_terms(TermKind::Ingredient, recipe.id).await?;

    Ok(if detail {
        RecipeRecord::detail(recipe, tags, ingredients)
    } else {
        RecipeRecord::summary(recipe, tags, ingredients)
    })
}

async fn owned_recipe(store: &dyn RecipeStore, session: &SessionData, id: Id) -> ApiResult<Recipe> {
    store
        .get_recipe(session.user_id, id)
        .await?
        .ok_or(ApiError::NotFound)
}

pub async fn create_recipe(
    store: &dyn RecipeStore,
    session: &SessionData,
    draft: RecipeDraft,
) -> ApiResult<RecipeRecord> {
    let owner = session.user_id;
    let recipe = store.create_recipe(owner, draft).await?;

    log::info!("User {owner} created recipe {}", recipe.id);
    Ok(load_record(store, recipe, true).await?)
}

pub async fn get_recipe(
    store: &dyn RecipeStore,
    session: &SessionData,
    id: Id,
) -> ApiResult<RecipeRecord> {
    let recipe = owned_recipe(store, session, id).await?;
    Ok(load_record(store, recipe, true).await?)
}

/// Lists the caller's recipes, narrowed by `filter` when it names tags or ingredients.
pub async fn list_recipes(
    store: &dyn RecipeStore,
    session: &SessionData,
    filter: &RecipeFilter,
) -> ApiResult<Vec<RecipeRecord>> {
    let recipes = store.list_recipes(session.user_id, filter).await?;

    let mut records = Vec::with_capacity(recipes.len());
    for recipe in recipes {
        records.push(load_record(store, recipe, false).await?);
    }

    Ok(records)
}

/// Applies only what `changes` carries: absent scalars keep their value and an
/// absent relation keeps its links.
pub async fn update_recipe(
    store: &dyn RecipeStore,
    session: &SessionData,
    id: Id,
    changes: RecipeChanges,
) -> ApiResult<RecipeRecord> {
    let recipe = store
        .update_recipe(session.user_id, id, changes)
        .await?
        .ok_or(ApiError::NotFound)?;

    Ok(load_record(store, recipe, true).await?)
}

pub async fn delete_recipe(store: &dyn RecipeStore, session: &SessionData, id: Id) -> ApiResult<()> {
    if !store.delete_recipe(session.user_id, id).await? {
        return Err(ApiError::NotFound);
    }

    log::info!("User {} deleted recipe {id}", session.user_id);
    Ok(())
}
