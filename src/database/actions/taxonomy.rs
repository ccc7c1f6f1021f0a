use crate::{
    authentication::session::SessionData,
    error::{ApiError, ApiResult, StoreError, ValidationError},
    schema::{Term, TermKind},
    store::RecipeStore,
};

fn name_conflict(kind: TermKind) -> impl Fn(StoreError) -> ApiError {
    move |e| match e {
        StoreError::Conflict(_) => ValidationError::field(
            "name",
            &format!("{} with this name already exists.", kind.label()),
        )
        .into(),
        e => e.into(),
    }
}

pub async fn list_terms(
    store: &dyn RecipeStore,
    session: &SessionData,
    kind: TermKind,
    assigned_only: bool,
) -> ApiResult<Vec<Term>> {
    Ok(store
        .list_terms(kind, session.user_id, assigned_only)
        .await?)
}

pub async fn create_term(
    store: &dyn RecipeStore,
    session: &SessionData,
    kind: TermKind,
    name: &str,
) -> ApiResult<Term> {
    let term = store
        .create_term(kind, session.user_id, name)
        .await
        .map_err(name_conflict(kind))?;

    log::debug!("Created {} {} for user {}", kind.label(), term.id, session.user_id);
    Ok(term)
}

pub async fn get_term(
    store: &dyn RecipeStore,
    session: &SessionData,
    kind: TermKind,
    name: &str,
) -> ApiResult<Term> {
    store
        .find_term(kind, session.user_id, name)
        .await?
        .ok_or(ApiError::NotFound)
}

/// `new_name` of `None` leaves the term as it is.
pub async fn rename_term(
    store: &dyn RecipeStore,
    session: &SessionData,
    kind: TermKind,
    name: &str,
    new_name: Option<String>,
) -> ApiResult<Term> {
    let term = get_term(store, session, kind, name).await?;
    let Some(new_name) = new_name else {
        return Ok(term);
    };

    store
        .rename_term(kind, session.user_id, term.id, &new_name)
        .await
        .map_err(name_conflict(kind))?
        .ok_or(ApiError::NotFound)
}

/// Removes the term and its recipe links, the recipes themselves stay.
pub async fn delete_term(
    store: &dyn RecipeStore,
    session: &SessionData,
    kind: TermKind,
    name: &str,
) -> ApiResult<()> {
    let term = get_term(store, session, kind, name).await?;
    if !store.delete_term(kind, session.user_id, term.id).await? {
        return Err(ApiError::NotFound);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;
    use crate::{
        memory::MemoryStore,
        schema::{Id, NewRecipe, RecipeDraft},
    };

    fn session(user_id: Id) -> SessionData {
        SessionData { user_id }
    }

    fn soup(tags: &[&str]) -> RecipeDraft {
        RecipeDraft {
            recipe: NewRecipe {
                title: "Soup".to_string(),
                description: String::new(),
                time_minutes: 10,
                price: dec!(3.50),
                link: String::new(),
            },
            tags: tags.iter().map(|t| t.to_string()).collect(),
            ingredients: vec![],
        }
    }

    #[tokio::test]
    async fn same_name_for_two_users_gives_two_rows() {
        let store = MemoryStore::new();

        let mine = create_term(&store, &session(1), TermKind::Tag, "spicy").await.unwrap();
        let theirs = create_term(&store, &session(2), TermKind::Tag, "spicy").await.unwrap();

        assert_ne!(mine.id, theirs.id);
        assert_eq!(
            list_terms(&store, &session(1), TermKind::Tag, false).await.unwrap(),
            vec![mine]
        );
        assert_eq!(
            list_terms(&store, &session(2), TermKind::Tag, false).await.unwrap(),
            vec![theirs]
        );
    }

    #[tokio::test]
    async fn deleting_a_term_unlinks_it_but_keeps_recipes() {
        let store = MemoryStore::new();
        let recipe = store.create_recipe(1, soup(&["vegan", "quick"])).await.unwrap();

        delete_term(&store, &session(1), TermKind::Tag, "vegan").await.unwrap();

        let linked = store.recipe_terms(TermKind::Tag, recipe.id).await.unwrap();
        assert_eq!(linked.len(), 1);
        assert_eq!(linked[0].name, "quick");
        assert!(store.get_recipe(1, recipe.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn assigned_only_lists_linked_terms() {
        let store = MemoryStore::new();
        store.create_recipe(1, soup(&["vegan"])).await.unwrap();
        create_term(&store, &session(1), TermKind::Tag, "zesty").await.unwrap();

        let all = list_terms(&store, &session(1), TermKind::Tag, false).await.unwrap();
        let assigned = list_terms(&store, &session(1), TermKind::Tag, true).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].name, "zesty");
        assert_eq!(assigned.len(), 1);
        assert_eq!(assigned[0].name, "vegan");
    }

    #[tokio::test]
    async fn rename_conflict_is_a_validation_error() {
        let store = MemoryStore::new();
        create_term(&store, &session(1), TermKind::Tag, "a").await.unwrap();
        create_term(&store, &session(1), TermKind::Tag, "b").await.unwrap();

        let err = rename_term(&store, &session(1), TermKind::Tag, "a", Some("b".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));

        let renamed = rename_term(&store, &session(1), TermKind::Tag, "a", Some("c".to_string()))
            .await
            .unwrap();
        assert_eq!(renamed.name, "c");
    }

    #[tokio::test]
    async fn other_users_terms_are_not_found() {
        let store = MemoryStore::new();
        create_term(&store, &session(1), TermKind::Tag, "mine").await.unwrap();

        let err = get_term(&store, &session(2), TermKind::Tag, "mine").await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound));
        let err = delete_term(&store, &session(2), TermKind::Tag, "mine").await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound));
    }
}
