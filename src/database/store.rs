use std::sync::Arc;

use async_trait::async_trait;

use super::{
    error::StoreResult,
    schema::{AuthToken, Id, NewUser, Recipe, RecipeChanges, RecipeDraft, Term, TermKind, User},
};

/// Filter options for listing recipes. Within one list any name matches,
/// across lists every present list must match.
#[derive(Debug, Clone, Default)]
pub struct RecipeFilter {
    pub tags: Option<Vec<String>>,
    pub ingredients: Option<Vec<String>>,
}

impl RecipeFilter {
    pub fn names(&self, kind: TermKind) -> Option<&[String]> {
        match kind {
            TermKind::Tag => self.tags.as_deref(),
            TermKind::Ingredient => self.ingredients.as_deref(),
        }
    }
}

pub type SharedStore = Arc<dyn RecipeStore>;

/// Persistence for users, tokens, recipes and their terms.
///
/// Every recipe and term operation takes the owning user id; rows belonging to
/// someone else are indistinguishable from missing rows.
#[async_trait]
pub trait RecipeStore: Send + Sync {
    // Users

    /// Inserts a user whose `password` is already hashed.
    /// Fails with `StoreError::Conflict` when the email is taken.
    async fn create_user(&self, user: NewUser) -> StoreResult<User>;

    async fn get_user(&self, id: Id) -> StoreResult<Option<User>>;

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;

    async fn update_user(&self, user: &User) -> StoreResult<User>;

    // Tokens

    /// Returns the user's token, storing `candidate` only if none exists yet.
    async fn get_or_create_token(&self, user_id: Id, candidate: &str) -> StoreResult<AuthToken>;

    async fn find_token(&self, key: &str) -> StoreResult<Option<AuthToken>>;

    // Terms

    /// Fails with `StoreError::Conflict` when the name is taken for this owner.
    async fn create_term(&self, kind: TermKind, owner: Id, name: &str) -> StoreResult<Term>;

    async fn find_term(&self, kind: TermKind, owner: Id, name: &str) -> StoreResult<Option<Term>>;

    /// Owner's terms by name descending; `assigned_only` keeps the ones linked to a recipe.
    async fn list_terms(
        &self,
        kind: TermKind,
        owner: Id,
        assigned_only: bool,
    ) -> StoreResult<Vec<Term>>;

    async fn rename_term(
        &self,
        kind: TermKind,
        owner: Id,
        id: Id,
        name: &str,
    ) -> StoreResult<Option<Term>>;

    async fn delete_term(&self, kind: TermKind, owner: Id, id: Id) -> StoreResult<bool>;

    // Recipes

    /// Inserts the recipe and links its terms as one unit. Term names are
    /// resolved per owner, reusing an existing row before creating one.
    async fn create_recipe(&self, owner: Id, draft: RecipeDraft) -> StoreResult<Recipe>;

    async fn get_recipe(&self, owner: Id, id: Id) -> StoreResult<Option<Recipe>>;

    /// Owner's recipes by id ascending, each at most once.
    async fn list_recipes(&self, owner: Id, filter: &RecipeFilter) -> StoreResult<Vec<Recipe>>;

    /// Writes only the columns and relations `changes` carries, as one unit.
    /// A present relation replaces the recipe's links of that kind.
    async fn update_recipe(
        &self,
        owner: Id,
        id: Id,
        changes: RecipeChanges,
    ) -> StoreResult<Option<Recipe>>;

    /// Sets the image path and hands back the one it replaced.
    /// The outer `None` means the recipe does not exist for `owner`.
    async fn replace_recipe_image(
        &self,
        owner: Id,
        id: Id,
        image: &str,
    ) -> StoreResult<Option<Option<String>>>;

    /// Removes the recipe and its links; linked terms stay.
    async fn delete_recipe(&self, owner: Id, id: Id) -> StoreResult<bool>;

    /// Linked terms by id ascending.
    async fn recipe_terms(&self, kind: TermKind, recipe_id: Id) -> StoreResult<Vec<Term>>;
}
