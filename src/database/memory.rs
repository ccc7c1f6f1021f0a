//! In-memory recipe store, used by the test suites.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::{
    error::{StoreError, StoreResult},
    schema::{AuthToken, Id, NewUser, Recipe, RecipeChanges, RecipeDraft, Term, TermKind, User},
    store::{RecipeFilter, RecipeStore},
};

#[derive(Debug, Default)]
struct Tables {
    last_id: Id,
    users: BTreeMap<Id, User>,
    tokens: HashMap<String, AuthToken>,
    terms: HashMap<TermKind, BTreeMap<Id, Term>>,
    recipes: BTreeMap<Id, Recipe>,
    /// `(recipe_id, term_id)` pairs per kind.
    links: HashMap<TermKind, BTreeSet<(Id, Id)>>,
}

impl Tables {
    fn next_id(&mut self) -> Id {
        self.last_id += 1;
        self.last_id
    }

    fn terms(&mut self, kind: TermKind) -> &mut BTreeMap<Id, Term> {
        self.terms.entry(kind).or_default()
    }

    fn links(&mut self, kind: TermKind) -> &mut BTreeSet<(Id, Id)> {
        self.links.entry(kind).or_default()
    }

    fn find_term(&self, kind: TermKind, owner: Id, name: &str) -> Option<Term> {
        self.terms
            .get(&kind)?
            .values()
            .find(|t| t.user_id == owner && t.name == name)
            .cloned()
    }

    /// Get-or-create on `(owner, name)`.
    fn term_id(&mut self, kind: TermKind, owner: Id, name: &str) -> Id {
        if let Some(term) = self.find_term(kind, owner, name) {
            return term.id;
        }

        let term = Term {
            id: self.next_id(),
            name: name.to_string(),
            user_id: owner,
        };
        let id = term.id;
        self.terms(kind).insert(id, term);
        id
    }

    fn link_names(&mut self, kind: TermKind, owner: Id, recipe_id: Id, names: &[String]) {
        for name in names {
            let term_id = self.term_id(kind, owner, name);
            self.links(kind).insert((recipe_id, term_id));
        }
    }

    fn email_taken(&self, email: &str, except: Option<Id>) -> bool {
        self.users
            .values()
            .any(|u| u.email == email && Some(u.id) != except)
    }

    fn matches(&self, kind: TermKind, recipe_id: Id, names: &[String]) -> bool {
        let Some(links) = self.links.get(&kind) else {
            return false;
        };
        let Some(terms) = self.terms.get(&kind) else {
            return false;
        };
        links
            .iter()
            .filter(|(r, _)| *r == recipe_id)
            .filter_map(|(_, term_id)| terms.get(term_id))
            .any(|term| names.contains(&term.name))
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecipeStore for MemoryStore {
    async fn create_user(&self, user: NewUser) -> StoreResult<User> {
        let mut tables = self.tables.write().await;
        if tables.email_taken(&user.email, None) {
            return Err(StoreError::Conflict(format!(
                "user with email {} already exists",
                user.email
            )));
        }

        let user = User {
            id: tables.next_id(),
            email: user.email,
            name: user.name,
            password: user.password,
            is_active: true,
            is_staff: false,
        };
        tables.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn get_user(&self, id: Id) -> StoreResult<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables.users.values().find(|u| u.email == email).cloned())
    }

    async fn update_user(&self, user: &User) -> StoreResult<User> {
        let mut tables = self.tables.write().await;
        if tables.email_taken(&user.email, Some(user.id)) {
            return Err(StoreError::Conflict(format!(
                "user with email {} already exists",
                user.email
            )));
        }
        match tables.users.get_mut(&user.id) {
            Some(stored) => {
                *stored = user.clone();
                Ok(user.clone())
            }
            None => Err(StoreError::Other(format!("no user with id {}", user.id))),
        }
    }

    async fn get_or_create_token(&self, user_id: Id, candidate: &str) -> StoreResult<AuthToken> {
        let mut tables = self.tables.write().await;
        if let Some(token) = tables.tokens.values().find(|t| t.user_id == user_id) {
            return Ok(token.clone());
        }

        let token = AuthToken {
            key: candidate.to_string(),
            user_id,
            created: Utc::now(),
        };
        tables.tokens.insert(token.key.clone(), token.clone());
        Ok(token)
    }

    async fn find_token(&self, key: &str) -> StoreResult<Option<AuthToken>> {
        let tables = self.tables.read().await;
        Ok(tables.tokens.get(key).cloned())
    }

    async fn create_term(&self, kind: TermKind, owner: Id, name: &str) -> StoreResult<Term> {
        let mut tables = self.tables.write().await;
        if tables.find_term(kind, owner, name).is_some() {
            return Err(StoreError::Conflict(format!(
                "{} {name} already exists",
                kind.label()
            )));
        }

        let term = Term {
            id: tables.next_id(),
            name: name.to_string(),
            user_id: owner,
        };
        tables.terms(kind).insert(term.id, term.clone());
        Ok(term)
    }

    async fn find_term(&self, kind: TermKind, owner: Id, name: &str) -> StoreResult<Option<Term>> {
        let tables = self.tables.read().await;
        Ok(tables.find_term(kind, owner, name))
    }

    async fn list_terms(
        &self,
        kind: TermKind,
        owner: Id,
        assigned_only: bool,
    ) -> StoreResult<Vec<Term>> {
        let tables = self.tables.read().await;
        let assigned: BTreeSet<Id> = tables
            .links
            .get(&kind)
            .map(|links| links.iter().map(|(_, term_id)| *term_id).collect())
            .unwrap_or_default();

        let mut terms: Vec<Term> = tables
            .terms
            .get(&kind)
            .map(|terms| {
                terms
                    .values()
                    .filter(|t| t.user_id == owner)
                    .filter(|t| !assigned_only || assigned.contains(&t.id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        terms.sort_by(|a, b| b.name.cmp(&a.name));
        Ok(terms)
    }

    async fn rename_term(
        &self,
        kind: TermKind,
        owner: Id,
        id: Id,
        name: &str,
    ) -> StoreResult<Option<Term>> {
        let mut tables = self.tables.write().await;
        if let Some(existing) = tables.find_term(kind, owner, name) {
            if existing.id != id {
                return Err(StoreError::Conflict(format!(
                    "{} {name} already exists",
                    kind.label()
                )));
            }
        }

        match tables.terms(kind).get_mut(&id) {
            Some(term) if term.user_id == owner => {
                term.name = name.to_string();
                Ok(Some(term.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn delete_term(&self, kind: TermKind, owner: Id, id: Id) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        let owned = matches!(tables.terms(kind).get(&id), Some(t) if t.user_id == owner);
        if !owned {
            return Ok(false);
        }

        tables.terms(kind).remove(&id);
        tables.links(kind).retain(|(_, term_id)| *term_id != id);
        Ok(true)
    }

    async fn create_recipe(&self, owner: Id, draft: RecipeDraft) -> StoreResult<Recipe> {
        let mut tables = self.tables.write().await;
        let recipe = Recipe {
            id: tables.next_id(),
            user_id: owner,
            title: draft.recipe.title.clone(),
            description: draft.recipe.description.clone(),
            time_minutes: draft.recipe.time_minutes,
            price: draft.recipe.price,
            link: draft.recipe.link.clone(),
            image: None,
        };
        tables.recipes.insert(recipe.id, recipe.clone());
        for kind in TermKind::ALL {
            tables.link_names(kind, owner, recipe.id, draft.names(kind));
        }
        Ok(recipe)
    }

    async fn get_recipe(&self, owner: Id, id: Id) -> StoreResult<Option<Recipe>> {
        let tables = self.tables.read().await;
        Ok(tables
            .recipes
            .get(&id)
            .filter(|r| r.user_id == owner)
            .cloned())
    }

    async fn list_recipes(&self, owner: Id, filter: &RecipeFilter) -> StoreResult<Vec<Recipe>> {
        let tables = self.tables.read().await;
        let recipes = tables
            .recipes
            .values()
            .filter(|r| r.user_id == owner)
            .filter(|r| {
                TermKind::ALL
                    .into_iter()
                    .all(|kind| match filter.names(kind) {
                        Some(names) => tables.matches(kind, r.id, names),
                        None => true,
                    })
            })
            .cloned()
            .collect();
        Ok(recipes)
    }

    async fn update_recipe(
        &self,
        owner: Id,
        id: Id,
        changes: RecipeChanges,
    ) -> StoreResult<Option<Recipe>> {
        let mut tables = self.tables.write().await;
        if !matches!(tables.recipes.get(&id), Some(r) if r.user_id == owner) {
            return Ok(None);
        }

        for kind in TermKind::ALL {
            if let Some(names) = changes.names(kind) {
                tables.links(kind).retain(|(r, _)| *r != id);
                tables.link_names(kind, owner, id, names);
            }
        }

        let Some(recipe) = tables.recipes.get_mut(&id) else {
            return Ok(None);
        };
        changes.fields.apply(recipe);
        Ok(Some(recipe.clone()))
    }

    async fn replace_recipe_image(
        &self,
        owner: Id,
        id: Id,
        image: &str,
    ) -> StoreResult<Option<Option<String>>> {
        let mut tables = self.tables.write().await;
        match tables.recipes.get_mut(&id) {
            Some(recipe) if recipe.user_id == owner => {
                Ok(Some(recipe.image.replace(image.to_string())))
            }
            _ => Ok(None),
        }
    }

    async fn delete_recipe(&self, owner: Id, id: Id) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        let owned = matches!(tables.recipes.get(&id), Some(r) if r.user_id == owner);
        if !owned {
            return Ok(false);
        }

        tables.recipes.remove(&id);
        for kind in TermKind::ALL {
            tables.links(kind).retain(|(recipe_id, _)| *recipe_id != id);
        }
        Ok(true)
    }

    async fn recipe_terms(&self, kind: TermKind, recipe_id: Id) -> StoreResult<Vec<Term>> {
        let tables = self.tables.read().await;
        let (Some(links), Some(terms)) = (tables.links.get(&kind), tables.terms.get(&kind)) else {
            return Ok(vec![]);
        };

        let mut linked: Vec<Term> = links
            .iter()
            .filter(|(r, _)| *r == recipe_id)
            .filter_map(|(_, term_id)| terms.get(term_id).cloned())
            .collect();
        linked.sort_by_key(|t| t.id);
        Ok(linked)
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;
    use crate::schema::{NewRecipe, RecipeFields};

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
    async fn recipe_terms_are_reused_per_owner() {
        let store = MemoryStore::new();

        let first = store.create_recipe(1, soup(&["spicy"])).await.unwrap();
        let second = store.create_recipe(1, soup(&["spicy"])).await.unwrap();
        let foreign = store.create_recipe(2, soup(&["spicy"])).await.unwrap();

        let a = store.recipe_terms(TermKind::Tag, first.id).await.unwrap();
        let b = store.recipe_terms(TermKind::Tag, second.id).await.unwrap();
        let c = store.recipe_terms(TermKind::Tag, foreign.id).await.unwrap();
        assert_eq!(a, b);
        assert_ne!(a[0].id, c[0].id);
        assert_eq!(store.list_terms(TermKind::Tag, 1, false).await.unwrap(), a);
    }

    #[tokio::test]
    async fn create_term_rejects_duplicate_names() {
        let store = MemoryStore::new();
        store.create_term(TermKind::Ingredient, 1, "salt").await.unwrap();

        let err = store
            .create_term(TermKind::Ingredient, 1, "salt")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn recipes_are_invisible_to_other_owners() {
        let store = MemoryStore::new();
        let recipe = store.create_recipe(1, soup(&[])).await.unwrap();

        assert!(store.get_recipe(2, recipe.id).await.unwrap().is_none());
        assert!(store
            .update_recipe(2, recipe.id, RecipeChanges::default())
            .await
            .unwrap()
            .is_none());
        assert!(store
            .replace_recipe_image(2, recipe.id, "x.png")
            .await
            .unwrap()
            .is_none());
        assert!(!store.delete_recipe(2, recipe.id).await.unwrap());
        assert!(store.get_recipe(1, recipe.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn update_writes_only_present_fields() {
        let store = MemoryStore::new();
        let recipe = store.create_recipe(1, soup(&["vegan"])).await.unwrap();
        store
            .replace_recipe_image(1, recipe.id, "uploads/recipe/a.png")
            .await
            .unwrap();

        let changes = RecipeChanges {
            fields: RecipeFields {
                title: Some("Stew".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        let updated = store.update_recipe(1, recipe.id, changes).await.unwrap().unwrap();

        assert_eq!(updated.title, "Stew");
        assert_eq!(updated.price, dec!(3.50));
        assert_eq!(updated.image.as_deref(), Some("uploads/recipe/a.png"));
        assert_eq!(store.recipe_terms(TermKind::Tag, recipe.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn replacing_image_returns_previous_path() {
        let store = MemoryStore::new();
        let recipe = store.create_recipe(1, soup(&[])).await.unwrap();

        let first = store.replace_recipe_image(1, recipe.id, "a.png").await.unwrap();
        let second = store.replace_recipe_image(1, recipe.id, "b.png").await.unwrap();

        assert_eq!(first, Some(None));
        assert_eq!(second, Some(Some("a.png".to_string())));
    }

    #[tokio::test]
    async fn deleting_recipe_keeps_terms() {
        let store = MemoryStore::new();
        let recipe = store.create_recipe(1, soup(&["vegan"])).await.unwrap();
        let tags = store.recipe_terms(TermKind::Tag, recipe.id).await.unwrap();

        assert!(store.delete_recipe(1, recipe.id).await.unwrap());
        assert_eq!(store.list_terms(TermKind::Tag, 1, false).await.unwrap(), tags);
        assert!(store.list_terms(TermKind::Tag, 1, true).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn token_is_created_once() {
        let store = MemoryStore::new();

        let first = store.get_or_create_token(7, "aaa").await.unwrap();
        let second = store.get_or_create_token(7, "bbb").await.unwrap();

        assert_eq!(first.key, "aaa");
        assert_eq!(second.key, "aaa");
        assert!(store.find_token("bbb").await.unwrap().is_none());
    }
}
