use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgConnection, Pool, Postgres, QueryBuilder};

use super::{
    error::StoreResult,
    schema::{AuthToken, Id, NewUser, Recipe, RecipeChanges, RecipeDraft, Term, TermKind, User},
    store::{RecipeFilter, RecipeStore},
};

pub async fn connect(database_url: &str, max_connections: u32) -> StoreResult<Pool<Postgres>> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;

    Ok(pool)
}

pub async fn migrate(pool: &Pool<Postgres>) -> StoreResult<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Single-statement get-or-create on `(user_id, name)`. The no-op update makes
/// RETURNING yield the existing row on conflict.
async fn upsert_term(
    conn: &mut PgConnection,
    kind: TermKind,
    owner: Id,
    name: &str,
) -> StoreResult<Term> {
    let table = kind.table();
    let term: Term = sqlx::query_as(&format!(
        "
        INSERT INTO {table} (user_id, name)
        VALUES ($1, $2)
        ON CONFLICT (user_id, name) DO UPDATE SET name = EXCLUDED.name
        RETURNING id, name, user_id;
    "
    ))
    .bind(owner)
    .bind(name)
    .fetch_one(&mut *conn)
    .await?;

    Ok(term)
}

async fn link_names(
    conn: &mut PgConnection,
    kind: TermKind,
    owner: Id,
    recipe_id: Id,
    names: &[String],
) -> StoreResult<()> {
    let (link, column) = (kind.link_table(), kind.link_column());
    for name in names {
        let term = upsert_term(conn, kind, owner, name).await?;
        sqlx::query(&format!(
            "INSERT INTO {link} (recipe_id, {column}) VALUES ($1, $2) ON CONFLICT DO NOTHING"
        ))
        .bind(recipe_id)
        .bind(term.id)
        .execute(&mut *conn)
        .await?;
    }
    log::trace!("> Linked {} {} names to recipe {recipe_id}", names.len(), kind.label());

    Ok(())
}

#[derive(Clone)]
pub struct PgStore {
    pool: Pool<Postgres>,
}

impl PgStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RecipeStore for PgStore {
    async fn create_user(&self, user: NewUser) -> StoreResult<User> {
        let row: User = sqlx::query_as(
            "
            INSERT INTO users (email, name, password)
            VALUES ($1, $2, $3)
            RETURNING *;
        ",
        )
        .bind(user.email)
        .bind(user.name)
        .bind(user.password)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    async fn get_user(&self, id: Id) -> StoreResult<Option<User>> {
        let row: Option<User> = sqlx::query_as("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row)
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let row: Option<User> = sqlx::query_as("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row)
    }

    async fn update_user(&self, user: &User) -> StoreResult<User> {
        let row: User = sqlx::query_as(
            "
            UPDATE users SET email = $1, name = $2, password = $3, is_active = $4, is_staff = $5
            WHERE id = $6
            RETURNING *;
        ",
        )
        .bind(&user.email)
        .bind(&user.name)
        .bind(&user.password)
        .bind(user.is_active)
        .bind(user.is_staff)
        .bind(user.id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    async fn get_or_create_token(&self, user_id: Id, candidate: &str) -> StoreResult<AuthToken> {
        // The no-op update makes RETURNING yield the existing row on conflict.
        let token: AuthToken = sqlx::query_as(
            "
            INSERT INTO auth_tokens (key, user_id)
            VALUES ($1, $2)
            ON CONFLICT (user_id) DO UPDATE SET user_id = EXCLUDED.user_id
            RETURNING key, user_id, created;
        ",
        )
        .bind(candidate)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(token)
    }

    async fn find_token(&self, key: &str) -> StoreResult<Option<AuthToken>> {
        let token: Option<AuthToken> =
            sqlx::query_as("SELECT key, user_id, created FROM auth_tokens WHERE key = $1")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;

        Ok(token)
    }

    async fn create_term(&self, kind: TermKind, owner: Id, name: &str) -> StoreResult<Term> {
        let table = kind.table();
        let term: Term = sqlx::query_as(&format!(
            "INSERT INTO {table} (user_id, name) VALUES ($1, $2) RETURNING id, name, user_id"
        ))
        .bind(owner)
        .bind(name)
        .fetch_one(&self.pool)
        .await?;

        Ok(term)
    }

    async fn find_term(&self, kind: TermKind, owner: Id, name: &str) -> StoreResult<Option<Term>> {
        let table = kind.table();
        let term: Option<Term> = sqlx::query_as(&format!(
            "SELECT id, name, user_id FROM {table} WHERE user_id = $1 AND name = $2"
        ))
        .bind(owner)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(term)
    }

    async fn list_terms(
        &self,
        kind: TermKind,
        owner: Id,
        assigned_only: bool,
    ) -> StoreResult<Vec<Term>> {
        let (table, link, column) = (kind.table(), kind.link_table(), kind.link_column());
        let list: Vec<Term> = sqlx::query_as(&format!(
            "
            SELECT t.id, t.name, t.user_id
            FROM {table} t
            WHERE t.user_id = $1
              AND (NOT $2 OR EXISTS (SELECT 1 FROM {link} l WHERE l.{column} = t.id))
            ORDER BY t.name DESC
        "
        ))
        .bind(owner)
        .bind(assigned_only)
        .fetch_all(&self.pool)
        .await?;

        Ok(list)
    }

    async fn rename_term(
        &self,
        kind: TermKind,
        owner: Id,
        id: Id,
        name: &str,
    ) -> StoreResult<Option<Term>> {
        let table = kind.table();
        let term: Option<Term> = sqlx::query_as(&format!(
            "UPDATE {table} SET name = $1 WHERE id = $2 AND user_id = $3 RETURNING id, name, user_id"
        ))
        .bind(name)
        .bind(id)
        .bind(owner)
        .fetch_optional(&self.pool)
        .await?;

        Ok(term)
    }

    async fn delete_term(&self, kind: TermKind, owner: Id, id: Id) -> StoreResult<bool> {
        let table = kind.table();
        let result = sqlx::query(&format!("DELETE FROM {table} WHERE id = $1 AND user_id = $2"))
            .bind(id)
            .bind(owner)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn create_recipe(&self, owner: Id, draft: RecipeDraft) -> StoreResult<Recipe> {
        let mut tx = self.pool.begin().await?;

        let recipe: Recipe = sqlx::query_as(
            "
            INSERT INTO recipes (user_id, title, description, time_minutes, price, link)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *;
        ",
        )
        .bind(owner)
        .bind(&draft.recipe.title)
        .bind(&draft.recipe.description)
        .bind(draft.recipe.time_minutes)
        .bind(draft.recipe.price)
        .bind(&draft.recipe.link)
        .fetch_one(&mut *tx)
        .await?;

        for kind in TermKind::ALL {
            link_names(&mut tx, kind, owner, recipe.id, draft.names(kind)).await?;
        }

        tx.commit().await?;
        Ok(recipe)
    }

    async fn get_recipe(&self, owner: Id, id: Id) -> StoreResult<Option<Recipe>> {
        let row: Option<Recipe> =
            sqlx::query_as("SELECT * FROM recipes WHERE id = $1 AND user_id = $2")
                .bind(id)
                .bind(owner)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row)
    }

    async fn list_recipes(&self, owner: Id, filter: &RecipeFilter) -> StoreResult<Vec<Recipe>> {
        let mut query: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT r.* FROM recipes r WHERE r.user_id = ");
        query.push_bind(owner);

        for kind in TermKind::ALL {
            if let Some(names) = filter.names(kind) {
                let (table, link, column) = (kind.table(), kind.link_table(), kind.link_column());
                query.push(format!(
                    " AND EXISTS (SELECT 1 FROM {link} l INNER JOIN {table} t ON t.id = l.{column} WHERE l.recipe_id = r.id AND t.name = ANY("
                ));
                query.push_bind(names.to_vec());
                query.push("))");
            }
        }
        query.push(" ORDER BY r.id");

        let rows: Vec<Recipe> = query.build_query_as().fetch_all(&self.pool).await?;

        Ok(rows)
    }

    async fn update_recipe(
        &self,
        owner: Id,
        id: Id,
        changes: RecipeChanges,
    ) -> StoreResult<Option<Recipe>> {
        let mut tx = self.pool.begin().await?;

        // Row lock keeps concurrent relinks of the same recipe apart.
        let found: Option<Id> =
            sqlx::query_scalar("SELECT id FROM recipes WHERE id = $1 AND user_id = $2 FOR UPDATE")
                .bind(id)
                .bind(owner)
                .fetch_optional(&mut *tx)
                .await?;
        if found.is_none() {
            return Ok(None);
        }

        for kind in TermKind::ALL {
            if let Some(names) = changes.names(kind) {
                let link = kind.link_table();
                sqlx::query(&format!("DELETE FROM {link} WHERE recipe_id = $1"))
                    .bind(id)
                    .execute(&mut *tx)
                    .await?;
                link_names(&mut tx, kind, owner, id, names).await?;
            }
        }

        let recipe: Recipe = if changes.fields.is_empty() {
            sqlx::query_as("SELECT * FROM recipes WHERE id = $1")
                .bind(id)
                .fetch_one(&mut *tx)
                .await?
        } else {
            let fields = changes.fields;
            let mut query: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE recipes SET ");
            let mut set = query.separated(", ");
            if let Some(title) = fields.title {
                set.push("title = ").push_bind_unseparated(title);
            }
            if let Some(description) = fields.description {
                set.push("description = ").push_bind_unseparated(description);
            }
            if let Some(time_minutes) = fields.time_minutes {
                set.push("time_minutes = ").push_bind_unseparated(time_minutes);
            }
            if let Some(price) = fields.price {
                set.push("price = ").push_bind_unseparated(price);
            }
            if let Some(link) = fields.link {
                set.push("link = ").push_bind_unseparated(link);
            }
            query.push(" WHERE id = ");
            query.push_bind(id);
            query.push(" RETURNING *");

            query.build_query_as().fetch_one(&mut *tx).await?
        };

        tx.commit().await?;
        Ok(Some(recipe))
    }

    async fn replace_recipe_image(
        &self,
        owner: Id,
        id: Id,
        image: &str,
    ) -> StoreResult<Option<Option<String>>> {
        let previous: Option<Option<String>> = sqlx::query_scalar(
            "
            UPDATE recipes r SET image = $1
            FROM (SELECT id, image FROM recipes WHERE id = $2 AND user_id = $3 FOR UPDATE) old
            WHERE r.id = old.id
            RETURNING old.image;
        ",
        )
        .bind(image)
        .bind(id)
        .bind(owner)
        .fetch_optional(&self.pool)
        .await?;

        Ok(previous)
    }

    async fn delete_recipe(&self, owner: Id, id: Id) -> StoreResult<bool> {
        // Link rows go with the recipe through ON DELETE CASCADE.
        let result = sqlx::query("DELETE FROM recipes WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(owner)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn recipe_terms(&self, kind: TermKind, recipe_id: Id) -> StoreResult<Vec<Term>> {
        let (table, link, column) = (kind.table(), kind.link_table(), kind.link_column());
        let list: Vec<Term> = sqlx::query_as(&format!(
            "
            SELECT t.id, t.name, t.user_id
            FROM {table} t
            INNER JOIN {link} l ON l.{column} = t.id
            WHERE l.recipe_id = $1
            ORDER BY t.id
        "
        ))
        .bind(recipe_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(list)
    }
}

/// These run against the server named by `DATABASE_URL`; each test gets a
/// fresh database with the migrations applied.
#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;
    use sqlx::PgPool;

    use super::*;
    use crate::{
        error::StoreError,
        schema::{NewRecipe, RecipeFields},
    };

    async fn user(store: &PgStore, email: &str) -> Id {
        store
            .create_user(NewUser {
                email: email.to_string(),
                name: "Test".to_string(),
                password: "hash".to_string(),
            })
            .await
            .unwrap()
            .id
    }

    fn draft(title: &str, tags: &[&str], ingredients: &[&str]) -> RecipeDraft {
        RecipeDraft {
            recipe: NewRecipe {
                title: title.to_string(),
                description: String::new(),
                time_minutes: 10,
                price: dec!(3.50),
                link: String::new(),
            },
            tags: tags.iter().map(|t| t.to_string()).collect(),
            ingredients: ingredients.iter().map(|t| t.to_string()).collect(),
        }
    }

    fn names(terms: &[Term]) -> Vec<&str> {
        terms.iter().map(|t| t.name.as_str()).collect()
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn terms_are_upserted_per_owner(pool: PgPool) {
        let store = PgStore::new(pool);
        let (alice, bob) = (user(&store, "a@x.com").await, user(&store, "b@x.com").await);

        let first = store.create_recipe(alice, draft("Soup", &["spicy"], &[])).await.unwrap();
        let second = store.create_recipe(alice, draft("Stew", &["spicy"], &[])).await.unwrap();
        let foreign = store.create_recipe(bob, draft("Curry", &["spicy"], &[])).await.unwrap();

        let a = store.recipe_terms(TermKind::Tag, first.id).await.unwrap();
        let b = store.recipe_terms(TermKind::Tag, second.id).await.unwrap();
        let c = store.recipe_terms(TermKind::Tag, foreign.id).await.unwrap();
        assert_eq!(a, b);
        assert_ne!(a[0].id, c[0].id);
        assert_eq!(store.list_terms(TermKind::Tag, alice, false).await.unwrap(), a);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn duplicate_term_names_conflict(pool: PgPool) {
        let store = PgStore::new(pool);
        let owner = user(&store, "a@x.com").await;

        store.create_term(TermKind::Ingredient, owner, "salt").await.unwrap();
        let pepper = store.create_term(TermKind::Ingredient, owner, "pepper").await.unwrap();

        let err = store
            .create_term(TermKind::Ingredient, owner, "salt")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        let err = store
            .rename_term(TermKind::Ingredient, owner, pepper.id, "salt")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn filters_union_names_and_intersect_kinds(pool: PgPool) {
        let store = PgStore::new(pool);
        let owner = user(&store, "a@x.com").await;

        let soup = store.create_recipe(owner, draft("Soup", &["vegan"], &["leek"])).await.unwrap();
        let stew = store.create_recipe(owner, draft("Stew", &["quick"], &["beef"])).await.unwrap();
        store.create_recipe(owner, draft("Cake", &["sweet"], &["leek"])).await.unwrap();

        let filter = RecipeFilter {
            tags: Some(vec!["vegan".to_string(), "quick".to_string()]),
            ingredients: None,
        };
        let ids: Vec<Id> = store.list_recipes(owner, &filter).await.unwrap().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![soup.id, stew.id]);

        let filter = RecipeFilter {
            tags: Some(vec!["vegan".to_string(), "quick".to_string()]),
            ingredients: Some(vec!["leek".to_string()]),
        };
        let ids: Vec<Id> = store.list_recipes(owner, &filter).await.unwrap().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![soup.id]);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn assigned_only_skips_unlinked_terms(pool: PgPool) {
        let store = PgStore::new(pool);
        let owner = user(&store, "a@x.com").await;

        store.create_recipe(owner, draft("Soup", &["vegan"], &[])).await.unwrap();
        store.create_term(TermKind::Tag, owner, "zesty").await.unwrap();

        let all = store.list_terms(TermKind::Tag, owner, false).await.unwrap();
        let assigned = store.list_terms(TermKind::Tag, owner, true).await.unwrap();
        assert_eq!(names(&all), ["zesty", "vegan"]);
        assert_eq!(names(&assigned), ["vegan"]);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn update_writes_only_present_columns(pool: PgPool) {
        let store = PgStore::new(pool);
        let owner = user(&store, "a@x.com").await;
        let recipe = store.create_recipe(owner, draft("Soup", &["vegan"], &["leek"])).await.unwrap();

        // A write landing after the caller last read the row.
        sqlx::query("UPDATE recipes SET image = 'uploads/recipe/a.png', price = 9.99 WHERE id = $1")
            .bind(recipe.id)
            .execute(&store.pool)
            .await
            .unwrap();

        let changes = RecipeChanges {
            fields: RecipeFields {
                title: Some("Stew".to_string()),
                ..Default::default()
            },
            tags: Some(vec![]),
            ingredients: None,
        };
        let updated = store.update_recipe(owner, recipe.id, changes).await.unwrap().unwrap();

        assert_eq!(updated.title, "Stew");
        assert_eq!(updated.price, dec!(9.99));
        assert_eq!(updated.image.as_deref(), Some("uploads/recipe/a.png"));
        assert!(store.recipe_terms(TermKind::Tag, recipe.id).await.unwrap().is_empty());
        assert_eq!(
            names(&store.recipe_terms(TermKind::Ingredient, recipe.id).await.unwrap()),
            ["leek"]
        );
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn foreign_recipes_are_untouched(pool: PgPool) {
        let store = PgStore::new(pool);
        let (alice, bob) = (user(&store, "a@x.com").await, user(&store, "b@x.com").await);
        let recipe = store.create_recipe(alice, draft("Soup", &[], &[])).await.unwrap();

        let changes = RecipeChanges {
            fields: RecipeFields {
                title: Some("Mine".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(store.update_recipe(bob, recipe.id, changes).await.unwrap().is_none());
        assert!(store.replace_recipe_image(bob, recipe.id, "x.png").await.unwrap().is_none());
        assert!(!store.delete_recipe(bob, recipe.id).await.unwrap());
        assert_eq!(store.get_recipe(alice, recipe.id).await.unwrap().unwrap().title, "Soup");
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn image_replacement_reports_previous_path(pool: PgPool) {
        let store = PgStore::new(pool);
        let owner = user(&store, "a@x.com").await;
        let recipe = store.create_recipe(owner, draft("Soup", &[], &[])).await.unwrap();

        let first = store.replace_recipe_image(owner, recipe.id, "a.png").await.unwrap();
        let second = store.replace_recipe_image(owner, recipe.id, "b.png").await.unwrap();

        assert_eq!(first, Some(None));
        assert_eq!(second, Some(Some("a.png".to_string())));
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn token_upsert_keeps_first_key(pool: PgPool) {
        let store = PgStore::new(pool);
        let owner = user(&store, "a@x.com").await;

        let first = store.get_or_create_token(owner, "aaa").await.unwrap();
        let second = store.get_or_create_token(owner, "bbb").await.unwrap();

        assert_eq!(first.key, "aaa");
        assert_eq!(second.key, "aaa");
        assert!(store.find_token("bbb").await.unwrap().is_none());
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn duplicate_emails_conflict(pool: PgPool) {
        let store = PgStore::new(pool);
        user(&store, "a@x.com").await;

        let err = store
            .create_user(NewUser {
                email: "a@x.com".to_string(),
                name: "Again".to_string(),
                password: "hash".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }
}
