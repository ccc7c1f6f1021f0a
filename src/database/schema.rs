use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

pub type Id = i32;

#[derive(sqlx::FromRow, Debug, Clone, Serialize, PartialEq)]
pub struct User {
    pub id: Id,
    pub email: String,
    pub name: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub is_active: bool,
    pub is_staff: bool,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub name: String,
    pub password: String,
}

#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub email: Option<String>,
    pub name: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct UserRecord {
    pub email: String,
    pub name: String,
}

impl From<User> for UserRecord {
    fn from(user: User) -> Self {
        Self {
            email: user.email,
            name: user.name,
        }
    }
}

#[derive(sqlx::FromRow, Debug, Clone)]
pub struct AuthToken {
    pub key: String,
    pub user_id: Id,
    pub created: DateTime<Utc>,
}

#[derive(Serialize, Debug, Clone)]
pub struct TokenRecord {
    pub token: String,
}

/// Tags and ingredients share one shape; the kind picks the table they live in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TermKind {
    Tag,
    Ingredient,
}

impl TermKind {
    pub const ALL: [TermKind; 2] = [TermKind::Tag, TermKind::Ingredient];

    pub fn table(self) -> &'static str {
        match self {
            TermKind::Tag => "tags",
            TermKind::Ingredient => "ingredients",
        }
    }

    pub fn link_table(self) -> &'static str {
        match self {
            TermKind::Tag => "recipe_tags",
            TermKind::Ingredient => "recipe_ingredients",
        }
    }

    pub fn link_column(self) -> &'static str {
        match self {
            TermKind::Tag => "tag_id",
            TermKind::Ingredient => "ingredient_id",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TermKind::Tag => "tag",
            TermKind::Ingredient => "ingredient",
        }
    }
}

#[derive(sqlx::FromRow, Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Term {
    pub id: Id,
    pub name: String,
    #[serde(skip_serializing)]
    pub user_id: Id,
}

#[derive(sqlx::FromRow, Debug, Clone, PartialEq)]
pub struct Recipe {
    pub id: Id,
    pub user_id: Id,
    pub title: String,
    pub description: String,
    pub time_minutes: i32,
    pub price: Decimal,
    pub link: String,
    pub image: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewRecipe {
    pub title: String,
    pub description: String,
    pub time_minutes: i32,
    pub price: Decimal,
    pub link: String,
}

/// Scalar recipe columns, each one only written when present.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecipeFields {
    pub title: Option<String>,
    pub description: Option<String>,
    pub time_minutes: Option<i32>,
    pub price: Option<Decimal>,
    pub link: Option<String>,
}

impl RecipeFields {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.time_minutes.is_none()
            && self.price.is_none()
            && self.link.is_none()
    }

    pub fn apply(self, recipe: &mut Recipe) {
        if let Some(title) = self.title {
            recipe.title = title;
        }
        if let Some(description) = self.description {
            recipe.description = description;
        }
        if let Some(time_minutes) = self.time_minutes {
            recipe.time_minutes = time_minutes;
        }
        if let Some(price) = self.price {
            recipe.price = price;
        }
        if let Some(link) = self.link {
            recipe.link = link;
        }
    }
}

#[derive(Debug, Clone)]
pub struct RecipeDraft {
    pub recipe: NewRecipe,
    pub tags: Vec<String>,
    pub ingredients: Vec<String>,
}

impl RecipeDraft {
    pub fn names(&self, kind: TermKind) -> &[String] {
        match kind {
            TermKind::Tag => &self.tags,
            TermKind::Ingredient => &self.ingredients,
        }
    }
}

/// `None` on a relation leaves its links alone, `Some(vec![])` clears them.
#[derive(Debug, Clone, Default)]
pub struct RecipeChanges {
    pub fields: RecipeFields,
    pub tags: Option<Vec<String>>,
    pub ingredients: Option<Vec<String>>,
}

impl RecipeChanges {
    pub fn names(&self, kind: TermKind) -> Option<&[String]> {
        match kind {
            TermKind::Tag => self.tags.as_deref(),
            TermKind::Ingredient => self.ingredients.as_deref(),
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct RecipeSummary {
    pub id: Id,
    pub title: String,
    pub time_minutes: i32,
    pub price: Decimal,
    pub link: String,
    pub tags: Vec<Term>,
    pub ingredients: Vec<Term>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct RecipeDetail {
    pub description: String,
    pub image: Option<String>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct RecipeRecord {
    #[serde(flatten)]
    pub summary: RecipeSummary,
    #[serde(flatten)]
    pub detail: Option<RecipeDetail>,
}

impl RecipeRecord {
    pub fn summary(recipe: Recipe, tags: Vec<Term>, ingredients: Vec<Term>) -> Self {
        Self {
            summary: RecipeSummary {
                id: recipe.id,
                title: recipe.title,
                time_minutes: recipe.time_minutes,
                price: recipe.price,
                link: recipe.link,
                tags,
                ingredients,
            },
            detail: None,
        }
    }

    pub fn detail(recipe: Recipe, tags: Vec<Term>, ingredients: Vec<Term>) -> Self {
        let detail = RecipeDetail {
            description: recipe.description.clone(),
            image: recipe.image.clone(),
        };
        Self {
            detail: Some(detail),
            ..Self::summary(recipe, tags, ingredients)
        }
    }

    /// Rewrites a stored image path into a public URL under `media_url`.
    pub fn with_media_url(mut self, media_url: &str) -> Self {
        if let Some(detail) = self.detail.as_mut() {
            detail.image = detail
                .image
                .take()
                .map(|path| format!("{}{}", media_url, path));
        }
        self
    }
}

#[cfg(test)]
impl RecipeRecord {
    pub fn tag_names(&self) -> Vec<&str> {
        self.summary.tags.iter().map(|t| t.name.as_str()).collect()
    }

    pub fn ingredient_names(&self) -> Vec<&str> {
        self.summary
            .ingredients
            .iter()
            .map(|t| t.name.as_str())
            .collect()
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct PhotoRecord {
    pub id: Id,
    pub image: Option<String>,
}
