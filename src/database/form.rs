use std::{collections::BTreeSet, str::FromStr};

use rust_decimal::Decimal;
use serde_json::{Map, Value};

use super::{
    error::ValidationError,
    schema::{Credentials, NewRecipe, NewUser, RecipeChanges, RecipeDraft, RecipeFields, UserChanges},
};
use crate::constants::{
    MAX_NAME_LENGTH, MIN_PASSWORD_LENGTH, PRICE_DECIMAL_PLACES, PRICE_MAX_DIGITS,
};

const REQUIRED: &str = "This field is required.";
const NOT_NULL: &str = "This field may not be null.";
const NOT_BLANK: &str = "This field may not be blank.";

/// Reads typed, optional fields out of a JSON object, collecting every
/// problem instead of stopping at the first.
pub struct Form {
    inner: Map<String, Value>,
    errors: ValidationError,
}

impl Form {
    pub fn from_value(value: Value) -> Result<Self, ValidationError> {
        match value {
            Value::Object(inner) => Ok(Self {
                inner,
                errors: ValidationError::new(),
            }),
            _ => Err(ValidationError::non_field(
                "Invalid data. Expected a dictionary.",
            )),
        }
    }

    fn present(&mut self, key: &str, required: bool) -> Option<Value> {
        match self.inner.get(key) {
            None => {
                if required {
                    self.errors.add(key, REQUIRED);
                }
                None
            }
            Some(Value::Null) => {
                self.errors.add(key, NOT_NULL);
                None
            }
            Some(value) => Some(value.to_owned()),
        }
    }

    pub fn get_str(
        &mut self,
        key: &str,
        required: bool,
        allow_blank: bool,
        max_length: Option<usize>,
    ) -> Option<String> {
        let value = match self.present(key, required)? {
            Value::String(s) => s,
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            _ => {
                self.errors.add(key, "Not a valid string.");
                return None;
            }
        };

        if !allow_blank && value.trim().is_empty() {
            self.errors.add(key, NOT_BLANK);
            return None;
        }
        if let Some(max) = max_length {
            if value.chars().count() > max {
                self.errors.add(
                    key,
                    &format!("Ensure this field has no more than {max} characters."),
                );
                return None;
            }
        }

        Some(value)
    }

    pub fn get_number<T>(&mut self, key: &str, required: bool) -> Option<T>
    where
        T: FromStr,
    {
        let raw = match self.present(key, required)? {
            Value::Number(n) => n.to_string(),
            Value::String(s) => s.trim().to_string(),
            _ => String::new(),
        };

        match raw.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                self.errors.add(key, "A valid integer is required.");
                None
            }
        }
    }

    pub fn get_decimal(
        &mut self,
        key: &str,
        required: bool,
        max_digits: u32,
        decimal_places: u32,
    ) -> Option<Decimal> {
        let raw = match self.present(key, required)? {
            Value::Number(n) => n.to_string(),
            Value::String(s) => s.trim().to_string(),
            _ => String::new(),
        };

        let Ok(value) = Decimal::from_str(&raw) else {
            self.errors.add(key, "A valid number is required.");
            return None;
        };

        let normalized = value.normalize();
        if normalized.scale() > decimal_places {
            self.errors.add(
                key,
                &format!("Ensure that there are no more than {decimal_places} decimal places."),
            );
            return None;
        }

        let whole_digits = max_digits - decimal_places;
        let limit = Decimal::from(10_i64.pow(whole_digits));
        if normalized.trunc().abs() >= limit {
            self.errors.add(
                key,
                &format!(
                    "Ensure that there are no more than {whole_digits} digits before the decimal point."
                ),
            );
            return None;
        }

        let mut value = normalized;
        value.rescale(decimal_places);
        Some(value)
    }

    /// A list of `{"name": ...}` records, names trimmed. Repeated names collapse,
    /// first one wins.
    pub fn get_names(&mut self, key: &str) -> Option<Vec<String>> {
        let items = match self.present(key, false)? {
            Value::Array(items) => items,
            _ => {
                self.errors.add(key, "Expected a list of items.");
                return None;
            }
        };

        let mut seen = BTreeSet::new();
        let mut names = vec![];
        for item in items {
            let name = match item {
                Value::Object(mut record) => record.remove("name"),
                _ => None,
            };
            let name = match name {
                Some(Value::String(name)) if !name.trim().is_empty() => name.trim().to_string(),
                Some(Value::String(_)) => {
                    self.errors.add(key, "Item name may not be blank.");
                    continue;
                }
                _ => {
                    self.errors.add(key, "Each item requires a \"name\" string.");
                    continue;
                }
            };
            if name.chars().count() > MAX_NAME_LENGTH {
                self.errors.add(
                    key,
                    &format!("Ensure item names have no more than {MAX_NAME_LENGTH} characters."),
                );
                continue;
            }
            if seen.insert(name.clone()) {
                names.push(name);
            }
        }

        Some(names)
    }

    pub fn add_error(&mut self, key: &str, message: &str) {
        self.errors.add(key, message);
    }

    pub fn finish(self) -> Result<(), ValidationError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self.errors)
        }
    }
}

fn recipe_fields(form: &mut Form, require_all: bool) -> RecipeFields {
    RecipeFields {
        title: form.get_str("title", require_all, false, Some(MAX_NAME_LENGTH)),
        description: form.get_str("description", false, true, None),
        time_minutes: form.get_number("time_minutes", require_all),
        price: form.get_decimal("price", require_all, PRICE_MAX_DIGITS, PRICE_DECIMAL_PLACES),
        link: form.get_str("link", false, true, Some(MAX_NAME_LENGTH)),
    }
}

pub fn parse_recipe_draft(value: Value) -> Result<RecipeDraft, ValidationError> {
    let mut form = Form::from_value(value)?;
    let fields = recipe_fields(&mut form, true);
    let tags = form.get_names("tags");
    let ingredients = form.get_names("ingredients");
    form.finish()?;

    match (fields.title, fields.time_minutes, fields.price) {
        (Some(title), Some(time_minutes), Some(price)) => Ok(RecipeDraft {
            recipe: NewRecipe {
                title,
                description: fields.description.unwrap_or_default(),
                time_minutes,
                price,
                link: fields.link.unwrap_or_default(),
            },
            tags: tags.unwrap_or_default(),
            ingredients: ingredients.unwrap_or_default(),
        }),
        _ => Err(ValidationError::non_field("Missing required fields.")),
    }
}

/// `require_all` is the full replace (PUT) flavour, otherwise a partial update.
pub fn parse_recipe_changes(
    value: Value,
    require_all: bool,
) -> Result<RecipeChanges, ValidationError> {
    let mut form = Form::from_value(value)?;
    let fields = recipe_fields(&mut form, require_all);
    let tags = form.get_names("tags");
    let ingredients = form.get_names("ingredients");
    form.finish()?;

    Ok(RecipeChanges {
        fields,
        tags,
        ingredients,
    })
}

pub fn parse_term_name(value: Value, required: bool) -> Result<Option<String>, ValidationError> {
    let mut form = Form::from_value(value)?;
    let name = form.get_str("name", required, false, Some(MAX_NAME_LENGTH));
    form.finish()?;
    Ok(name.map(|name| name.trim().to_string()))
}

fn get_email(form: &mut Form, required: bool) -> Option<String> {
    let email = form.get_str("email", required, false, Some(MAX_NAME_LENGTH))?;
    let email = email.trim().to_string();
    if !is_valid_email(&email) {
        form.add_error("email", "Enter a valid email address.");
        return None;
    }
    Some(normalize_email(&email))
}

fn get_password(form: &mut Form, required: bool) -> Option<String> {
    let password = form.get_str("password", required, false, None)?;
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        form.add_error(
            "password",
            &format!("Ensure this field has at least {MIN_PASSWORD_LENGTH} characters."),
        );
        return None;
    }
    Some(password)
}

pub fn parse_new_user(value: Value) -> Result<NewUser, ValidationError> {
    let mut form = Form::from_value(value)?;
    let email = get_email(&mut form, true);
    let password = get_password(&mut form, true);
    let name = form.get_str("name", true, false, Some(MAX_NAME_LENGTH));
    form.finish()?;

    match (email, password, name) {
        (Some(email), Some(password), Some(name)) => Ok(NewUser {
            email,
            name,
            password,
        }),
        _ => Err(ValidationError::non_field("Missing required fields.")),
    }
}

pub fn parse_user_changes(value: Value) -> Result<UserChanges, ValidationError> {
    let mut form = Form::from_value(value)?;
    let changes = UserChanges {
        email: get_email(&mut form, false),
        name: form.get_str("name", false, false, Some(MAX_NAME_LENGTH)),
        password: get_password(&mut form, false),
    };
    form.finish()?;
    Ok(changes)
}

pub fn parse_credentials(value: Value) -> Result<Credentials, ValidationError> {
    let mut form = Form::from_value(value)?;
    let email = get_email(&mut form, true);
    // Whitespace in passwords is significant, so no trimming here.
    let password = form.get_str("password", true, false, None);
    form.finish()?;

    match (email, password) {
        (Some(email), Some(password)) => Ok(Credentials { email, password }),
        _ => Err(ValidationError::non_field("Missing required fields.")),
    }
}

fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.rsplit_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.is_empty()
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !email.chars().any(char::is_whitespace)
}

/// Lower-cases the domain part only, the local part is case sensitive.
pub fn normalize_email(email: &str) -> String {
    match email.rsplit_once('@') {
        Some((local, domain)) => format!("{local}@{}", domain.to_lowercase()),
        None => email.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;
    use serde_json::json;

    use super::*;

    #[test]
    fn draft_requires_title_time_and_price() {
        let err = parse_recipe_draft(json!({ "description": "no title" })).unwrap_err();

        assert_eq!(err.messages("title"), ["This field is required."]);
        assert_eq!(err.messages("time_minutes"), ["This field is required."]);
        assert_eq!(err.messages("price"), ["This field is required."]);
    }

    #[test]
    fn draft_defaults_optional_fields_and_collapses_names() {
        let draft = parse_recipe_draft(json!({
            "title": "Soup",
            "time_minutes": 10,
            "price": "3.5",
            "tags": [{ "name": "vegan" }, { "name": "vegan" }, { "name": "quick" }]
        }))
        .unwrap();

        assert_eq!(draft.recipe.price, dec!(3.50));
        assert_eq!(draft.recipe.price.to_string(), "3.50");
        assert_eq!(draft.recipe.description, "");
        assert_eq!(draft.recipe.link, "");
        assert_eq!(draft.tags, vec!["vegan", "quick"]);
        assert!(draft.ingredients.is_empty());
    }

    #[test]
    fn names_are_trimmed_before_collapsing() {
        let changes = parse_recipe_changes(
            json!({ "tags": [{ "name": " vegan" }, { "name": "vegan " }, { "name": "quick" }] }),
            false,
        )
        .unwrap();
        assert_eq!(changes.tags, Some(vec!["vegan".to_string(), "quick".to_string()]));

        let name = parse_term_name(json!({ "name": "  salt " }), true).unwrap();
        assert_eq!(name.as_deref(), Some("salt"));
    }

    #[test]
    fn price_precision_is_checked() {
        let err = parse_recipe_changes(json!({ "price": 1.234 }), false).unwrap_err();
        assert_eq!(
            err.messages("price"),
            ["Ensure that there are no more than 2 decimal places."]
        );

        let err = parse_recipe_changes(json!({ "price": "1000" }), false).unwrap_err();
        assert_eq!(
            err.messages("price"),
            ["Ensure that there are no more than 3 digits before the decimal point."]
        );
    }

    #[test]
    fn partial_changes_keep_absent_fields_as_none() {
        let changes = parse_recipe_changes(json!({ "title": "New", "tags": [] }), false).unwrap();

        assert_eq!(changes.fields.title.as_deref(), Some("New"));
        assert_eq!(changes.fields.price, None);
        assert_eq!(changes.fields.time_minutes, None);
        assert_eq!(changes.tags, Some(vec![]));
        assert_eq!(changes.ingredients, None);
    }

    #[test]
    fn full_changes_require_scalar_fields() {
        let err = parse_recipe_changes(json!({ "title": "New" }), true).unwrap_err();
        assert!(err.messages("title").is_empty());
        assert_eq!(err.messages("price"), ["This field is required."]);
    }

    #[test]
    fn null_and_malformed_values_are_rejected() {
        let err = parse_recipe_changes(
            json!({ "link": null, "time_minutes": "ten", "tags": [{ "label": "x" }] }),
            false,
        )
        .unwrap_err();

        assert_eq!(err.messages("link"), ["This field may not be null."]);
        assert_eq!(err.messages("time_minutes"), ["A valid integer is required."]);
        assert_eq!(err.messages("tags"), ["Each item requires a \"name\" string."]);
    }

    #[test]
    fn non_object_payloads_are_rejected() {
        let err = parse_recipe_draft(json!([1, 2])).unwrap_err();
        assert_eq!(
            err.messages("non_field_errors"),
            ["Invalid data. Expected a dictionary."]
        );
    }

    #[test]
    fn new_user_checks_email_and_password_length() {
        let err = parse_new_user(json!({ "email": "bad", "password": "pw", "name": "A" }))
            .unwrap_err();
        assert_eq!(err.messages("email"), ["Enter a valid email address."]);
        assert_eq!(
            err.messages("password"),
            ["Ensure this field has at least 5 characters."]
        );

        let user =
            parse_new_user(json!({ "email": "Ann@EXAMPLE.com", "password": "secret", "name": "Ann" }))
                .unwrap();
        assert_eq!(user.email, "Ann@example.com");
    }
}
