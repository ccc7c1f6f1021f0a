pub const MAX_NAME_LENGTH: usize = 255;
pub const MIN_PASSWORD_LENGTH: usize = 5;

pub const PRICE_MAX_DIGITS: u32 = 5;
pub const PRICE_DECIMAL_PLACES: u32 = 2;

/// Length in bytes of a freshly generated auth token, before hex encoding.
pub const TOKEN_BYTES: usize = 20;

pub const RECIPE_IMAGE_DIR: &str = "uploads/recipe";

pub const IMAGE_TYPES: &[(&str, &str)] = &[
    ("image/jpeg", "jpg"),
    ("image/png", "png"),
    ("image/gif", "gif"),
    ("image/webp", "webp"),
];
