use crate::{
    authentication::session::SessionData,
    constants::RECIPE_IMAGE_DIR,
    error::{ApiError, ApiResult, ValidationError},
    media::{extension_for, sniff_image, MediaStorage},
    schema::{Id, PhotoRecord},
    store::RecipeStore,
};

const EMPTY_FILE: &str = "The submitted file is empty.";
const INVALID_IMAGE: &str =
    "Upload a valid image. The file you uploaded was either not an image or a corrupted image.";

/// Picks the file extension, trusting the bytes over the declared content type.
fn image_extension(content_type: Option<&str>, bytes: &[u8]) -> Result<&'static str, ValidationError> {
    if bytes.is_empty() {
        return Err(ValidationError::field("image", EMPTY_FILE));
    }

    let sniffed = sniff_image(bytes).ok_or_else(|| ValidationError::field("image", INVALID_IMAGE))?;
    let declared = content_type
        .map(|c| c.split(';').next().unwrap_or(c).trim().to_ascii_lowercase())
        .filter(|c| c.starts_with("image/"));

    match declared {
        Some(declared) if declared != sniffed && !(declared == "image/jpg" && sniffed == "image/jpeg") => {
            Err(ValidationError::field("image", INVALID_IMAGE))
        }
        _ => extension_for(sniffed).ok_or_else(|| ValidationError::field("image", INVALID_IMAGE)),
    }
}

/// Stores `bytes` as the image of one of the caller's recipes. The file it
/// replaces is deleted once the new path is saved.
pub async fn upload_photo(
    store: &dyn RecipeStore,
    media: &MediaStorage,
    session: &SessionData,
    id: Id,
    content_type: Option<&str>,
    bytes: &[u8],
) -> ApiResult<PhotoRecord> {
    let owner = session.user_id;
    store.get_recipe(owner, id).await?.ok_or(ApiError::NotFound)?;

    let extension = image_extension(content_type, bytes)?;
    let path = media.save(RECIPE_IMAGE_DIR, extension, bytes).await?;

    let previous = match store.replace_recipe_image(owner, id, &path).await {
        Ok(Some(previous)) => previous,
        outcome => {
            discard(media, &path).await;
            return Err(match outcome {
                Err(e) => e.into(),
                _ => ApiError::NotFound,
            });
        }
    };
    if let Some(previous) = previous.filter(|p| *p != path) {
        discard(media, &previous).await;
    }

    log::info!("User {owner} uploaded an image for recipe {id}");
    Ok(PhotoRecord {
        id,
        image: Some(media.url_for(&path)),
    })
}

async fn discard(media: &MediaStorage, path: &str) {
    if let Err(e) = media.remove(path).await {
        log::warn!("Could not remove media file {path}: {e}");
    }
}
