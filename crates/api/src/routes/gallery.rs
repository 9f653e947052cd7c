//! Route definitions for the `/gallery` resource.

use axum::routing::get;
use axum::Router;

use crate::handlers::gallery;
use crate::state::AppState;

/// Routes mounted at `/gallery`.
///
/// ```text
/// GET    /                -> list_gallery
/// POST   /                -> add_gallery_item
/// GET    /{id}            -> get_gallery_item
/// DELETE /{id}            -> delete_gallery_item
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(gallery::list_gallery).post(gallery::add_gallery_item))
        .route(
            "/{id}",
            get(gallery::get_gallery_item).delete(gallery::delete_gallery_item),
        )
}
