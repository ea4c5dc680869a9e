use axum::{
    Json,
    extract::{Multipart, Path, Query, State},
    response::IntoResponse,
};
use http::StatusCode;

use crate::{
    AppState,
    error::Result,
    models::{
        DeleteResponse, ImagePayload, ImageResponse, NewProduct, ProductQuery, ProductUpdate,
        RevisionResponse, image_key,
    },
};

pub const REVISION_HEADER: &str = "x-catalog-revision";

pub async fn list_products(
    State(state): State<AppState>,
    Query(params): Query<ProductQuery>,
) -> Result<impl IntoResponse> {
    let revision = state.catalog.revision();

    let products = match params.q.as_deref() {
        Some(q) => state.catalog.search_products(q).await?,
        None => state.catalog.list_products().await?,
    };

    Ok(([(REVISION_HEADER, revision.to_string())], Json(products)))
}

pub async fn revision(State(state): State<AppState>) -> Json<RevisionResponse> {
    Json(RevisionResponse {
        revision: state.catalog.revision(),
    })
}

pub async fn create_product(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<impl IntoResponse> {
    let product = read_new_product(multipart).await?;

    let created = state.catalog.create_product(product).await?;

    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn update_product(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<ProductUpdate>,
) -> Result<StatusCode> {
    state.catalog.update_product(&id, payload).await?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn replace_image(
    State(state): State<AppState>,
    Path(id): Path<String>,
    multipart: Multipart,
) -> Result<Json<ImageResponse>> {
    let image = read_new_product(multipart)
        .await?
        .imagen
        .unwrap_or_default();

    let imagen_url = state.catalog.replace_image(&id, image).await?;

    Ok(Json(ImageResponse {
        imagen: image_key(&id),
        id,
        imagen_url,
    }))
}

pub async fn delete_product(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DeleteResponse>> {
    let outcome = state.catalog.delete_product(&id).await?;

    Ok(Json(DeleteResponse {
        id,
        image: outcome.as_str(),
    }))
}

/// Reads the product form. Unknown fields are skipped; absent ones stay empty
/// and are reported by validation.
async fn read_new_product(mut multipart: Multipart) -> Result<NewProduct> {
    let mut product = NewProduct::default();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();

        match name.as_str() {
            "nombre" => product.nombre = field.text().await?,
            "descripcion" => product.descripcion = field.text().await?,
            "precio" => product.precio = field.text().await?,
            "imagen" => {
                let content_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await?;
                product.imagen = Some(ImagePayload::new(bytes, content_type));
            }
            other => {
                tracing::debug!("Ignoring unexpected form field {}", other);
            }
        }
    }

    Ok(product)
}
