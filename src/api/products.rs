//! Catalog API: product CRUD and product images.
//!
//! Reads are public. Writes go through the auth middleware.

use axum::{
    Json, Router,
    body::Body,
    extract::{DefaultBodyLimit, Multipart, Path, State, rejection::JsonRejection},
    http::{HeaderValue, StatusCode, header},
    middleware,
    response::IntoResponse,
    routing::{delete, get, post, put},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use super::error::{ApiError, ResultExt, json_body, validate_uuid};
use crate::auth::{Auth, CookiePolicy, require_auth};
use crate::db::{Category, Database, NewProduct, Price, Product, ProductChanges};
use crate::impl_has_auth_backend;
use crate::jwt::JwtConfig;

/// Maximum image size: 10 MiB.
pub const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

const MAX_TITLE_LENGTH: usize = 200;
const MAX_DESCRIPTION_LENGTH: usize = 5000;
const ALLOWED_IMAGE_TYPES: [&str; 2] = ["image/jpeg", "image/png"];

/// State for product endpoints.
#[derive(Clone)]
pub struct ProductsState {
    pub db: Database,
    pub jwt: Arc<JwtConfig>,
    pub cookies: CookiePolicy,
}

impl_has_auth_backend!(ProductsState);

pub fn router(state: ProductsState) -> Router {
    let auth = middleware::from_fn_with_state(state.clone(), require_auth::<ProductsState>);

    Router::new()
        .route("/get", get(list_products))
        .route("/get/{id}", get(get_product))
        .route("/add", post(add_product).route_layer(auth.clone()))
        .route("/update/{id}", put(update_product).route_layer(auth.clone()))
        .route(
            "/delete/{id}",
            delete(delete_product).route_layer(auth.clone()),
        )
        .route(
            "/{id}/images",
            post(upload_image)
                .route_layer(auth.clone())
                // Image limit plus multipart overhead
                .layer(DefaultBodyLimit::max(MAX_IMAGE_BYTES + 1024 * 1024)),
        )
        .route(
            "/{id}/images/{image_id}",
            get(get_image).merge(delete(delete_image).route_layer(auth)),
        )
        .with_state(state)
}

// --- Request/Response types ---

#[derive(Deserialize)]
struct CreateProductRequest {
    title: Option<String>,
    price: Option<Price>,
    description: Option<String>,
    category: Option<Category>,
}

#[derive(Deserialize)]
struct UpdateProductRequest {
    title: Option<String>,
    price: Option<Price>,
    description: Option<String>,
    category: Option<Category>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProductResponse {
    id: String,
    title: String,
    price: Price,
    description: String,
    category: Category,
    images: Vec<String>,
    created_at: String,
    updated_at: String,
}

impl ProductResponse {
    fn new(product: Product, images: Vec<String>) -> Self {
        Self {
            id: product.uuid,
            title: product.title,
            price: product.price,
            description: product.description,
            category: product.category,
            images,
            created_at: product.created_at,
            updated_at: product.updated_at,
        }
    }
}

#[derive(Serialize)]
struct UploadResponse {
    id: String,
}

fn validate_text(field: &'static str, value: &str, max_len: usize) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(ApiError::bad_request(format!("{} cannot be empty", field)));
    }
    if value.chars().count() > max_len {
        return Err(ApiError::bad_request(format!(
            "{} cannot be longer than {} characters",
            field, max_len
        )));
    }
    Ok(())
}

async fn find_product(db: &Database, id: &str) -> Result<Product, ApiError> {
    validate_uuid(id)?;
    db.products()
        .get_by_uuid(id)
        .await
        .db_err("Failed to get product")?
        .ok_or_else(|| ApiError::not_found("Product not found"))
}

// --- Handlers ---

async fn list_products(State(state): State<ProductsState>) -> Result<impl IntoResponse, ApiError> {
    let products = state
        .db
        .products()
        .list()
        .await
        .db_err("Failed to list products")?;

    if products.is_empty() {
        return Err(ApiError::not_found("No products found"));
    }

    let mut images = state
        .db
        .product_images()
        .uuids_by_product()
        .await
        .db_err("Failed to list product images")?;

    let response: Vec<ProductResponse> = products
        .into_iter()
        .map(|product| {
            let product_images = images.remove(&product.id).unwrap_or_default();
            ProductResponse::new(product, product_images)
        })
        .collect();

    Ok(Json(response))
}

async fn get_product(
    State(state): State<ProductsState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let product = find_product(&state.db, &id).await?;
    let images = state
        .db
        .product_images()
        .list_uuids(product.id)
        .await
        .db_err("Failed to list product images")?;

    Ok(Json(ProductResponse::new(product, images)))
}

async fn add_product(
    State(state): State<ProductsState>,
    Auth(user): Auth,
    payload: Result<Json<CreateProductRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let payload = json_body(payload)?;

    let (Some(title), Some(price), Some(description), Some(category)) = (
        payload.title,
        payload.price,
        payload.description,
        payload.category,
    ) else {
        return Err(ApiError::bad_request(
            "title, price, description and category are required",
        ));
    };

    validate_text("title", &title, MAX_TITLE_LENGTH)?;
    validate_text("description", &description, MAX_DESCRIPTION_LENGTH)?;

    let product = state
        .db
        .products()
        .create(&NewProduct {
            title: title.trim(),
            price,
            description: description.trim(),
            category,
        })
        .await
        .db_err("Failed to create product")?;

    info!(product_id = %product.uuid, user_id = %user.user_id, "Product added");

    Ok((
        StatusCode::CREATED,
        Json(ProductResponse::new(product, Vec::new())),
    ))
}

async fn update_product(
    State(state): State<ProductsState>,
    Auth(user): Auth,
    Path(id): Path<String>,
    payload: Result<Json<UpdateProductRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    validate_uuid(&id)?;
    let payload = json_body(payload)?;

    if payload.title.is_none()
        && payload.price.is_none()
        && payload.description.is_none()
        && payload.category.is_none()
    {
        return Err(ApiError::bad_request("No fields to update"));
    }
    if let Some(title) = &payload.title {
        validate_text("title", title, MAX_TITLE_LENGTH)?;
    }
    if let Some(description) = &payload.description {
        validate_text("description", description, MAX_DESCRIPTION_LENGTH)?;
    }

    let changes = ProductChanges {
        title: payload.title.as_deref().map(str::trim),
        price: payload.price,
        description: payload.description.as_deref().map(str::trim),
        category: payload.category,
    };

    let product = state
        .db
        .products()
        .update(&id, &changes)
        .await
        .db_err("Failed to update product")?
        .ok_or_else(|| ApiError::not_found("Product not found"))?;

    let images = state
        .db
        .product_images()
        .list_uuids(product.id)
        .await
        .db_err("Failed to list product images")?;

    info!(product_id = %product.uuid, user_id = %user.user_id, "Product updated");
    Ok(Json(ProductResponse::new(product, images)))
}

async fn delete_product(
    State(state): State<ProductsState>,
    Auth(user): Auth,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let product = find_product(&state.db, &id).await?;
    let images = state
        .db
        .product_images()
        .list_uuids(product.id)
        .await
        .db_err("Failed to list product images")?;

    let deleted = state
        .db
        .products()
        .delete(&product.uuid)
        .await
        .db_err("Failed to delete product")?
        .ok_or_else(|| ApiError::not_found("Product not found"))?;

    info!(product_id = %deleted.uuid, user_id = %user.user_id, "Product deleted");
    Ok(Json(ProductResponse::new(deleted, images)))
}

/// Upload a product image using multipart form data.
///
/// Expected fields:
/// - `image`: JPEG or PNG data, at most 10 MiB
async fn upload_image(
    State(state): State<ProductsState>,
    Auth(user): Auth,
    Path(id): Path<String>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let product = find_product(&state.db, &id).await?;

    let mut image: Option<(String, Option<String>, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| ApiError::bad_request("Invalid multipart data"))?
    {
        if field.name() != Some("image") {
            continue;
        }

        let content_type = field.content_type().unwrap_or("").to_string();
        if !ALLOWED_IMAGE_TYPES.contains(&content_type.as_str()) {
            return Err(ApiError::bad_request("Only JPEG and PNG images are allowed"));
        }
        let file_name = field.file_name().map(str::to_string);

        let data = field
            .bytes()
            .await
            .map_err(|_| ApiError::bad_request("Failed to read image data"))?;
        image = Some((content_type, file_name, data.to_vec()));
    }

    let (content_type, file_name, data) =
        image.ok_or_else(|| ApiError::bad_request("Missing image field"))?;

    if data.is_empty() {
        return Err(ApiError::bad_request("Image is empty"));
    }
    if data.len() > MAX_IMAGE_BYTES {
        return Err(ApiError::bad_request("Image too large (max 10MB)"));
    }

    let uuid = state
        .db
        .product_images()
        .create(product.id, &content_type, file_name.as_deref(), &data)
        .await
        .db_err("Failed to store image")?;

    info!(
        product_id = %product.uuid,
        image_id = %uuid,
        user_id = %user.user_id,
        size = data.len(),
        "Product image uploaded"
    );

    Ok((StatusCode::CREATED, Json(UploadResponse { id: uuid })))
}

async fn get_image(
    State(state): State<ProductsState>,
    Path((id, image_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let product = find_product(&state.db, &id).await?;
    validate_uuid(&image_id)?;

    let image = state
        .db
        .product_images()
        .get(&image_id, product.id)
        .await
        .db_err("Failed to get image")?
        .ok_or_else(|| ApiError::not_found("Image not found"))?;

    let content_type = HeaderValue::from_str(&image.content_type)
        .unwrap_or(HeaderValue::from_static("application/octet-stream"));

    Ok(([(header::CONTENT_TYPE, content_type)], Body::from(image.data)))
}

async fn delete_image(
    State(state): State<ProductsState>,
    Auth(user): Auth,
    Path((id, image_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let product = find_product(&state.db, &id).await?;
    validate_uuid(&image_id)?;

    let deleted = state
        .db
        .product_images()
        .delete(&image_id, product.id)
        .await
        .db_err("Failed to delete image")?;

    if !deleted {
        return Err(ApiError::not_found("Image not found"));
    }

    info!(
        product_id = %product.uuid,
        image_id = %image_id,
        user_id = %user.user_id,
        "Product image deleted"
    );
    Ok(StatusCode::NO_CONTENT)
}
