use uuid::Uuid;

use crate::{
    audit,
    dto::products::{
        AdjustVariantStockRequest, CreateProductRequest, CreateVariantRequest, ProductList,
        ProductWithVariants, UpdateProductRequest,
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::{Category, Product, ProductVariant},
    response::{ApiResponse, Meta},
    routes::params::{ProductQuery, ProductSortBy, SortOrder},
    state::AppState,
};

pub async fn list_products(
    state: &AppState,
    query: ProductQuery,
) -> AppResult<ApiResponse<ProductList>> {
    let (page, limit, offset) = query.pagination.normalize();
    let q = query.q.unwrap_or_default();
    let min_price = query.min_price.unwrap_or(0);
    let max_price = query.max_price.unwrap_or(i64::MAX);
    let sort_by = query.sort_by.unwrap_or(ProductSortBy::CreatedAt);
    let sort_order = query.sort_order.unwrap_or(SortOrder::Desc);

    let sql = format!(
        r#"
        SELECT * FROM products
        WHERE is_active = TRUE
          AND ($1 = '' OR name ILIKE '%' || $1 || '%')
          AND price BETWEEN $2 AND $3
        ORDER BY {} {}
        LIMIT $4 OFFSET $5
        "#,
        sort_by.as_sql(),
        sort_order.as_sql()
    );
    let items: Vec<Product> = sqlx::query_as(&sql)
        .bind(q.as_str())
        .bind(min_price)
        .bind(max_price)
        .bind(limit)
        .bind(offset)
        .fetch_all(&state.pool)
        .await?;

    let total: (i64,) = sqlx::query_as(
        r#"
        SELECT COUNT(*) FROM products
        WHERE is_active = TRUE
          AND ($1 = '' OR name ILIKE '%' || $1 || '%')
          AND price BETWEEN $2 AND $3
        "#,
    )
    .bind(q.as_str())
    .bind(min_price)
    .bind(max_price)
    .fetch_one(&state.pool)
    .await?;

    let meta = Meta::new(page, limit, total.0);
    Ok(ApiResponse::success(
        "Products",
        ProductList { items },
        Some(meta),
    ))
}

pub async fn get_product(
    state: &AppState,
    id: Uuid,
) -> AppResult<ApiResponse<ProductWithVariants>> {
    let product: Option<Product> = sqlx::query_as("SELECT * FROM products WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.pool)
        .await?;
    let product = match product {
        Some(p) => p,
        None => return Err(AppError::NotFound),
    };

    let variants: Vec<ProductVariant> = sqlx::query_as(
        "SELECT * FROM product_variants WHERE product_id = $1 ORDER BY size, color",
    )
    .bind(id)
    .fetch_all(&state.pool)
    .await?;

    Ok(ApiResponse::success(
        "Product",
        ProductWithVariants { product, variants },
        None,
    ))
}

pub async fn create_product(
    state: &AppState,
    user: &AuthUser,
    payload: CreateProductRequest,
) -> AppResult<ApiResponse<ProductWithVariants>> {
    ensure_admin(user)?;
    if payload.price < 0 {
        return Err(AppError::BadRequest("price must not be negative".into()));
    }

    let mut txn = state.pool.begin().await?;

    let product: Product = sqlx::query_as(
        r#"
        INSERT INTO products (id, category_id, name, description, price, color)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(payload.category_id)
    .bind(payload.name.as_str())
    .bind(payload.description.as_deref())
    .bind(payload.price)
    .bind(payload.color.as_deref())
    .fetch_one(&mut *txn)
    .await?;

    let mut variants = Vec::new();
    for variant in payload.variants.unwrap_or_default() {
        let inserted = insert_variant(&mut txn, product.id, &variant).await?;
        variants.push(inserted);
    }

    // re-read: the stock trigger has summed the variants by now
    let product: Product = sqlx::query_as("SELECT * FROM products WHERE id = $1")
        .bind(product.id)
        .fetch_one(&mut *txn)
        .await?;

    txn.commit().await?;

    if let Err(err) = audit::record(
        &state.pool,
        Some(user.user_id),
        "product_create",
        Some("products"),
        Some(product.id),
        None,
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Product created",
        ProductWithVariants { product, variants },
        Some(Meta::empty()),
    ))
}

pub async fn update_product(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateProductRequest,
) -> AppResult<ApiResponse<Product>> {
    ensure_admin(user)?;

    let existing: Option<Product> = sqlx::query_as("SELECT * FROM products WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.pool)
        .await?;
    let existing = match existing {
        Some(p) => p,
        None => return Err(AppError::NotFound),
    };

    let name = payload.name.unwrap_or(existing.name);
    let description = payload.description.or(existing.description);
    let price = payload.price.unwrap_or(existing.price);
    let category_id = payload.category_id.or(existing.category_id);
    let color = payload.color.or(existing.color);
    let is_active = payload.is_active.unwrap_or(existing.is_active);

    let product: Product = sqlx::query_as(
        r#"
        UPDATE products
        SET name = $2, description = $3, price = $4, category_id = $5,
            color = $6, is_active = $7
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(name)
    .bind(description)
    .bind(price)
    .bind(category_id)
    .bind(color)
    .bind(is_active)
    .fetch_one(&state.pool)
    .await?;

    Ok(ApiResponse::success(
        "Updated",
        product,
        Some(Meta::empty()),
    ))
}

pub async fn delete_product(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    ensure_admin(user)?;

    let result = sqlx::query("DELETE FROM products WHERE id = $1")
        .bind(id)
        .execute(&state.pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound);
    }

    Ok(ApiResponse::success(
        "Deleted",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

pub async fn add_variant(
    state: &AppState,
    user: &AuthUser,
    product_id: Uuid,
    payload: CreateVariantRequest,
) -> AppResult<ApiResponse<ProductVariant>> {
    ensure_admin(user)?;

    let product: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM products WHERE id = $1")
        .bind(product_id)
        .fetch_optional(&state.pool)
        .await?;
    if product.is_none() {
        return Err(AppError::NotFound);
    }

    let mut txn = state.pool.begin().await?;
    let variant = insert_variant(&mut txn, product_id, &payload).await?;
    txn.commit().await?;

    Ok(ApiResponse::success(
        "Variant created",
        variant,
        Some(Meta::empty()),
    ))
}

pub async fn adjust_variant_stock(
    state: &AppState,
    user: &AuthUser,
    variant_id: Uuid,
    payload: AdjustVariantStockRequest,
) -> AppResult<ApiResponse<ProductVariant>> {
    ensure_admin(user)?;
    if payload.delta == 0 {
        return Err(AppError::BadRequest("delta must not be 0".into()));
    }

    let mut txn = state.pool.begin().await?;
    let variant: Option<ProductVariant> =
        sqlx::query_as("SELECT * FROM product_variants WHERE id = $1 FOR UPDATE")
            .bind(variant_id)
            .fetch_optional(&mut *txn)
            .await?;
    let variant = match variant {
        Some(v) => v,
        None => return Err(AppError::NotFound),
    };

    let new_stock = variant.stock + payload.delta;
    if new_stock < 0 {
        return Err(AppError::BadRequest("stock cannot be negative".into()));
    }

    let variant: ProductVariant = sqlx::query_as(
        "UPDATE product_variants SET stock = $2 WHERE id = $1 RETURNING *",
    )
    .bind(variant_id)
    .bind(new_stock)
    .fetch_one(&mut *txn)
    .await?;

    txn.commit().await?;

    if let Err(err) = audit::record(
        &state.pool,
        Some(user.user_id),
        "inventory_adjust",
        Some("product_variants"),
        Some(variant.id),
        Some(serde_json::json!({ "delta": payload.delta, "stock": variant.stock })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Stock adjusted",
        variant,
        Some(Meta::empty()),
    ))
}

pub async fn delete_variant(
    state: &AppState,
    user: &AuthUser,
    variant_id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    ensure_admin(user)?;

    let result = sqlx::query("DELETE FROM product_variants WHERE id = $1")
        .bind(variant_id)
        .execute(&state.pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound);
    }

    Ok(ApiResponse::success(
        "Deleted",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

pub async fn list_categories(state: &AppState) -> AppResult<ApiResponse<Vec<Category>>> {
    let items: Vec<Category> =
        sqlx::query_as("SELECT * FROM categories WHERE is_active = TRUE ORDER BY name")
            .fetch_all(&state.pool)
            .await?;
    Ok(ApiResponse::success("Categories", items, None))
}

async fn insert_variant(
    txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    product_id: Uuid,
    payload: &CreateVariantRequest,
) -> AppResult<ProductVariant> {
    if payload.stock < 0 {
        return Err(AppError::BadRequest("stock must not be negative".into()));
    }
    if payload.size.trim().is_empty() {
        return Err(AppError::BadRequest("size must not be empty".into()));
    }
    // '-' is reserved as the cart key separator
    if payload.size.contains('-') {
        return Err(AppError::BadRequest("size must not contain '-'".into()));
    }

    let result: Result<ProductVariant, sqlx::Error> = sqlx::query_as(
        r#"
        INSERT INTO product_variants (id, product_id, size, color, stock)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(product_id)
    .bind(payload.size.trim())
    .bind(payload.color.as_deref())
    .bind(payload.stock)
    .fetch_one(&mut **txn)
    .await;

    match result {
        Ok(variant) => Ok(variant),
        Err(err) if is_unique_violation(&err) => Err(AppError::Conflict(
            "variant already exists for this size and color".into(),
        )),
        Err(err) => Err(err.into()),
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .and_then(|db| db.code())
        .is_some_and(|code| code == "23505")
}
