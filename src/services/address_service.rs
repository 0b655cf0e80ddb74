use uuid::Uuid;

use crate::{
    dto::addresses::{AddressList, CreateAddressRequest},
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::Address,
    response::{ApiResponse, Meta},
    state::AppState,
};

pub async fn list_addresses(
    state: &AppState,
    user: &AuthUser,
) -> AppResult<ApiResponse<AddressList>> {
    let items: Vec<Address> = sqlx::query_as(
        "SELECT * FROM addresses WHERE user_id = $1 ORDER BY is_default DESC, created_at",
    )
    .bind(user.user_id)
    .fetch_all(&state.pool)
    .await?;
    Ok(ApiResponse::success("OK", AddressList { items }, None))
}

pub async fn create_address(
    state: &AppState,
    user: &AuthUser,
    payload: CreateAddressRequest,
) -> AppResult<ApiResponse<Address>> {
    let mut txn = state.pool.begin().await?;

    if payload.is_default {
        sqlx::query("UPDATE addresses SET is_default = FALSE WHERE user_id = $1")
            .bind(user.user_id)
            .execute(&mut *txn)
            .await?;
    }

    let address: Address = sqlx::query_as(
        r#"
        INSERT INTO addresses
            (id, user_id, full_name, phone, address_line, city, state, postal_code, is_default)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user.user_id)
    .bind(payload.full_name)
    .bind(payload.phone)
    .bind(payload.address_line)
    .bind(payload.city)
    .bind(payload.state)
    .bind(payload.postal_code)
    .bind(payload.is_default)
    .fetch_one(&mut *txn)
    .await?;

    txn.commit().await?;

    Ok(ApiResponse::success(
        "Address created",
        address,
        Some(Meta::empty()),
    ))
}

/// Addresses are referenced, not owned, by orders: deleting one that an
/// order still points at is refused, not cascaded.
pub async fn delete_address(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let result = sqlx::query("DELETE FROM addresses WHERE id = $1 AND user_id = $2")
        .bind(id)
        .bind(user.user_id)
        .execute(&state.pool)
        .await;

    match result {
        Ok(done) if done.rows_affected() == 0 => Err(AppError::NotFound),
        Ok(_) => Ok(ApiResponse::success(
            "Address deleted",
            serde_json::json!({}),
            Some(Meta::empty()),
        )),
        Err(err) if is_fk_violation(&err) => Err(AppError::Conflict(
            "address is referenced by existing orders".into(),
        )),
        Err(err) => Err(err.into()),
    }
}

fn is_fk_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .and_then(|db| db.code())
        .is_some_and(|code| code == "23503")
}
