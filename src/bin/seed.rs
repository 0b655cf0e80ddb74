use argon2::{
    Argon2, PasswordHasher,
    password_hash::{SaltString, rand_core::OsRng},
};
use chrono::{Duration, Utc};
use storefront_api::{config::AppConfig, db::create_pool};
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;

    let pool = create_pool(&config.database_url).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    let admin_id = ensure_user_with_role(&pool, "admin@example.com", "admin123", "admin").await?;
    let user_id = ensure_user_with_role(&pool, "user@example.com", "user123", "user").await?;
    seed_catalog(&pool).await?;
    seed_coupons(&pool).await?;

    println!("Seed completed. Admin ID: {admin_id}, User ID: {user_id}");
    Ok(())
}

async fn ensure_user_with_role(
    pool: &sqlx::PgPool,
    email: &str,
    password: &str,
    role: &str,
) -> anyhow::Result<Uuid> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let password_hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!(e.to_string()))?
        .to_string();

    let (user_id,): (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO users (id, email, password_hash, role)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (email) DO UPDATE SET role = EXCLUDED.role
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(email)
    .bind(password_hash)
    .bind(role)
    .fetch_one(pool)
    .await?;

    println!("Ensured user {email} (role={role})");
    Ok(user_id)
}

async fn seed_catalog(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    let (category_id,): (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO categories (id, name)
        VALUES ($1, 'Apparel')
        ON CONFLICT DO NOTHING
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .fetch_optional(pool)
    .await?
    .unwrap_or(
        sqlx::query_as("SELECT id FROM categories WHERE name = 'Apparel'")
            .fetch_one(pool)
            .await?,
    );

    let products = vec![
        ("Rustacean Hoodie", "Warm fleece hoodie", 550_00i64, "graphite"),
        ("Ferris Tee", "Soft cotton tee", 120_00, "orange"),
        ("Trail Joggers", "Lightweight joggers", 340_00, "navy-blue"),
    ];

    for (name, desc, price, color) in products {
        let existing: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM products WHERE name = $1")
            .bind(name)
            .fetch_optional(pool)
            .await?;
        if existing.is_some() {
            continue;
        }

        let product_id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO products (id, category_id, name, description, price, color)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(product_id)
        .bind(category_id)
        .bind(name)
        .bind(desc)
        .bind(price)
        .bind(color)
        .execute(pool)
        .await?;

        for size in ["S", "M", "L", "XL"] {
            sqlx::query(
                r#"
                INSERT INTO product_variants (id, product_id, size, color, stock)
                VALUES ($1, $2, $3, $4, 25)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(product_id)
            .bind(size)
            .bind(color)
            .execute(pool)
            .await?;
        }
    }

    println!("Seeded catalog");
    Ok(())
}

async fn seed_coupons(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    let expires_on = (Utc::now() + Duration::days(30)).date_naive();
    sqlx::query(
        r#"
        INSERT INTO coupons (id, code, discount_type, value, min_order_amount, expires_on)
        VALUES ($1, 'WELCOME10', 'percent', 10, 0, $2)
        ON CONFLICT (code) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(expires_on)
    .execute(pool)
    .await?;

    println!("Seeded coupons");
    Ok(())
}
