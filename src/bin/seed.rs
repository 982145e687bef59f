use checkout_api::{
    config::AppConfig,
    db::{DbPool, create_pool, run_migrations},
    middleware::auth::{ROLE_ADMIN, ROLE_USER},
    services::auth_service::hash_password,
};
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;

    let pool = create_pool(&config.database_url, config.db_max_connections).await?;
    run_migrations(&pool).await?;

    let admin_id = ensure_user(&pool, "Admin", "admin@example.com", "admin123", ROLE_ADMIN).await?;
    let user_id = ensure_user(&pool, "Demo User", "user@example.com", "user123", ROLE_USER).await?;
    seed_catalog(&pool).await?;

    println!("Seed completed. Admin ID: {admin_id}, User ID: {user_id}");
    Ok(())
}

async fn ensure_user(
    pool: &DbPool,
    name: &str,
    email: &str,
    password: &str,
    role: &str,
) -> anyhow::Result<Uuid> {
    let password_hash = hash_password(password).map_err(|e| anyhow::anyhow!(e.to_string()))?;

    let (user_id,): (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO users (id, name, email, password_hash, role)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (email) DO UPDATE SET role = EXCLUDED.role
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(name)
    .bind(email)
    .bind(password_hash)
    .bind(role)
    .fetch_one(pool)
    .await?;

    println!("Ensured user {email} (role={role})");
    Ok(user_id)
}

async fn ensure_category(pool: &DbPool, name: &str, description: &str) -> anyhow::Result<Uuid> {
    let (id,): (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO categories (id, name, description)
        VALUES ($1, $2, $3)
        ON CONFLICT (name) DO UPDATE SET description = EXCLUDED.description
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(name)
    .bind(description)
    .fetch_one(pool)
    .await?;
    Ok(id)
}

async fn seed_catalog(pool: &DbPool) -> anyhow::Result<()> {
    let apparel = ensure_category(pool, "Apparel", "Clothing and accessories").await?;
    let kitchen = ensure_category(pool, "Kitchen", "Mugs, bottles and more").await?;
    let books = ensure_category(pool, "Books", "Printed and digital books").await?;

    let products = [
        ("Axum Hoodie", "Warm hoodie for Rustaceans", 550000_i64, 50_i32, apparel),
        ("Ferris Mug", "Coffee tastes better with Ferris", 120000, 100, kitchen),
        ("Rust Sticker Pack", "Decorate your laptop", 50000, 200, apparel),
        ("E-book: Async Rust", "Learn async Rust patterns", 250000, 75, books),
    ];

    for (name, desc, price, stock, category_id) in products {
        sqlx::query(
            r#"
            INSERT INTO products (id, name, description, price, stock, category_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (name) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(desc)
        .bind(price)
        .bind(stock)
        .bind(category_id)
        .execute(pool)
        .await?;
    }

    println!("Seeded categories and products");
    Ok(())
}
