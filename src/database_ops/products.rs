use anyhow::Result;
use sqlx::Row;
use tracing::{debug, instrument};

use crate::database_ops::db::Db;
use crate::mapping::fields::amount_to_minor;
use crate::mapping::CanonicalProduct;
use crate::normalization::barcode::{normalize_barcode, normalize_code, TitleKey};

/// Match an order line to an existing product row. Primary key is the
/// normalized barcode; merchant stock code is the fallback. No match returns
/// `None` and the line keeps a NULL product_id for manual reconciliation —
/// order sync never creates product rows as a side effect.
#[instrument(skip(db))]
pub async fn match_product(
    db: &Db,
    user_id: i64,
    barcode: Option<&str>,
    sku: Option<&str>,
) -> Result<Option<i64>> {
    if let Some(code) = barcode.map(normalize_barcode).filter(|c| !c.is_empty()) {
        if let Some(rec) =
            sqlx::query("SELECT id FROM products WHERE user_id=$1 AND normalized_barcode=$2")
                .persistent(false)
                .bind(user_id)
                .bind(&code)
                .fetch_optional(&db.pool)
                .await?
        {
            return Ok(Some(rec.get("id")));
        }
    }
    if let Some(code) = sku.map(normalize_code).filter(|c| !c.is_empty()) {
        if let Some(rec) = sqlx::query(
            "SELECT id FROM products WHERE user_id=$1 AND upper(stock_code)=$2 LIMIT 1",
        )
        .persistent(false)
        .bind(user_id)
        .bind(&code)
        .fetch_optional(&db.pool)
        .await?
        {
            return Ok(Some(rec.get("id")));
        }
    }
    Ok(None)
}

/// Insert-or-update by `(user_id, normalized_barcode)`; products without a
/// barcode fall back to the stock code identity and otherwise always insert.
/// Returns the product row id.
#[instrument(skip(db, product), fields(external_id = %product.external_product_id))]
pub async fn upsert_product(db: &Db, user_id: i64, product: &CanonicalProduct) -> Result<i64> {
    let normalized = product
        .barcode
        .as_deref()
        .map(normalize_barcode)
        .filter(|c| !c.is_empty());

    if let Some(code) = &normalized {
        if let Some(rec) =
            sqlx::query("SELECT id FROM products WHERE user_id=$1 AND normalized_barcode=$2")
                .persistent(false)
                .bind(user_id)
                .bind(code)
                .fetch_optional(&db.pool)
                .await?
        {
            let id: i64 = rec.get("id");
            sqlx::query(
                "UPDATE products SET title=COALESCE($1, title), stock_code=COALESCE($2, stock_code),
                        price_minor=$3, quantity=$4, updated_at=now()
                 WHERE id=$5",
            )
            .persistent(false)
            .bind(&product.title)
            .bind(&product.stock_code)
            .bind(amount_to_minor(product.price))
            .bind(product.quantity)
            .bind(id)
            .execute(&db.pool)
            .await?;
            return Ok(id);
        }
    }

    if let Some(id) = match_product(db, user_id, None, product.stock_code.as_deref()).await? {
        sqlx::query(
            "UPDATE products SET title=COALESCE($1, title),
                    barcode=COALESCE($2, barcode),
                    normalized_barcode=COALESCE($3, normalized_barcode),
                    price_minor=$4, quantity=$5, updated_at=now()
             WHERE id=$6",
        )
        .persistent(false)
        .bind(&product.title)
        .bind(&product.barcode)
        .bind(&normalized)
        .bind(amount_to_minor(product.price))
        .bind(product.quantity)
        .bind(id)
        .execute(&db.pool)
        .await?;
        return Ok(id);
    }

    let rec = sqlx::query(
        "INSERT INTO products (user_id, title, barcode, normalized_barcode, stock_code, price_minor, quantity)
         VALUES ($1,$2,$3,$4,$5,$6,$7) RETURNING id",
    )
    .persistent(false)
    .bind(user_id)
    .bind(&product.title)
    .bind(&product.barcode)
    .bind(&normalized)
    .bind(&product.stock_code)
    .bind(amount_to_minor(product.price))
    .bind(product.quantity)
    .fetch_one(&db.pool)
    .await?;
    Ok(rec.get("id"))
}

/// Explicit fuzzy-title reconciliation pass: link order lines that have no
/// product yet to catalogue rows whose title matches within the similarity
/// gate. Runs only when invoked by an operator; never during order sync.
#[instrument(skip(db))]
pub async fn reconcile_unmatched_lines(db: &Db, user_id: i64) -> Result<u64> {
    let products = sqlx::query(
        "SELECT id, title FROM products WHERE user_id=$1 AND title IS NOT NULL",
    )
    .persistent(false)
    .bind(user_id)
    .fetch_all(&db.pool)
    .await?;
    let keys: Vec<(i64, TitleKey)> = products
        .iter()
        .map(|r| (r.get::<i64, _>("id"), TitleKey::new(r.get::<String, _>("title").as_str())))
        .collect();

    let lines = sqlx::query(
        "SELECT oi.id, oi.title FROM order_items oi
         JOIN orders o ON o.id = oi.order_id
         WHERE o.user_id=$1 AND oi.product_id IS NULL AND oi.title IS NOT NULL",
    )
    .persistent(false)
    .bind(user_id)
    .fetch_all(&db.pool)
    .await?;

    let mut linked = 0u64;
    for line in &lines {
        let line_id: i64 = line.get("id");
        let title: String = line.get("title");
        let key = TitleKey::new(&title);
        // Require a unique winner; two plausible products means a human decides.
        let mut candidates = keys.iter().filter(|(_, pk)| key.matches(pk));
        if let Some((product_id, _)) = candidates.next() {
            if candidates.next().is_some() {
                continue;
            }
            sqlx::query("UPDATE order_items SET product_id=$1 WHERE id=$2")
                .persistent(false)
                .bind(product_id)
                .bind(line_id)
                .execute(&db.pool)
                .await?;
            linked += 1;
            debug!(line_id, product_id, "linked order line by title similarity");
        }
    }
    Ok(linked)
}
