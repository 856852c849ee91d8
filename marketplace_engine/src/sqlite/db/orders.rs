//! Orders, order items and the payment state machine.
//!
//! Transition functions re-read the order inside the caller's transaction, so concurrent webhook
//! deliveries for the same order serialize on the database write lock and the loser observes the
//! new status instead of double-applying a side effect.

use chrono::Duration;
use log::{debug, trace, warn};
use mps_common::Money;
use sqlx::{QueryBuilder, SqliteConnection};

use crate::{
    db_types::{CartItem, Order, OrderItem, OrderStatus},
    helpers::IdGenerator,
    mpe_api::order_objects::OrderQueryFilter,
    traits::{OrderEngineError, TransitionOutcome},
};

fn next_id() -> Result<i64, OrderEngineError> {
    IdGenerator::next_id().map_err(|e| OrderEngineError::DatabaseError(e.to_string()))
}

/// Creates an order from the user's cart in the caller's transaction: snapshots the cart lines
/// into order items at current product prices and inserts the pending order.
pub async fn create_order_from_cart(
    user_id: i64,
    shipping_address_id: i64,
    currency: &str,
    conn: &mut SqliteConnection,
) -> Result<Order, OrderEngineError> {
    let cart: Vec<CartItem> = sqlx::query_as("SELECT * FROM cart_items WHERE user_id = $1 ORDER BY created_at")
        .bind(user_id)
        .fetch_all(&mut *conn)
        .await?;
    if cart.is_empty() {
        return Err(OrderEngineError::EmptyCart);
    }
    // Snapshot fields from the products as they are right now, not as they were when the lines
    // were added to the cart.
    struct Snapshot {
        product_id: i64,
        quantity: i64,
        unit_price: Money,
        name: String,
        thumbnail: Option<String>,
        tax_code: Option<String>,
    }
    let mut snapshots = Vec::with_capacity(cart.len());
    for line in &cart {
        let (price, name, thumbnail, tax_code): (Money, String, Option<String>, Option<String>) =
            sqlx::query_as("SELECT price, name, thumbnail, tax_code FROM products WHERE id = $1 AND deleted = 0")
                .bind(line.product_id)
                .fetch_optional(&mut *conn)
                .await?
                .ok_or_else(|| {
                    OrderEngineError::CartError(crate::traits::CartError::ProductNotFound(line.product_id))
                })?;
        snapshots.push(Snapshot {
            product_id: line.product_id,
            quantity: line.quantity,
            unit_price: price,
            name,
            thumbnail,
            tax_code,
        });
    }
    let amount: Money = snapshots.iter().map(|s| s.unit_price * s.quantity).sum();
    if !amount.is_positive() {
        return Err(OrderEngineError::AmountNotPositive);
    }
    let order_id = next_id()?;
    let order: Order = sqlx::query_as(
        r#"
            INSERT INTO orders (id, user_id, shipping_address_id, currency, amount, total_amount)
            VALUES ($1, $2, $3, $4, $5, $5)
            RETURNING *
        "#,
    )
    .bind(order_id)
    .bind(user_id)
    .bind(shipping_address_id)
    .bind(currency)
    .bind(amount)
    .fetch_one(&mut *conn)
    .await?;
    for s in snapshots {
        sqlx::query(
            r#"
                INSERT INTO order_items (order_id, product_id, quantity, unit_price, product_name, thumbnail, tax_code)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(order_id)
        .bind(s.product_id)
        .bind(s.quantity)
        .bind(s.unit_price)
        .bind(s.name)
        .bind(s.thumbnail)
        .bind(s.tax_code)
        .execute(&mut *conn)
        .await?;
    }
    debug!("🗃️ Order {order_id} inserted for user {user_id}, amount {amount}");
    Ok(order)
}

pub async fn fetch_order(order_id: i64, conn: &mut SqliteConnection) -> Result<Option<Order>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM orders WHERE id = $1").bind(order_id).fetch_optional(conn).await
}

pub async fn fetch_order_items(order_id: i64, conn: &mut SqliteConnection) -> Result<Vec<OrderItem>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM order_items WHERE order_id = $1 ORDER BY product_id")
        .bind(order_id)
        .fetch_all(conn)
        .await
}

pub async fn fetch_orders_for_user(user_id: i64, conn: &mut SqliteConnection) -> Result<Vec<Order>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM orders WHERE user_id = $1 ORDER BY created_at DESC")
        .bind(user_id)
        .fetch_all(conn)
        .await
}

pub async fn fetch_order_by_intent(intent_id: &str, conn: &mut SqliteConnection) -> Result<Option<Order>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM orders WHERE payment_intent_id = $1").bind(intent_id).fetch_optional(conn).await
}

/// Fetches orders according to criteria specified in the `OrderQueryFilter`.
///
/// Resulting orders are ordered by `created_at` in ascending order.
pub async fn search_orders(query: OrderQueryFilter, conn: &mut SqliteConnection) -> Result<Vec<Order>, sqlx::Error> {
    let mut builder = QueryBuilder::new("SELECT * FROM orders ");
    if !query.is_empty() {
        builder.push("WHERE ");
    }
    let mut where_clause = builder.separated(" AND ");
    if let Some(user_id) = query.user_id {
        where_clause.push("user_id = ");
        where_clause.push_bind_unseparated(user_id);
    }
    if let Some(currency) = query.currency {
        where_clause.push("currency = ");
        where_clause.push_bind_unseparated(currency);
    }
    if let Some(intent) = query.payment_intent_id {
        where_clause.push("payment_intent_id = ");
        where_clause.push_bind_unseparated(intent);
    }
    if query.status.as_ref().map(|s| !s.is_empty()).unwrap_or(false) {
        let statuses =
            query.status.as_ref().unwrap().iter().map(|s| format!("'{s}'")).collect::<Vec<_>>().join(",");
        where_clause.push(format!("status IN ({statuses})"));
    }
    if let Some(since) = query.since {
        where_clause.push("unixepoch(created_at) >= ");
        where_clause.push_bind_unseparated(since.timestamp());
    }
    if let Some(until) = query.until {
        where_clause.push("unixepoch(created_at) <= ");
        where_clause.push_bind_unseparated(until.timestamp());
    }
    builder.push(" ORDER BY created_at ASC");
    trace!("🗃️ Executing query: {}", builder.sql());
    let orders = builder.build_query_as::<Order>().fetch_all(conn).await?;
    Ok(orders)
}

/// Writes the tax, total and intent id from a confirmation onto a pending order. The intent id is
/// write-once: re-confirming with the same id is an idempotent no-op, a different id fails.
pub async fn attach_payment_intent(
    order_id: i64,
    tax: Money,
    total: Money,
    intent_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Order, OrderEngineError> {
    let order = fetch_order(order_id, &mut *conn).await?.ok_or(OrderEngineError::OrderNotFound(order_id))?;
    if order.status != OrderStatus::Pending {
        return Err(OrderEngineError::InvalidState(format!("Order {order_id} is {}", order.status)));
    }
    match order.payment_intent_id.as_deref() {
        Some(existing) if existing != intent_id => {
            warn!("🗃️ Order {order_id} already carries intent [{existing}]; refusing to attach [{intent_id}]");
            return Err(OrderEngineError::IntentMismatch);
        },
        Some(_) => trace!("🗃️ Order {order_id} already carries intent [{intent_id}]. Re-attaching is a no-op."),
        None => {},
    }
    let order = sqlx::query_as(
        r#"
            UPDATE orders
            SET tax_amount = $2, total_amount = $3, payment_intent_id = $4, updated_at = CURRENT_TIMESTAMP
            WHERE id = $1
            RETURNING *
        "#,
    )
    .bind(order_id)
    .bind(tax)
    .bind(total)
    .bind(intent_id)
    .fetch_one(conn)
    .await?;
    Ok(order)
}

/// Adds (or, with a negative sign, removes) each order item's quantity to its product's
/// inventory. Decrements clamp at zero; overselling is reconciled by operators, not by the
/// database.
async fn adjust_inventory(order_id: i64, sign: i64, conn: &mut SqliteConnection) -> Result<(), OrderEngineError> {
    sqlx::query(
        r#"
            UPDATE products
            SET inventory = MAX(0, inventory + $2 * (
                    SELECT quantity FROM order_items WHERE order_id = $1 AND product_id = products.id
                )),
                updated_at = CURRENT_TIMESTAMP
            WHERE id IN (SELECT product_id FROM order_items WHERE order_id = $1)
        "#,
    )
    .bind(order_id)
    .bind(sign)
    .execute(conn)
    .await?;
    Ok(())
}

async fn update_order_status(
    order_id: i64,
    status: OrderStatus,
    conn: &mut SqliteConnection,
) -> Result<Order, OrderEngineError> {
    let result: Option<Order> =
        sqlx::query_as("UPDATE orders SET status = $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2 RETURNING *")
            .bind(status.to_string())
            .bind(order_id)
            .fetch_optional(conn)
            .await?;
    result.ok_or(OrderEngineError::OrderNotFound(order_id))
}

/// `Pending -> Paid`, decrementing inventory for every order item. Any other current status is
/// left untouched and reported as unchanged.
pub async fn mark_order_paid(order_id: i64, conn: &mut SqliteConnection) -> Result<TransitionOutcome, OrderEngineError> {
    let order = fetch_order(order_id, &mut *conn).await?.ok_or(OrderEngineError::OrderNotFound(order_id))?;
    if order.status != OrderStatus::Pending {
        return Ok(TransitionOutcome::unchanged(order));
    }
    let order = update_order_status(order_id, OrderStatus::Paid, &mut *conn).await?;
    adjust_inventory(order_id, -1, conn).await?;
    debug!("🗃️ Order {order_id} marked paid; inventory decremented");
    Ok(TransitionOutcome::changed(order))
}

/// Records the failure reason on a pending order without changing its status.
pub async fn record_payment_failure(
    order_id: i64,
    reason: &str,
    conn: &mut SqliteConnection,
) -> Result<TransitionOutcome, OrderEngineError> {
    let order = fetch_order(order_id, &mut *conn).await?.ok_or(OrderEngineError::OrderNotFound(order_id))?;
    if order.status != OrderStatus::Pending {
        return Ok(TransitionOutcome::unchanged(order));
    }
    let order = sqlx::query_as(
        "UPDATE orders SET failure_reason = $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2 RETURNING *",
    )
    .bind(reason)
    .bind(order_id)
    .fetch_one(conn)
    .await?;
    Ok(TransitionOutcome::changed(order))
}

/// `Pending -> Canceled`. Any other current status is left untouched.
pub async fn cancel_order(order_id: i64, conn: &mut SqliteConnection) -> Result<TransitionOutcome, OrderEngineError> {
    let order = fetch_order(order_id, &mut *conn).await?.ok_or(OrderEngineError::OrderNotFound(order_id))?;
    if order.status != OrderStatus::Pending {
        return Ok(TransitionOutcome::unchanged(order));
    }
    let order = update_order_status(order_id, OrderStatus::Canceled, conn).await?;
    Ok(TransitionOutcome::changed(order))
}

/// Applies a refund to a paid order. Cumulative refunds reaching the order total flip it to
/// `Refunded` and restock the inventory; anything less records the partial amount.
pub async fn apply_refund(
    order_id: i64,
    amount: Money,
    conn: &mut SqliteConnection,
) -> Result<TransitionOutcome, OrderEngineError> {
    let order = fetch_order(order_id, &mut *conn).await?.ok_or(OrderEngineError::OrderNotFound(order_id))?;
    if order.status != OrderStatus::Paid {
        return Ok(TransitionOutcome::unchanged(order));
    }
    let refunded = order.refunded_amount + amount;
    if refunded >= order.total_amount {
        let order = sqlx::query_as(
            r#"
                UPDATE orders SET status = 'refunded', refunded_amount = $1, updated_at = CURRENT_TIMESTAMP
                WHERE id = $2
                RETURNING *
            "#,
        )
        .bind(order.total_amount)
        .bind(order_id)
        .fetch_one(&mut *conn)
        .await?;
        adjust_inventory(order_id, 1, conn).await?;
        debug!("🗃️ Order {order_id} fully refunded; inventory restocked");
        Ok(TransitionOutcome::changed(order))
    } else {
        let order: Order = sqlx::query_as(
            "UPDATE orders SET refunded_amount = $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2 RETURNING *",
        )
        .bind(refunded)
        .bind(order_id)
        .fetch_one(conn)
        .await?;
        debug!("🗃️ Order {order_id} partially refunded: {refunded} of {}", order.total_amount);
        Ok(TransitionOutcome::changed(order))
    }
}

/// Cancels every pending order older than `ttl`, returning the canceled rows.
pub async fn cancel_stale_orders(ttl: Duration, conn: &mut SqliteConnection) -> Result<Vec<Order>, OrderEngineError> {
    let rows = sqlx::query_as(
        format!(
            "UPDATE orders SET status = 'canceled', updated_at = CURRENT_TIMESTAMP WHERE status = 'pending' AND \
             (unixepoch(CURRENT_TIMESTAMP) - unixepoch(created_at)) > {} RETURNING *",
            ttl.num_seconds()
        )
        .as_str(),
    )
    .fetch_all(conn)
    .await?;
    Ok(rows)
}
