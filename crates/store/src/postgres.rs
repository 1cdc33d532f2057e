//! PostgreSQL storage backends.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{Amount, BookId, BorrowDuration, CartItemId, RecordId, UserId};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use uuid::Uuid;

use crate::error::StoreError;
use crate::model::{
    Affiliate, Book, BookQuery, BorrowRecord, CartItem, CommissionEntry, Coupon, EntitlementClaim,
    Page, PriceTier, RecordQuery, UpsertOutcome,
};
use crate::repository::{AffiliateStore, BookStore, CartStore, CouponStore, RecordStore};

/// Creates a connection pool with bounded acquisition.
pub async fn connect(database_url: &str) -> Result<PgPool, StoreError> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await?;
    Ok(pool)
}

/// Runs pending migrations from the workspace `migrations/` directory.
pub async fn run_migrations(pool: &PgPool) -> Result<(), StoreError> {
    tracing::debug!("running database migrations");
    sqlx::migrate!("../../migrations").run(pool).await?;
    Ok(())
}

fn map_unique(err: sqlx::Error, field: &'static str) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err
        && db_err.is_unique_violation()
    {
        return StoreError::Duplicate { field };
    }
    StoreError::Database(err)
}

const BOOK_COLUMNS: &str = "id, title, slug, author, isbn, genres, summary, cover_image, \
     total_pages, digital_content, published_date, amount_borrowed, access_times, prices, \
     created_at, updated_at";

fn row_to_book(row: &PgRow) -> Result<Book, StoreError> {
    let prices_value: serde_json::Value = row.try_get("prices")?;
    let prices: Vec<PriceTier> = serde_json::from_value(prices_value)?;
    Ok(Book {
        id: BookId::from_uuid(row.try_get("id")?),
        title: row.try_get("title")?,
        slug: row.try_get("slug")?,
        author: row.try_get("author")?,
        isbn: row.try_get("isbn")?,
        genres: row.try_get("genres")?,
        summary: row.try_get("summary")?,
        cover_image: row.try_get("cover_image")?,
        total_pages: row.try_get("total_pages")?,
        digital_content: row.try_get("digital_content")?,
        published_date: row.try_get("published_date")?,
        amount_borrowed: row.try_get("amount_borrowed")?,
        access_times: row.try_get("access_times")?,
        prices,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Catalog store on PostgreSQL.
#[derive(Debug, Clone)]
pub struct PostgresBookStore {
    pool: PgPool,
}

impl PostgresBookStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn push_book_filters(builder: &mut QueryBuilder<'_, Postgres>, query: &BookQuery) {
    if let Some(search) = &query.search {
        let pattern = format!("%{search}%");
        builder
            .push(" AND (title ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR author ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
    if let Some(genre) = &query.genre {
        builder
            .push(" AND ")
            .push_bind(genre.clone())
            .push(" = ANY(genres)");
    }
    if let Some((from, to)) = query.price_between {
        builder
            .push(
                " AND EXISTS (SELECT 1 FROM jsonb_array_elements(prices) AS tier \
                 WHERE tier->>'duration' = '1 month' AND (tier->>'price')::float8 > ",
            )
            .push_bind(from.as_f64())
            .push(" AND (tier->>'price')::float8 < ")
            .push_bind(to.as_f64())
            .push(")");
    }
}

fn book_sort_column(field: &str) -> &'static str {
    match field {
        "title" => "title",
        "author" => "author",
        "amount_borrowed" => "amount_borrowed",
        "access_times" => "access_times",
        "published_date" => "published_date",
        _ => "created_at",
    }
}

#[async_trait]
impl BookStore for PostgresBookStore {
    async fn insert(&self, book: Book) -> Result<Book, StoreError> {
        let prices = serde_json::to_value(&book.prices)?;
        sqlx::query(
            "INSERT INTO books (id, title, slug, author, isbn, genres, summary, cover_image, \
             total_pages, digital_content, published_date, amount_borrowed, access_times, \
             prices, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)",
        )
        .bind(book.id.as_uuid())
        .bind(&book.title)
        .bind(&book.slug)
        .bind(&book.author)
        .bind(&book.isbn)
        .bind(&book.genres)
        .bind(&book.summary)
        .bind(&book.cover_image)
        .bind(book.total_pages)
        .bind(&book.digital_content)
        .bind(book.published_date)
        .bind(book.amount_borrowed)
        .bind(book.access_times)
        .bind(prices)
        .bind(book.created_at)
        .bind(book.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_unique(e, "isbn"))?;
        Ok(book)
    }

    async fn find(&self, id: BookId) -> Result<Option<Book>, StoreError> {
        let sql = format!("SELECT {BOOK_COLUMNS} FROM books WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_book).transpose()
    }

    async fn find_by_isbn(&self, isbn: &str) -> Result<Option<Book>, StoreError> {
        let sql = format!("SELECT {BOOK_COLUMNS} FROM books WHERE isbn = $1");
        let row = sqlx::query(&sql)
            .bind(isbn)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_book).transpose()
    }

    async fn update(&self, book: &Book) -> Result<(), StoreError> {
        let prices = serde_json::to_value(&book.prices)?;
        sqlx::query(
            "UPDATE books SET title = $2, slug = $3, author = $4, isbn = $5, genres = $6, \
             summary = $7, cover_image = $8, total_pages = $9, digital_content = $10, \
             published_date = $11, amount_borrowed = $12, access_times = $13, prices = $14, \
             updated_at = $15 WHERE id = $1",
        )
        .bind(book.id.as_uuid())
        .bind(&book.title)
        .bind(&book.slug)
        .bind(&book.author)
        .bind(&book.isbn)
        .bind(&book.genres)
        .bind(&book.summary)
        .bind(&book.cover_image)
        .bind(book.total_pages)
        .bind(&book.digital_content)
        .bind(book.published_date)
        .bind(book.amount_borrowed)
        .bind(book.access_times)
        .bind(prices)
        .bind(book.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_unique(e, "isbn"))?;
        Ok(())
    }

    async fn delete(&self, id: BookId) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM books WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn query(&self, query: &BookQuery) -> Result<Page<Book>, StoreError> {
        let mut count_builder: QueryBuilder<'_, Postgres> =
            QueryBuilder::new("SELECT COUNT(*) FROM books WHERE 1=1");
        push_book_filters(&mut count_builder, query);
        let total: i64 = count_builder
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await?;

        let mut builder: QueryBuilder<'_, Postgres> =
            QueryBuilder::new(format!("SELECT {BOOK_COLUMNS} FROM books WHERE 1=1"));
        push_book_filters(&mut builder, query);
        match &query.sort {
            Some(sort) => {
                let direction = if sort.descending { "DESC" } else { "ASC" };
                builder.push(format!(
                    " ORDER BY {} {}",
                    book_sort_column(&sort.field),
                    direction
                ));
            }
            None => {
                builder.push(" ORDER BY created_at DESC");
            }
        }
        let page = query.page.max(1);
        let limit = query.limit.max(1);
        builder
            .push(" LIMIT ")
            .push_bind(i64::from(limit))
            .push(" OFFSET ")
            .push_bind(i64::from(page - 1) * i64::from(limit));

        let rows = builder.build().fetch_all(&self.pool).await?;
        let books = rows
            .iter()
            .map(row_to_book)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Page::new(books, page, limit, total as u64))
    }

    async fn by_ids(&self, ids: &[BookId]) -> Result<Vec<Book>, StoreError> {
        let uuids: Vec<Uuid> = ids.iter().map(|id| id.as_uuid()).collect();
        let sql = format!("SELECT {BOOK_COLUMNS} FROM books WHERE id = ANY($1)");
        let rows = sqlx::query(&sql).bind(&uuids).fetch_all(&self.pool).await?;
        let mut books = rows
            .iter()
            .map(row_to_book)
            .collect::<Result<Vec<_>, _>>()?;
        // Preserve the requested order.
        books.sort_by_key(|b| ids.iter().position(|id| *id == b.id));
        Ok(books)
    }

    async fn increment_borrow_count(&self, id: BookId) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE books SET amount_borrowed = amount_borrowed + 1, updated_at = now() \
             WHERE id = $1",
        )
        .bind(id.as_uuid())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn increment_access_count(&self, id: BookId) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE books SET access_times = access_times + 1, updated_at = now() WHERE id = $1",
        )
        .bind(id.as_uuid())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

const RECORD_COLUMNS: &str = "id, book_id, user_id, duration, price, pay_by, borrow_date, \
     due_date, is_bought, created_at, updated_at";

fn row_to_record(row: &PgRow) -> Result<BorrowRecord, StoreError> {
    let token: String = row.try_get("duration")?;
    let duration = token
        .parse::<BorrowDuration>()
        .map_err(|e| StoreError::Corrupt(e.to_string()))?;
    Ok(BorrowRecord {
        id: RecordId::from_uuid(row.try_get("id")?),
        book_id: BookId::from_uuid(row.try_get("book_id")?),
        user_id: UserId::from_uuid(row.try_get("user_id")?),
        duration,
        price: Amount::new(row.try_get("price")?),
        pay_by: row.try_get("pay_by")?,
        borrow_date: row.try_get("borrow_date")?,
        due_date: row.try_get("due_date")?,
        is_bought: row.try_get("is_bought")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Entitlement ledger on PostgreSQL.
#[derive(Debug, Clone)]
pub struct PostgresRecordStore {
    pool: PgPool,
}

impl PostgresRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert_record<'e, E>(executor: E, record: &BorrowRecord) -> Result<(), StoreError>
    where
        E: sqlx::Executor<'e, Database = Postgres>,
    {
        sqlx::query(
            "INSERT INTO borrow_records (id, book_id, user_id, duration, price, pay_by, \
             borrow_date, due_date, is_bought, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(record.id.as_uuid())
        .bind(record.book_id.as_uuid())
        .bind(record.user_id.as_uuid())
        .bind(record.duration.as_str())
        .bind(record.price.as_f64())
        .bind(&record.pay_by)
        .bind(record.borrow_date)
        .bind(record.due_date)
        .bind(record.is_bought)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(executor)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl RecordStore for PostgresRecordStore {
    async fn upsert_active(
        &self,
        claim: &EntitlementClaim,
    ) -> Result<(BorrowRecord, UpsertOutcome), StoreError> {
        let mut tx = self.pool.begin().await?;

        // Per-pair critical section: concurrent upserts for the same
        // pair serialize here until commit.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
            .bind(format!("{}:{}", claim.user_id, claim.book_id))
            .execute(&mut *tx)
            .await?;

        let now = Utc::now();
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM borrow_records \
             WHERE user_id = $1 AND book_id = $2 AND (due_date IS NULL OR due_date > $3) \
             ORDER BY created_at DESC LIMIT 1"
        );
        let existing = sqlx::query(&sql)
            .bind(claim.user_id.as_uuid())
            .bind(claim.book_id.as_uuid())
            .bind(now)
            .fetch_optional(&mut *tx)
            .await?;

        let (record, outcome) = match existing {
            Some(row) => {
                let mut record = row_to_record(&row)?;
                record.duration = claim.duration;
                record.price = claim.price;
                record.pay_by = claim.pay_by.clone();
                record.due_date = claim.due_date(now);
                record.is_bought = claim.duration.is_purchase();
                record.updated_at = now;
                sqlx::query(
                    "UPDATE borrow_records SET duration = $2, price = $3, pay_by = $4, \
                     due_date = $5, is_bought = $6, updated_at = $7 WHERE id = $1",
                )
                .bind(record.id.as_uuid())
                .bind(record.duration.as_str())
                .bind(record.price.as_f64())
                .bind(&record.pay_by)
                .bind(record.due_date)
                .bind(record.is_bought)
                .bind(record.updated_at)
                .execute(&mut *tx)
                .await?;
                (record, UpsertOutcome::Extended)
            }
            None => {
                let record = claim.to_record(now);
                Self::insert_record(&mut *tx, &record).await?;
                (record, UpsertOutcome::Created)
            }
        };

        tx.commit().await?;
        Ok((record, outcome))
    }

    async fn insert(&self, record: BorrowRecord) -> Result<BorrowRecord, StoreError> {
        Self::insert_record(&self.pool, &record).await?;
        Ok(record)
    }

    async fn find(&self, id: RecordId) -> Result<Option<BorrowRecord>, StoreError> {
        let sql = format!("SELECT {RECORD_COLUMNS} FROM borrow_records WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_record).transpose()
    }

    async fn query(&self, query: &RecordQuery) -> Result<Page<BorrowRecord>, StoreError> {
        let push_filters = |builder: &mut QueryBuilder<'_, Postgres>| {
            if let Some(user_id) = query.user_id {
                builder.push(" AND user_id = ").push_bind(user_id.as_uuid());
            }
            if let Some(book_id) = query.book_id {
                builder.push(" AND book_id = ").push_bind(book_id.as_uuid());
            }
        };

        let mut count_builder: QueryBuilder<'_, Postgres> =
            QueryBuilder::new("SELECT COUNT(*) FROM borrow_records WHERE 1=1");
        push_filters(&mut count_builder);
        let total: i64 = count_builder
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await?;

        let mut builder: QueryBuilder<'_, Postgres> = QueryBuilder::new(format!(
            "SELECT {RECORD_COLUMNS} FROM borrow_records WHERE 1=1"
        ));
        push_filters(&mut builder);
        let page = query.page.max(1);
        let limit = query.limit.max(1);
        builder
            .push(" ORDER BY created_at DESC LIMIT ")
            .push_bind(i64::from(limit))
            .push(" OFFSET ")
            .push_bind(i64::from(page - 1) * i64::from(limit));

        let rows = builder.build().fetch_all(&self.pool).await?;
        let records = rows
            .iter()
            .map(row_to_record)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Page::new(records, page, limit, total as u64))
    }

    async fn for_pair(
        &self,
        user_id: UserId,
        book_id: BookId,
    ) -> Result<Vec<BorrowRecord>, StoreError> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM borrow_records \
             WHERE user_id = $1 AND book_id = $2 ORDER BY created_at DESC"
        );
        let rows = sqlx::query(&sql)
            .bind(user_id.as_uuid())
            .bind(book_id.as_uuid())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_record).collect()
    }

    async fn active_for_user(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<Vec<BorrowRecord>, StoreError> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM borrow_records \
             WHERE user_id = $1 AND (due_date IS NULL OR due_date > $2) \
             ORDER BY created_at DESC"
        );
        let rows = sqlx::query(&sql)
            .bind(user_id.as_uuid())
            .bind(now)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_record).collect()
    }
}

fn row_to_cart_item(row: &PgRow) -> Result<CartItem, StoreError> {
    Ok(CartItem {
        id: CartItemId::from_uuid(row.try_get("id")?),
        user_id: UserId::from_uuid(row.try_get("user_id")?),
        book_id: BookId::from_uuid(row.try_get("book_id")?),
        created_at: row.try_get("created_at")?,
    })
}

/// Cart store on PostgreSQL.
#[derive(Debug, Clone)]
pub struct PostgresCartStore {
    pool: PgPool,
}

impl PostgresCartStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CartStore for PostgresCartStore {
    async fn insert(&self, item: CartItem) -> Result<CartItem, StoreError> {
        sqlx::query(
            "INSERT INTO cart_items (id, user_id, book_id, created_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(item.id.as_uuid())
        .bind(item.user_id.as_uuid())
        .bind(item.book_id.as_uuid())
        .bind(item.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_unique(e, "cart item"))?;
        Ok(item)
    }

    async fn find(&self, id: CartItemId) -> Result<Option<CartItem>, StoreError> {
        let row = sqlx::query(
            "SELECT id, user_id, book_id, created_at FROM cart_items WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_cart_item).transpose()
    }

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<CartItem>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, user_id, book_id, created_at FROM cart_items \
             WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_cart_item).collect()
    }

    async fn delete(&self, id: CartItemId) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM cart_items WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_for_pair(
        &self,
        user_id: UserId,
        book_id: BookId,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM cart_items WHERE user_id = $1 AND book_id = $2")
            .bind(user_id.as_uuid())
            .bind(book_id.as_uuid())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

/// Coupon store on PostgreSQL.
#[derive(Debug, Clone)]
pub struct PostgresCouponStore {
    pool: PgPool,
}

impl PostgresCouponStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CouponStore for PostgresCouponStore {
    async fn insert(&self, coupon: Coupon) -> Result<Coupon, StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("INSERT INTO coupons (code, percent) VALUES ($1, $2)")
            .bind(&coupon.code)
            .bind(coupon.percent as i32)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_unique(e, "coupon code"))?;
        for user_id in &coupon.used_by {
            sqlx::query(
                "INSERT INTO coupon_usages (coupon_code, user_id) VALUES ($1, $2) \
                 ON CONFLICT DO NOTHING",
            )
            .bind(&coupon.code)
            .bind(user_id.as_uuid())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(coupon)
    }

    async fn find_by_code(&self, code: &str) -> Result<Option<Coupon>, StoreError> {
        let row = sqlx::query("SELECT code, percent FROM coupons WHERE code = $1")
            .bind(code)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let used_by: Vec<Uuid> =
            sqlx::query_scalar("SELECT user_id FROM coupon_usages WHERE coupon_code = $1")
                .bind(code)
                .fetch_all(&self.pool)
                .await?;
        Ok(Some(Coupon {
            code: row.try_get("code")?,
            percent: row.try_get::<i32, _>("percent")? as u32,
            used_by: used_by.into_iter().map(UserId::from_uuid).collect(),
        }))
    }

    async fn record_usage(&self, code: &str, user_id: UserId) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "INSERT INTO coupon_usages (coupon_code, user_id) \
             SELECT $1, $2 WHERE EXISTS (SELECT 1 FROM coupons WHERE code = $1) \
             ON CONFLICT DO NOTHING",
        )
        .bind(code)
        .bind(user_id.as_uuid())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

fn row_to_affiliate(row: &PgRow) -> Result<Affiliate, StoreError> {
    Ok(Affiliate {
        user_id: UserId::from_uuid(row.try_get("user_id")?),
        refer_code: row.try_get("refer_code")?,
        link_count: row.try_get("link_count")?,
        purchase_count: row.try_get("purchase_count")?,
        commission_amount: Amount::new(row.try_get("commission_amount")?),
        commission_percent: row.try_get::<i32, _>("commission_percent")? as u32,
    })
}

/// Affiliate store on PostgreSQL.
#[derive(Debug, Clone)]
pub struct PostgresAffiliateStore {
    pool: PgPool,
}

impl PostgresAffiliateStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AffiliateStore for PostgresAffiliateStore {
    async fn insert(&self, affiliate: Affiliate) -> Result<Affiliate, StoreError> {
        sqlx::query(
            "INSERT INTO affiliates (refer_code, user_id, link_count, purchase_count, \
             commission_amount, commission_percent) VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(&affiliate.refer_code)
        .bind(affiliate.user_id.as_uuid())
        .bind(affiliate.link_count)
        .bind(affiliate.purchase_count)
        .bind(affiliate.commission_amount.as_f64())
        .bind(affiliate.commission_percent as i32)
        .execute(&self.pool)
        .await
        .map_err(|e| map_unique(e, "refer code"))?;
        Ok(affiliate)
    }

    async fn find_by_refer_code(&self, code: &str) -> Result<Option<Affiliate>, StoreError> {
        let row = sqlx::query(
            "SELECT refer_code, user_id, link_count, purchase_count, commission_amount, \
             commission_percent FROM affiliates WHERE refer_code = $1",
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_affiliate).transpose()
    }

    async fn record_commission(&self, entry: CommissionEntry) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;
        let inserted = sqlx::query(
            "INSERT INTO commissions (refer_code, book_id, payment_id, amount, created_at) \
             SELECT $1, $2, $3, $4, $5 \
             WHERE EXISTS (SELECT 1 FROM affiliates WHERE refer_code = $1) \
             ON CONFLICT DO NOTHING",
        )
        .bind(&entry.refer_code)
        .bind(entry.book_id.as_uuid())
        .bind(&entry.payment_id)
        .bind(entry.amount.as_f64())
        .bind(entry.created_at)
        .execute(&mut *tx)
        .await?
        .rows_affected()
            > 0;
        if inserted {
            sqlx::query(
                "UPDATE affiliates SET purchase_count = purchase_count + 1, \
                 commission_amount = commission_amount + $2 WHERE refer_code = $1",
            )
            .bind(&entry.refer_code)
            .bind(entry.amount.as_f64())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(inserted)
    }
}
