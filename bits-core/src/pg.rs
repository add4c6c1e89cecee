//! Direct Postgres store.
//!
//! Stands in for the hosted backend when a database is configured. Every
//! query is scoped to a single owner, taking the place of row-level policies.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::error::BitsError;
use crate::filter::{end_of_day, escape_like, start_of_day, BitFilter, Clause};
use crate::models::{
    Bit, BitChanges, BitInsert, Child, ChildChanges, ChildInsert, ChildSummary, Milestone,
};
use crate::store::{BitStore, ChildStore, Identity, MilestoneStore, Page};

const BIT_COLUMNS: &str = "b.id, b.user_id, b.child_id, b.text, b.context, b.photo_url, \
     b.bit_date, b.created_at, b.updated_at, \
     c.name AS child_name, c.color AS child_color, c.photo_url AS child_photo_url";

const BIT_ORDER: &str = " ORDER BY COALESCE(b.bit_date, (b.created_at AT TIME ZONE 'UTC')::date) DESC, \
     b.created_at DESC, b.id DESC";

#[derive(sqlx::FromRow)]
struct BitRow {
    id: Uuid,
    user_id: Uuid,
    child_id: Option<Uuid>,
    text: String,
    context: Option<String>,
    photo_url: Option<String>,
    bit_date: Option<NaiveDate>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    child_name: Option<String>,
    child_color: Option<String>,
    child_photo_url: Option<String>,
}

impl From<BitRow> for Bit {
    fn from(row: BitRow) -> Self {
        let child = match (row.child_id, row.child_name, row.child_color) {
            (Some(id), Some(name), Some(color)) => Some(ChildSummary {
                id,
                name,
                color,
                photo_url: row.child_photo_url,
            }),
            _ => None,
        };
        Bit {
            id: row.id,
            user_id: row.user_id,
            child_id: row.child_id,
            text: row.text,
            context: row.context,
            photo_url: row.photo_url,
            bit_date: row.bit_date,
            created_at: row.created_at,
            updated_at: row.updated_at,
            child,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
    owner: Uuid,
}

impl PgStore {
    pub fn new(pool: PgPool, owner: Uuid) -> Self {
        Self { pool, owner }
    }

    pub fn owner(&self) -> Uuid {
        self.owner
    }

    pub async fn ensure_schema(&self) -> Result<(), BitsError> {
        crate::db::ensure_schema(&self.pool).await?;
        Ok(())
    }

    fn push_conditions(&self, qb: &mut QueryBuilder<'_, Postgres>, filter: &BitFilter) {
        qb.push(" WHERE b.user_id = ").push_bind(self.owner);
        for clause in filter.clauses() {
            match clause {
                Clause::TextContains(q) => {
                    qb.push(" AND b.text ILIKE ")
                        .push_bind(format!("%{}%", escape_like(&q)));
                }
                Clause::ChildIs(id) => {
                    qb.push(" AND b.child_id = ").push_bind(id);
                }
                Clause::CreatedOnOrAfter(date) => {
                    qb.push(" AND b.created_at >= ").push_bind(start_of_day(date));
                }
                Clause::CreatedOnOrBefore(date) => {
                    qb.push(" AND b.created_at < ").push_bind(end_of_day(date));
                }
                Clause::HasPhoto(true) => {
                    qb.push(" AND b.photo_url IS NOT NULL");
                }
                Clause::HasPhoto(false) => {
                    qb.push(" AND b.photo_url IS NULL");
                }
            }
        }
    }

    async fn fetch_bit(&self, id: Uuid) -> Result<Bit, BitsError> {
        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT {} FROM bits b LEFT JOIN children c ON c.id = b.child_id",
            BIT_COLUMNS
        ));
        qb.push(" WHERE b.id = ")
            .push_bind(id)
            .push(" AND b.user_id = ")
            .push_bind(self.owner);
        let row: BitRow = qb.build_query_as().fetch_one(&self.pool).await?;
        Ok(row.into())
    }
}

#[async_trait]
impl BitStore for PgStore {
    async fn list_bits(
        &self,
        filter: &BitFilter,
        page: usize,
        page_size: usize,
    ) -> Result<Page, BitsError> {
        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT {} FROM bits b LEFT JOIN children c ON c.id = b.child_id",
            BIT_COLUMNS
        ));
        self.push_conditions(&mut qb, filter);
        qb.push(BIT_ORDER)
            .push(" LIMIT ")
            .push_bind(page_size as i64)
            .push(" OFFSET ")
            .push_bind((page * page_size) as i64);
        let rows: Vec<BitRow> = qb.build_query_as().fetch_all(&self.pool).await?;

        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM bits b");
        self.push_conditions(&mut count, filter);
        let (total,): (i64,) = count.build_query_as().fetch_one(&self.pool).await?;

        tracing::debug!(page, rows = rows.len(), total, "Listed bits");
        Ok(Page {
            rows: rows.into_iter().map(Bit::from).collect(),
            total: Some(total.max(0) as u64),
        })
    }

    async fn create_bit(&self, insert: &BitInsert) -> Result<Bit, BitsError> {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO bits (id, user_id, child_id, text, context, photo_url, bit_date)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(id)
        .bind(self.owner)
        .bind(insert.child_id)
        .bind(&insert.text)
        .bind(&insert.context)
        .bind(&insert.photo_url)
        .bind(insert.bit_date)
        .execute(&self.pool)
        .await?;

        self.fetch_bit(id).await
    }

    async fn update_bit(&self, id: Uuid, changes: &BitChanges) -> Result<(), BitsError> {
        let mut qb = QueryBuilder::<Postgres>::new("UPDATE bits SET updated_at = now()");
        if let Some(text) = &changes.text {
            qb.push(", text = ").push_bind(text.clone());
        }
        if let Some(child_id) = changes.child_id {
            qb.push(", child_id = ").push_bind(child_id);
        }
        if let Some(photo_url) = &changes.photo_url {
            qb.push(", photo_url = ").push_bind(photo_url.clone());
        }
        if let Some(context) = &changes.context {
            qb.push(", context = ").push_bind(context.clone());
        }
        if let Some(bit_date) = changes.bit_date {
            qb.push(", bit_date = ").push_bind(bit_date);
        }
        qb.push(" WHERE id = ")
            .push_bind(id)
            .push(" AND user_id = ")
            .push_bind(self.owner);

        let result = qb.build().execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Err(BitsError::NotFound(format!("bit {}", id)));
        }
        Ok(())
    }

    async fn delete_bit(&self, id: Uuid) -> Result<(), BitsError> {
        sqlx::query("DELETE FROM bits WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(self.owner)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ChildStore for PgStore {
    async fn list_children(&self) -> Result<Vec<Child>, BitsError> {
        let children = sqlx::query_as::<_, Child>(
            "SELECT * FROM children WHERE user_id = $1 ORDER BY created_at ASC",
        )
        .bind(self.owner)
        .fetch_all(&self.pool)
        .await?;
        Ok(children)
    }

    async fn create_child(&self, insert: &ChildInsert) -> Result<Child, BitsError> {
        let child = sqlx::query_as::<_, Child>(
            r#"
            INSERT INTO children (id, user_id, name, birthdate, color)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(self.owner)
        .bind(&insert.name)
        .bind(insert.birthdate)
        .bind(&insert.color)
        .fetch_one(&self.pool)
        .await?;
        Ok(child)
    }

    async fn update_child(&self, id: Uuid, changes: &ChildChanges) -> Result<(), BitsError> {
        let mut qb = QueryBuilder::<Postgres>::new("UPDATE children SET updated_at = now()");
        if let Some(name) = &changes.name {
            qb.push(", name = ").push_bind(name.clone());
        }
        if let Some(birthdate) = changes.birthdate {
            qb.push(", birthdate = ").push_bind(birthdate);
        }
        if let Some(color) = &changes.color {
            qb.push(", color = ").push_bind(color.clone());
        }
        qb.push(" WHERE id = ")
            .push_bind(id)
            .push(" AND user_id = ")
            .push_bind(self.owner);

        let result = qb.build().execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Err(BitsError::NotFound(format!("child {}", id)));
        }
        Ok(())
    }

    async fn delete_child(&self, id: Uuid) -> Result<(), BitsError> {
        // bits.child_id is ON DELETE SET NULL
        sqlx::query("DELETE FROM children WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(self.owner)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl MilestoneStore for PgStore {
    async fn list_milestones(&self) -> Result<Vec<Milestone>, BitsError> {
        let milestones = sqlx::query_as::<_, Milestone>(
            "SELECT id, user_id, name, created_at FROM milestones WHERE user_id = $1 ORDER BY name ASC",
        )
        .bind(self.owner)
        .fetch_all(&self.pool)
        .await?;
        Ok(milestones)
    }

    async fn create_milestone(&self, user_id: Uuid, name: &str) -> Result<Milestone, BitsError> {
        let milestone = sqlx::query_as::<_, Milestone>(
            r#"
            INSERT INTO milestones (id, user_id, name)
            VALUES ($1, $2, $3)
            RETURNING id, user_id, name, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(name)
        .fetch_one(&self.pool)
        .await?;
        Ok(milestone)
    }
}

/// The configured owner is always the signed-in user.
#[async_trait]
impl Identity for PgStore {
    async fn current_user_id(&self) -> Result<Option<Uuid>, BitsError> {
        Ok(Some(self.owner))
    }
}
