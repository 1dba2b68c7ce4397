use chrono::{NaiveDate, Utc};
use contracts::domain::SalesRecord;
use serde::{Deserialize, Serialize};

use sea_orm::entity::prelude::*;
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ColumnTrait, DatabaseBackend, EntityTrait, FromQueryResult, QueryFilter, QueryOrder,
    QuerySelect, Set, Statement,
};

use crate::shared::data::db::get_connection;
use crate::shared::data::store::{AggregationParams, AggregationRow, RowQuery, UpsertOutcome};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "sales_facts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub date: String, // stored as YYYY-MM-DD
    pub brand: String,
    pub channel: String,
    pub revenue: f64,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
    pub updated_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

/// Strip any time component a stored date may carry; callers only ever see
/// plain `YYYY-MM-DD` day strings.
pub(crate) fn plain_day(value: &str) -> &str {
    value.split(['T', ' ']).next().unwrap_or(value)
}

impl From<Model> for SalesRecord {
    fn from(m: Model) -> Self {
        let date = NaiveDate::parse_from_str(plain_day(&m.date), "%Y-%m-%d")
            .unwrap_or_else(|_| Utc::now().date_naive());
        SalesRecord {
            date,
            brand: m.brand,
            channel: m.channel,
            revenue: m.revenue,
        }
    }
}

fn conn() -> &'static DatabaseConnection {
    get_connection()
}

fn active_model(record: &SalesRecord) -> ActiveModel {
    ActiveModel {
        id: Set(record.external_id()),
        date: Set(record.date.format("%Y-%m-%d").to_string()),
        brand: Set(record.brand.clone()),
        channel: Set(record.channel.clone()),
        revenue: Set(record.revenue),
        created_at: Set(Some(Utc::now())),
        updated_at: Set(Some(Utc::now())),
    }
}

pub async fn select(query: &RowQuery) -> anyhow::Result<Vec<SalesRecord>> {
    let mut find = Entity::find();
    if let Some(start) = query.start_date {
        find = find.filter(Column::Date.gte(start.format("%Y-%m-%d").to_string()));
    }
    if let Some(end) = query.end_date {
        find = find.filter(Column::Date.lte(end.format("%Y-%m-%d").to_string()));
    }
    if let Some(brand) = &query.brand {
        find = find.filter(Column::Brand.eq(brand.clone()));
    }
    if let Some(channel) = &query.channel {
        find = find.filter(Column::Channel.eq(channel.clone()));
    }
    let models = find
        .order_by_asc(Column::Date)
        .order_by_asc(Column::Id)
        .offset(query.offset)
        .limit(query.limit)
        .all(conn())
        .await?;
    Ok(models.into_iter().map(Into::into).collect())
}

#[derive(Debug, FromQueryResult)]
struct AggRow {
    period: String,
    channel: String,
    revenue: f64,
}

/// Server-side aggregation: revenue grouped by period label and channel.
/// The payload is O(channels x periods) instead of O(rows).
pub async fn aggregate(params: &AggregationParams) -> anyhow::Result<Vec<AggregationRow>> {
    let period_expr = match params.group_by {
        contracts::queries::Granularity::Day => "date",
        contracts::queries::Granularity::Week => "strftime('%Y-W%W', date)",
        contracts::queries::Granularity::Month => "strftime('%Y-%m', date)",
    };

    let mut sql = format!(
        "SELECT {} AS period, channel, COALESCE(SUM(revenue), 0) AS revenue \
         FROM sales_facts WHERE 1=1",
        period_expr
    );
    let mut values: Vec<sea_orm::Value> = Vec::new();
    if let Some(start) = params.start_date {
        sql.push_str(" AND date >= ?");
        values.push(start.format("%Y-%m-%d").to_string().into());
    }
    if let Some(end) = params.end_date {
        sql.push_str(" AND date <= ?");
        values.push(end.format("%Y-%m-%d").to_string().into());
    }
    if let Some(brand) = &params.brand {
        sql.push_str(" AND brand = ?");
        values.push(brand.clone().into());
    }
    if let Some(channel) = &params.channel {
        sql.push_str(" AND channel = ?");
        values.push(channel.clone().into());
    }
    sql.push_str(" GROUP BY period, channel ORDER BY period, channel");

    let stmt = Statement::from_sql_and_values(DatabaseBackend::Sqlite, sql, values);
    let rows = AggRow::find_by_statement(stmt).all(conn()).await?;

    Ok(rows
        .into_iter()
        .map(|r| AggregationRow {
            period: r.period,
            channel: r.channel,
            revenue: r.revenue,
        })
        .collect())
}

pub async fn insert_many(rows: &[SalesRecord]) -> anyhow::Result<usize> {
    if rows.is_empty() {
        return Ok(0);
    }
    let models: Vec<ActiveModel> = rows.iter().map(active_model).collect();
    Entity::insert_many(models).exec(conn()).await?;
    Ok(rows.len())
}

pub async fn upsert_many(rows: &[SalesRecord]) -> anyhow::Result<usize> {
    if rows.is_empty() {
        return Ok(0);
    }
    let models: Vec<ActiveModel> = rows.iter().map(active_model).collect();
    Entity::insert_many(models)
        .on_conflict(
            OnConflict::column(Column::Id)
                .update_columns([
                    Column::Date,
                    Column::Brand,
                    Column::Channel,
                    Column::Revenue,
                    Column::UpdatedAt,
                ])
                .to_owned(),
        )
        .exec(conn())
        .await?;
    Ok(rows.len())
}

pub async fn upsert_one(row: &SalesRecord) -> anyhow::Result<UpsertOutcome> {
    let id = row.external_id();
    let existing = Entity::find_by_id(id.clone()).one(conn()).await?;
    match existing {
        Some(_) => {
            update_one(row).await?;
            Ok(UpsertOutcome::Updated)
        }
        None => {
            active_model(row).insert(conn()).await?;
            Ok(UpsertOutcome::Inserted)
        }
    }
}

pub async fn existing_ids(ids: &[String]) -> anyhow::Result<Vec<String>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let found = Entity::find()
        .select_only()
        .column(Column::Id)
        .filter(Column::Id.is_in(ids.iter().cloned()))
        .into_tuple::<String>()
        .all(conn())
        .await?;
    Ok(found)
}

pub async fn update_one(row: &SalesRecord) -> anyhow::Result<()> {
    let active = ActiveModel {
        id: Set(row.external_id()),
        date: Set(row.date.format("%Y-%m-%d").to_string()),
        brand: Set(row.brand.clone()),
        channel: Set(row.channel.clone()),
        revenue: Set(row.revenue),
        updated_at: Set(Some(Utc::now())),
        created_at: sea_orm::ActiveValue::NotSet,
    };
    active.update(conn()).await?;
    Ok(())
}

/// Delete at most `limit` rows of a brand in one statement; looped by the
/// caller to stay under remote statement-timeout limits.
pub async fn delete_for_brand(brand: &str, limit: u64) -> anyhow::Result<u64> {
    let stmt = Statement::from_sql_and_values(
        DatabaseBackend::Sqlite,
        "DELETE FROM sales_facts WHERE id IN \
         (SELECT id FROM sales_facts WHERE brand = ? LIMIT ?)",
        [brand.into(), (limit as i64).into()],
    );
    let result = conn().execute(stmt).await?;
    Ok(result.rows_affected())
}

pub async fn reassign_brand(from: &str, to: &str, limit: u64) -> anyhow::Result<u64> {
    let stmt = Statement::from_sql_and_values(
        DatabaseBackend::Sqlite,
        "UPDATE sales_facts SET brand = ? WHERE id IN \
         (SELECT id FROM sales_facts WHERE brand = ? LIMIT ?)",
        [to.into(), from.into(), (limit as i64).into()],
    );
    let result = conn().execute(stmt).await?;
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_day_strips_time_component() {
        assert_eq!(plain_day("2025-03-14"), "2025-03-14");
        assert_eq!(plain_day("2025-03-14T10:30:00Z"), "2025-03-14");
        assert_eq!(plain_day("2025-03-14 10:30:00"), "2025-03-14");
    }
}
