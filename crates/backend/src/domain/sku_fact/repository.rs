use chrono::{NaiveDate, Utc};
use contracts::domain::SkuRecord;
use serde::{Deserialize, Serialize};

use sea_orm::entity::prelude::*;
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ColumnTrait, DatabaseBackend, EntityTrait, QueryFilter, QueryOrder, QuerySelect, Set,
    Statement,
};

use crate::domain::sales_fact::repository::plain_day;
use crate::shared::data::db::get_connection;
use crate::shared::data::store::{RowQuery, UpsertOutcome};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "sku_facts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub date: String, // stored as YYYY-MM-DD
    pub brand: String,
    pub channel: String,
    pub sku: String,
    pub units: i64,
    pub revenue: f64,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
    pub updated_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for SkuRecord {
    fn from(m: Model) -> Self {
        let date = NaiveDate::parse_from_str(plain_day(&m.date), "%Y-%m-%d")
            .unwrap_or_else(|_| Utc::now().date_naive());
        SkuRecord {
            date,
            brand: m.brand,
            channel: m.channel,
            sku: m.sku,
            units: m.units,
            revenue: m.revenue,
        }
    }
}

fn conn() -> &'static DatabaseConnection {
    get_connection()
}

fn active_model(record: &SkuRecord) -> ActiveModel {
    ActiveModel {
        id: Set(record.external_id()),
        date: Set(record.date.format("%Y-%m-%d").to_string()),
        brand: Set(record.brand.clone()),
        channel: Set(record.channel.clone()),
        sku: Set(record.sku.clone()),
        units: Set(record.units),
        revenue: Set(record.revenue),
        created_at: Set(Some(Utc::now())),
        updated_at: Set(Some(Utc::now())),
    }
}

pub async fn select(query: &RowQuery) -> anyhow::Result<Vec<SkuRecord>> {
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

pub async fn insert_many(rows: &[SkuRecord]) -> anyhow::Result<usize> {
    if rows.is_empty() {
        return Ok(0);
    }
    let models: Vec<ActiveModel> = rows.iter().map(active_model).collect();
    Entity::insert_many(models).exec(conn()).await?;
    Ok(rows.len())
}

pub async fn upsert_many(rows: &[SkuRecord]) -> anyhow::Result<usize> {
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
                    Column::Sku,
                    Column::Units,
                    Column::Revenue,
                    Column::UpdatedAt,
                ])
                .to_owned(),
        )
        .exec(conn())
        .await?;
    Ok(rows.len())
}

pub async fn upsert_one(row: &SkuRecord) -> anyhow::Result<UpsertOutcome> {
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

pub async fn update_one(row: &SkuRecord) -> anyhow::Result<()> {
    let active = ActiveModel {
        id: Set(row.external_id()),
        date: Set(row.date.format("%Y-%m-%d").to_string()),
        brand: Set(row.brand.clone()),
        channel: Set(row.channel.clone()),
        sku: Set(row.sku.clone()),
        units: Set(row.units),
        revenue: Set(row.revenue),
        updated_at: Set(Some(Utc::now())),
        created_at: sea_orm::ActiveValue::NotSet,
    };
    active.update(conn()).await?;
    Ok(())
}

pub async fn delete_for_brand(brand: &str, limit: u64) -> anyhow::Result<u64> {
    let stmt = Statement::from_sql_and_values(
        DatabaseBackend::Sqlite,
        "DELETE FROM sku_facts WHERE id IN \
         (SELECT id FROM sku_facts WHERE brand = ? LIMIT ?)",
        [brand.into(), (limit as i64).into()],
    );
    let result = conn().execute(stmt).await?;
    Ok(result.rows_affected())
}

pub async fn reassign_brand(from: &str, to: &str, limit: u64) -> anyhow::Result<u64> {
    let stmt = Statement::from_sql_and_values(
        DatabaseBackend::Sqlite,
        "UPDATE sku_facts SET brand = ? WHERE id IN \
         (SELECT id FROM sku_facts WHERE brand = ? LIMIT ?)",
        [to.into(), from.into(), (limit as i64).into()],
    );
    let result = conn().execute(stmt).await?;
    Ok(result.rows_affected())
}
