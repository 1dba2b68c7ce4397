use chrono::Utc;
use contracts::domain::{Brand, BrandTarget};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use sea_orm::entity::prelude::*;
use sea_orm::sea_query::OnConflict;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};

use crate::shared::data::db::get_connection;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "brands")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub name: String,
    pub comment: Option<String>,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for Brand {
    fn from(m: Model) -> Self {
        Brand {
            id: Uuid::parse_str(&m.id).unwrap_or_else(|_| Uuid::new_v4()),
            name: m.name,
            comment: m.comment,
            created_at: m.created_at.unwrap_or_else(Utc::now),
        }
    }
}

mod target {
    use super::*;

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
    #[sea_orm(table_name = "brand_targets")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub id: String,
        pub brand: String,
        pub period: String,
        pub target_revenue: f64,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

fn conn() -> &'static DatabaseConnection {
    get_connection()
}

pub async fn list_all() -> anyhow::Result<Vec<Brand>> {
    let items = Entity::find()
        .order_by_asc(Column::Name)
        .all(conn())
        .await?;
    Ok(items.into_iter().map(Into::into).collect())
}

pub async fn find_by_name(name: &str) -> anyhow::Result<Option<Brand>> {
    let item = Entity::find()
        .filter(Column::Name.eq(name))
        .one(conn())
        .await?;
    Ok(item.map(Into::into))
}

pub async fn insert(brand: &Brand) -> anyhow::Result<Uuid> {
    let active = ActiveModel {
        id: Set(brand.id.to_string()),
        name: Set(brand.name.clone()),
        comment: Set(brand.comment.clone()),
        created_at: Set(Some(brand.created_at)),
    };
    active.insert(conn()).await?;
    Ok(brand.id)
}

pub async fn delete_by_name(name: &str) -> anyhow::Result<bool> {
    let result = Entity::delete_many()
        .filter(Column::Name.eq(name))
        .exec(conn())
        .await?;
    Ok(result.rows_affected > 0)
}

pub async fn list_targets(brand: Option<&str>) -> anyhow::Result<Vec<BrandTarget>> {
    let mut find = target::Entity::find();
    if let Some(brand) = brand {
        find = find.filter(target::Column::Brand.eq(brand));
    }
    let items = find
        .order_by_asc(target::Column::Brand)
        .order_by_asc(target::Column::Period)
        .all(conn())
        .await?;
    Ok(items
        .into_iter()
        .map(|m| BrandTarget {
            brand: m.brand,
            period: m.period,
            target_revenue: m.target_revenue,
        })
        .collect())
}

pub async fn upsert_target(target_row: &BrandTarget) -> anyhow::Result<()> {
    let active = target::ActiveModel {
        id: Set(format!("{}|{}", target_row.brand, target_row.period)),
        brand: Set(target_row.brand.clone()),
        period: Set(target_row.period.clone()),
        target_revenue: Set(target_row.target_revenue),
    };
    target::Entity::insert(active)
        .on_conflict(
            OnConflict::column(target::Column::Id)
                .update_columns([target::Column::TargetRevenue])
                .to_owned(),
        )
        .exec(conn())
        .await?;
    Ok(())
}

pub async fn delete_targets_for_brand(brand: &str) -> anyhow::Result<u64> {
    let result = target::Entity::delete_many()
        .filter(target::Column::Brand.eq(brand))
        .exec(conn())
        .await?;
    Ok(result.rows_affected)
}
