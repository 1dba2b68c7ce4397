use chrono::Utc;
use contracts::domain::{Brand, BrandDto, BrandTarget};
use uuid::Uuid;

use super::repository;

pub async fn create(dto: BrandDto) -> anyhow::Result<Uuid> {
    dto.validate()
        .map_err(|e| anyhow::anyhow!("Validation failed: {}", e))?;

    if repository::find_by_name(&dto.name).await?.is_some() {
        return Err(anyhow::anyhow!("Brand already exists: {}", dto.name));
    }

    let brand = Brand {
        id: Uuid::new_v4(),
        name: dto.name.trim().to_string(),
        comment: dto.comment,
        created_at: Utc::now(),
    };
    repository::insert(&brand).await
}

pub async fn list_all() -> anyhow::Result<Vec<Brand>> {
    repository::list_all().await
}

pub async fn list_targets(brand: Option<&str>) -> anyhow::Result<Vec<BrandTarget>> {
    repository::list_targets(brand).await
}

pub async fn upsert_target(target: BrandTarget) -> anyhow::Result<()> {
    if target.brand.trim().is_empty() {
        return Err(anyhow::anyhow!("Target brand must not be empty"));
    }
    repository::upsert_target(&target).await
}
