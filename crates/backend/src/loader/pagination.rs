use std::future::Future;

use crate::error::DataError;

/// Exhaustively page through a data source with an offset cursor.
///
/// Fetches fixed-size pages until one comes back short. `max_pages` is a
/// hard ceiling that guarantees termination even against a source that
/// always fills its pages.
pub async fn load_with_pagination<T, F, Fut>(
    page_size: u64,
    max_pages: u32,
    mut fetch_page: F,
) -> Result<Vec<T>, DataError>
where
    F: FnMut(u64, u64) -> Fut,
    Fut: Future<Output = Result<Vec<T>, DataError>>,
{
    let mut rows: Vec<T> = Vec::new();
    let mut offset = 0u64;

    for page in 0..max_pages {
        let mut page_rows = fetch_page(offset, page_size).await?;
        let fetched = page_rows.len() as u64;
        rows.append(&mut page_rows);

        if fetched < page_size {
            tracing::debug!(
                "Pagination finished after {} page(s), {} rows total",
                page + 1,
                rows.len()
            );
            return Ok(rows);
        }
        offset += page_size;
    }

    tracing::warn!(
        "Pagination hit the {}-page ceiling with {} rows; result may be incomplete",
        max_pages,
        rows.len()
    );
    Ok(rows)
}
