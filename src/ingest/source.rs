use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::models::{ClothingPart, GarmentRecord};

/// Source rows join precomputed description embeddings with the item's
/// categorical metadata. `exist_flag` keeps delisted items out of the
/// index on re-runs.
const PART_ROWS_SQL: &str = "\
SELECT e.item_id,
       e.description_embeddings AS embedding_json,
       i.gender AS gender_category,
       i.spring,
       i.summer,
       i.autumn,
       i.winter
FROM embeddings e
INNER JOIN item_info i ON i.item_id = e.item_id
WHERE i.mastertype = $1
  AND i.exist_flag = 1";

const PENDING_DESCRIPTIONS_SQL: &str =
    "SELECT item_id FROM item_info WHERE generated_description IS NULL";

const STORE_DESCRIPTION_SQL: &str =
    "UPDATE item_info SET generated_description = $1 WHERE item_id = $2";

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SourceRow {
    pub item_id: i64,
    pub embedding_json: String,
    pub gender_category: Option<String>,
    pub spring: i32,
    pub summer: i32,
    pub autumn: i32,
    pub winter: i32,
}

/// Relational store handle. The pool is bounded with a minimum idle count;
/// acquire blocks when exhausted, so a leaked lease shows up as latency
/// rather than silent starvation.
pub struct ItemSource {
    pool: PgPool,
}

impl ItemSource {
    pub async fn connect(database_url: &str) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .min_connections(2)
            .max_connections(10)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub async fn fetch_part_rows(&self, part: ClothingPart) -> Result<Vec<SourceRow>, sqlx::Error> {
        sqlx::query_as::<_, SourceRow>(PART_ROWS_SQL)
            .bind(part.master_type())
            .fetch_all(&self.pool)
            .await
    }

    /// Item ids still waiting for a generated description.
    pub async fn pending_description_ids(&self) -> Result<Vec<i64>, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(PENDING_DESCRIPTIONS_SQL)
            .fetch_all(&self.pool)
            .await
    }

    /// Write back one generated description. The connection is leased for
    /// exactly this unit of work and returned on every exit path.
    pub async fn store_description(
        &self,
        item_id: i64,
        description: &str,
    ) -> Result<(), sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        sqlx::query(STORE_DESCRIPTION_SQL)
            .bind(description)
            .bind(item_id)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }
}

/// Fixed category-to-code mapping. Anything unmapped gets sentinel 4,
/// which no gender filter clause matches.
pub fn gender_code(category: Option<&str>) -> i64 {
    match category {
        Some("MEN") | Some("BOYS") => 1,
        Some("WOMEN") | Some("GIRLS") => 2,
        Some("UNISEX") => 3,
        _ => 4,
    }
}

/// Decode one source row into an indexable record. A payload that does not
/// parse as a float array of the deployment width is reported back to the
/// caller, which drops the row without failing the batch.
pub fn decode_row(row: &SourceRow, dim: usize) -> Result<GarmentRecord, String> {
    let embedding: Vec<f32> = serde_json::from_str(&row.embedding_json)
        .map_err(|e| format!("unparseable embedding payload: {e}"))?;
    if embedding.len() != dim {
        return Err(format!(
            "embedding width {} does not match expected {}",
            embedding.len(),
            dim
        ));
    }

    Ok(GarmentRecord {
        item_id: row.item_id,
        embedding,
        gender: gender_code(row.gender_category.as_deref()),
        spring: i64::from(row.spring),
        summer: i64::from(row.summer),
        autumn: i64::from(row.autumn),
        winter: i64::from(row.winter),
    })
}
