use qdrant_client::qdrant::{
    point_id::PointIdOptions, CreateCollectionBuilder, CreateFieldIndexCollectionBuilder,
    Datatype, Distance, FieldType, HnswConfigDiffBuilder, PointStruct, ScrollPointsBuilder,
    SearchParamsBuilder, SearchPointsBuilder, UpsertPointsBuilder, VectorParamsBuilder,
};
use qdrant_client::{Qdrant, QdrantError};
use serde_json::{Map as JsonMap, Value as JsonValue};
use std::collections::HashSet;

use crate::error::ServiceError;
use crate::models::{ClothingPart, GarmentRecord, Season};

/// Payload fields that get an integer index so filtered searches stay
/// cheap.
const INDEXED_FIELDS: [&str; 5] = ["gender", "spring", "summer", "autumn", "winter"];

/// Vector index handle covering all four part collections. One client,
/// collection routing by part-type; each search is bounded to one part's
/// semantically homogeneous records.
pub struct GarmentIndex {
    client: Qdrant,
    vector_dim: u64,
    search_breadth: u64,
}

/// Per-collection HNSW build parameters. Tops is by far the largest
/// collection and gets a denser graph.
fn hnsw_params(part: ClothingPart) -> (u64, u64) {
    match part {
        ClothingPart::Tops => (32, 256),
        _ => (16, 128),
    }
}

fn index_err(e: QdrantError) -> ServiceError {
    ServiceError::IndexUnavailable(e.to_string())
}

impl GarmentIndex {
    pub async fn connect(
        url: &str,
        vector_dim: u64,
        search_breadth: u64,
    ) -> Result<Self, ServiceError> {
        tracing::info!("Building Qdrant client for URL: {}", url);
        let client = Qdrant::from_url(url).build().map_err(index_err)?;
        Ok(Self {
            client,
            vector_dim,
            search_breadth,
        })
    }

    /// `absent -> created`: provision the collection with the fixed schema
    /// if the name is unknown. An existing collection is reused as-is; no
    /// schema drift detection.
    pub async fn ensure_collection(&self, part: ClothingPart) -> Result<(), ServiceError> {
        let name = part.collection_name();
        if self
            .client
            .collection_exists(name)
            .await
            .map_err(index_err)?
        {
            tracing::info!("Collection '{}' already exists", name);
            return Ok(());
        }

        let (m, ef_construct) = hnsw_params(part);
        self.client
            .create_collection(
                CreateCollectionBuilder::new(name)
                    .vectors_config(
                        VectorParamsBuilder::new(self.vector_dim, Distance::Cosine)
                            .datatype(Datatype::Float16),
                    )
                    .hnsw_config(
                        HnswConfigDiffBuilder::default()
                            .m(m)
                            .ef_construct(ef_construct),
                    ),
            )
            .await
            .map_err(index_err)?;
        tracing::info!("Collection '{}' created (m={}, ef_construct={})", name, m, ef_construct);
        Ok(())
    }

    /// `created -> indexed`: integer payload indexes on the filterable
    /// fields, created only where the payload schema has none yet.
    pub async fn ensure_payload_indexes(&self, part: ClothingPart) -> Result<(), ServiceError> {
        let name = part.collection_name();
        let info = self
            .client
            .collection_info(name)
            .await
            .map_err(index_err)?;
        let schema = info
            .result
            .map(|collection| collection.payload_schema)
            .unwrap_or_default();

        for field in INDEXED_FIELDS {
            if schema.contains_key(field) {
                continue;
            }
            self.client
                .create_field_index(CreateFieldIndexCollectionBuilder::new(
                    name,
                    field,
                    FieldType::Integer,
                ))
                .await
                .map_err(index_err)?;
            tracing::info!("Created payload index on '{}.{}'", name, field);
        }
        Ok(())
    }

    /// Item ids already present in the collection, for ingestion dedup.
    pub async fn existing_item_ids(
        &self,
        part: ClothingPart,
    ) -> Result<HashSet<i64>, ServiceError> {
        let name = part.collection_name();
        let mut ids = HashSet::new();
        let mut offset: Option<qdrant_client::qdrant::PointId> = None;

        loop {
            let mut builder = ScrollPointsBuilder::new(name).limit(1000).with_payload(false);
            if let Some(ref off) = offset {
                builder = builder.offset(off.clone());
            }

            let result = self.client.scroll(builder).await.map_err(index_err)?;
            for point in &result.result {
                if let Some(id) = point.id.as_ref().and_then(point_item_id) {
                    ids.insert(id);
                }
            }

            offset = result.next_page_offset;
            if offset.is_none() {
                break;
            }
        }

        Ok(ids)
    }

    /// Upsert one batch of records. `wait` is set so a returned `Ok` means
    /// the batch is durable; upsert by point id keeps re-runs idempotent.
    pub async fn insert_batch(
        &self,
        part: ClothingPart,
        records: &[GarmentRecord],
    ) -> Result<(), ServiceError> {
        let points: Vec<PointStruct> = records
            .iter()
            .map(|record| {
                PointStruct::new(
                    record.item_id as u64,
                    record.embedding.clone(),
                    record_payload(record),
                )
            })
            .collect();

        self.client
            .upsert_points(UpsertPointsBuilder::new(part.collection_name(), points).wait(true))
            .await
            .map_err(index_err)?;
        Ok(())
    }

    /// Cosine ANN search in the part's collection, restricted by `filter`,
    /// returning up to `top_k` item ids by descending similarity. Fewer
    /// than `top_k` hits is valid when the filtered set is small.
    pub async fn search(
        &self,
        part: ClothingPart,
        vector: Vec<f32>,
        filter: &super::filter::SearchFilter,
        top_k: u64,
    ) -> Result<Vec<i64>, ServiceError> {
        let name = part.collection_name();
        let exists = self
            .client
            .collection_exists(name)
            .await
            .map_err(index_err)?;
        if !exists {
            return Err(ServiceError::CollectionNotFound(name.to_string()));
        }

        let mut builder = SearchPointsBuilder::new(name, vector, top_k)
            .params(SearchParamsBuilder::default().hnsw_ef(self.search_breadth))
            .with_payload(false);
        if let Some(qdrant_filter) = filter.to_qdrant() {
            builder = builder.filter(qdrant_filter);
        }

        let response = self
            .client
            .search_points(builder)
            .await
            .map_err(index_err)?;

        Ok(response
            .result
            .iter()
            .filter_map(|point| point.id.as_ref().and_then(point_item_id))
            .collect())
    }
}

fn point_item_id(id: &qdrant_client::qdrant::PointId) -> Option<i64> {
    match id.point_id_options {
        Some(PointIdOptions::Num(num)) => Some(num as i64),
        _ => None,
    }
}

fn record_payload(record: &GarmentRecord) -> JsonMap<String, JsonValue> {
    let mut payload = JsonMap::new();
    payload.insert("gender".to_string(), JsonValue::from(record.gender));
    payload.insert(
        Season::Spring.field_name().to_string(),
        JsonValue::from(record.spring),
    );
    payload.insert(
        Season::Summer.field_name().to_string(),
        JsonValue::from(record.summer),
    );
    payload.insert(
        Season::Autumn.field_name().to_string(),
        JsonValue::from(record.autumn),
    );
    payload.insert(
        Season::Winter.field_name().to_string(),
        JsonValue::from(record.winter),
    );
    payload
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hnsw_params_per_collection() {
        assert_eq!(hnsw_params(ClothingPart::Tops), (32, 256));
        assert_eq!(hnsw_params(ClothingPart::Pants), (16, 128));
        assert_eq!(hnsw_params(ClothingPart::Outerwear), (16, 128));
        assert_eq!(hnsw_params(ClothingPart::DressSkirt), (16, 128));
    }

    #[test]
    fn test_record_payload_fields() {
        let record = GarmentRecord {
            item_id: 42,
            embedding: vec![0.0; 4],
            gender: 3,
            spring: 1,
            summer: 0,
            autumn: 1,
            winter: 0,
        };
        let payload = record_payload(&record);
        assert_eq!(payload.len(), INDEXED_FIELDS.len());
        assert_eq!(payload["gender"], JsonValue::from(3));
        assert_eq!(payload["spring"], JsonValue::from(1));
        assert_eq!(payload["summer"], JsonValue::from(0));
    }
}
