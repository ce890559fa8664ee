use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The four garment part-types. Each part owns one vector collection; the
/// intent gateway's output schema is restricted to exactly these values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClothingPart {
    Tops,
    Pants,
    Outerwear,
    DressSkirt,
}

impl ClothingPart {
    pub const ALL: [ClothingPart; 4] = [
        ClothingPart::Tops,
        ClothingPart::Pants,
        ClothingPart::Outerwear,
        ClothingPart::DressSkirt,
    ];

    /// Name of the vector collection holding this part's records.
    pub fn collection_name(&self) -> &'static str {
        match self {
            ClothingPart::Tops => "tops",
            ClothingPart::Pants => "pants",
            ClothingPart::Outerwear => "outerwear",
            ClothingPart::DressSkirt => "dress_skirt",
        }
    }

    /// `item_info.mastertype` value selecting this part's source rows.
    pub fn master_type(&self) -> &'static str {
        match self {
            ClothingPart::Tops => "Tops",
            ClothingPart::Pants => "Pants",
            ClothingPart::Outerwear => "Outerwear",
            ClothingPart::DressSkirt => "Dresses & Skirts",
        }
    }

    pub fn from_collection_name(name: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|part| part.collection_name() == name)
    }
}

impl std::fmt::Display for ClothingPart {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.collection_name())
    }
}

/// Caller-declared gender. Codes follow the indexed records: man=1,
/// woman=2, unisex/other=3. `Unspecified` applies no gender restriction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Unspecified,
    Man,
    Woman,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Season {
    Spring,
    Summer,
    Autumn,
    Winter,
}

impl Season {
    /// Canonical order. Filter clauses are always emitted in this order no
    /// matter how the caller ordered their input.
    pub const ALL: [Season; 4] = [
        Season::Spring,
        Season::Summer,
        Season::Autumn,
        Season::Winter,
    ];

    /// Payload field carrying this season's 0/1 flag.
    pub fn field_name(&self) -> &'static str {
        match self {
            Season::Spring => "spring",
            Season::Summer => "summer",
            Season::Autumn => "autumn",
            Season::Winter => "winter",
        }
    }
}

/// One clothing part the customer asked about, with the LLM's feature
/// summary used as the retrieval query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartQuery {
    pub part: ClothingPart,
    pub summary: String,
}

/// Fully resolved request intent: the LLM analysis plus the caller's
/// gender/season context. Immutable once built; consumed by the engine.
#[derive(Debug, Clone)]
pub struct Intent {
    pub greeting: String,
    pub parts: Vec<PartQuery>,
    pub gender: Gender,
    pub seasons: Vec<Season>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConsultRequest {
    pub prompt: String,
    #[serde(default)]
    pub gender: Option<Gender>,
    #[serde(default)]
    pub seasons: Option<Vec<Season>>,
}

/// Per-part result. A part whose search failed stays in the map with an
/// explicit `failed` status; an empty `item_ids` list under `matched`
/// means the filtered candidate set genuinely had no qualifying items.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PartOutcome {
    Matched { item_ids: Vec<i64> },
    Failed { reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct ConsultResponse {
    pub greeting: String,
    pub parts: HashMap<ClothingPart, PartOutcome>,
}

/// One indexed garment. `item_id` is the point id in the part's
/// collection; the metadata fields mirror the payload schema.
#[derive(Debug, Clone, PartialEq)]
pub struct GarmentRecord {
    pub item_id: i64,
    pub embedding: Vec<f32>,
    pub gender: i64,
    pub spring: i64,
    pub summer: i64,
    pub autumn: i64,
    pub winter: i64,
}
