//! Catalog domain model
//!
//! The entity graph the harvester materializes:
//! groups → subgroups → diagrams → parts.

mod identifiers;
mod names;

pub use identifiers::{humanize_slug, image_base_name, normalize_identifier, safe_file_stem, slugify};
pub use names::{CatalogNameCleaner, NameNormalizer};

/// Top-level catalog section
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    pub id: String,
    pub name: String,
}

/// A subgroup scraped from one listing page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subgroup {
    pub id: String,
    pub name: String,
    pub group_id: String,
    /// Base path of the listing page; shared by every subgroup of a multi-section page
    pub path: String,
}

/// One illustrated assembly image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagram {
    pub id: String,
    pub group_id: String,
    pub subgroup_id: Option<String>,
    pub name: String,
    pub image_url: Option<String>,
    pub image_path: Option<String>,
    pub source_url: String,
}

/// A catalog line item as written by the ingestion layer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Part {
    pub detail_page_id: Option<String>,
    pub part_number: String,
    pub pnc: Option<String>,
    pub description: Option<String>,
    pub ref_number: Option<String>,
    pub quantity: Option<i64>,
    pub spec: Option<String>,
    pub notes: Option<String>,
    pub color: Option<String>,
    pub model_date_range: Option<String>,
    pub diagram_id: String,
    pub group_id: String,
    pub subgroup_id: Option<String>,
    pub replacement_part_number: Option<String>,
}

impl Part {
    /// Returns true for a replacement annotation row rather than a real part
    ///
    /// Such a row only says "this part number supersedes the previous line".
    pub fn is_annotation(&self) -> bool {
        self.pnc.is_none() && self.description.is_none() && self.ref_number.is_none()
    }
}

/// A stored part with its row id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartRecord {
    pub id: i64,
    pub part: Part,
}

/// One section of a listing page as produced by the parser
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub heading: String,
    pub slug: String,
    pub image_url: Option<String>,
    pub detail_page_ids: Vec<String>,
}

/// One part row of a detail page as produced by the parser
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedPart {
    pub part_number: String,
    pub pnc: Option<String>,
    pub description: Option<String>,
    pub ref_number: Option<String>,
    pub quantity: Option<i64>,
    pub spec: Option<String>,
    pub notes: Option<String>,
    pub color: Option<String>,
    pub model_date_range: Option<String>,
}

impl ParsedPart {
    /// Attaches the identifiers of the diagram and subgroup the row was found under
    pub fn into_part(
        self,
        detail_page_id: &str,
        diagram_id: &str,
        group_id: &str,
        subgroup_id: &str,
    ) -> Part {
        Part {
            detail_page_id: Some(detail_page_id.to_string()),
            part_number: self.part_number,
            pnc: self.pnc,
            description: self.description,
            ref_number: self.ref_number,
            quantity: self.quantity,
            spec: self.spec,
            notes: self.notes,
            color: self.color,
            model_date_range: self.model_date_range,
            diagram_id: diagram_id.to_string(),
            group_id: group_id.to_string(),
            subgroup_id: Some(subgroup_id.to_string()),
            replacement_part_number: None,
        }
    }
}
