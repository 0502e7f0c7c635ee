//! HTML parser for catalog pages
//!
//! This module turns raw listing and detail pages into the records the
//! ingestion layer consumes:
//! - Listing page sections (heading, diagram image, detail page ids)
//! - Detail page part rows
//! - Page title

use crate::catalog::{slugify, ParsedPart, Section};
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use url::Url;

/// Extracts catalog records from fetched pages
pub trait CatalogParser: Send + Sync {
    /// Splits a listing page into its sections
    ///
    /// Sections that link to no detail page are dropped.
    fn parse_sections(&self, html: &str, page_url: &Url) -> Vec<Section>;

    /// Extracts the part rows of a detail page
    fn parse_parts(&self, html: &str) -> Vec<ParsedPart>;

    /// Returns the page's display title, if it has one
    fn extract_page_title(&self, html: &str) -> Option<String>;
}

/// Default parser for the catalog's table-based markup
///
/// # Listing pages
///
/// Every `td.detail-list` cell is one section. Its heading comes from the
/// first `h2`, `h3` or `.detail-list-title` (falling back to the image alt
/// text), its diagram from the first `img[src]`, and its detail page ids
/// from links one path level below the listing page. A link such as
/// `123,124/` names two detail pages.
///
/// # Detail pages
///
/// Rows of `table.parts` with `td` cells in the order: ref number, part
/// number, PNC, description, quantity, spec, notes, color, model date range.
///
/// # Example
///
/// ```
/// use catalog_harvest::crawler::{CatalogParser, HtmlCatalogParser};
/// use url::Url;
///
/// let html = r#"<table><tr><td class="detail-list">
///     <h3>Cylinder Head</h3>
///     <img src="/img/head.png">
///     <a href="12159/">Gasket</a>
/// </td></tr></table>"#;
/// let url = Url::parse("https://parts.example.com/cat/engine/assy/").unwrap();
/// let sections = HtmlCatalogParser.parse_sections(html, &url);
/// assert_eq!(sections[0].slug, "cylinder-head");
/// assert_eq!(sections[0].detail_page_ids, vec!["12159"]);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlCatalogParser;

impl CatalogParser for HtmlCatalogParser {
    fn parse_sections(&self, html: &str, page_url: &Url) -> Vec<Section> {
        let document = Html::parse_document(html);
        let (Some(cells), Some(headings), Some(images), Some(links)) = (
            selector("td.detail-list"),
            selector("h2, h3, .detail-list-title"),
            selector("img[src]"),
            selector("a[href]"),
        ) else {
            return Vec::new();
        };

        let base = directory_url(page_url);
        let mut sections = Vec::new();

        for (index, cell) in document.select(&cells).enumerate() {
            let image = cell.select(&images).next();

            let heading = cell
                .select(&headings)
                .map(element_text)
                .find(|t| !t.is_empty())
                .or_else(|| {
                    image
                        .and_then(|img| img.value().attr("alt"))
                        .map(collapse_whitespace)
                        .filter(|t| !t.is_empty())
                })
                .unwrap_or_else(|| format!("Section {}", index + 1));

            let image_url = image
                .and_then(|img| img.value().attr("src"))
                .and_then(|src| base.join(src.trim()).ok())
                .map(|u| u.to_string());

            let mut seen = HashSet::new();
            let detail_page_ids: Vec<String> = cell
                .select(&links)
                .filter_map(|a| a.value().attr("href"))
                .filter_map(|href| detail_segment(&base, href))
                .flat_map(|segment| {
                    segment
                        .split(',')
                        .map(|id| id.trim().to_string())
                        .filter(|id| !id.is_empty())
                        .collect::<Vec<_>>()
                })
                .filter(|id| seen.insert(id.clone()))
                .collect();

            if detail_page_ids.is_empty() {
                tracing::debug!("Dropping section '{}' with no detail pages", heading);
                continue;
            }

            let mut slug = slugify(&heading);
            if slug.is_empty() {
                slug = format!("section-{}", index + 1);
            }

            sections.push(Section {
                heading,
                slug,
                image_url,
                detail_page_ids,
            });
        }

        sections
    }

    fn parse_parts(&self, html: &str) -> Vec<ParsedPart> {
        let document = Html::parse_document(html);
        let (Some(rows), Some(cells)) = (selector("table.parts tr"), selector("td")) else {
            return Vec::new();
        };

        document
            .select(&rows)
            .filter_map(|row| {
                let values: Vec<Option<String>> = row
                    .select(&cells)
                    .map(|cell| Some(element_text(cell)).filter(|t| !t.is_empty()))
                    .collect();
                let field = |i: usize| values.get(i).cloned().flatten();

                let part_number = field(1)?;
                Some(ParsedPart {
                    ref_number: field(0),
                    part_number,
                    pnc: field(2),
                    description: field(3),
                    quantity: field(4).and_then(|q| q.parse().ok()),
                    spec: field(5),
                    notes: field(6),
                    color: field(7),
                    model_date_range: field(8),
                })
            })
            .collect()
    }

    fn extract_page_title(&self, html: &str) -> Option<String> {
        let document = Html::parse_document(html);
        ["h1", "title"]
            .iter()
            .filter_map(|css| selector(css))
            .find_map(|sel| {
                document
                    .select(&sel)
                    .map(element_text)
                    .find(|t| !t.is_empty())
            })
    }
}

fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

fn element_text(element: ElementRef<'_>) -> String {
    collapse_whitespace(&element.text().collect::<String>())
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// The page URL with a trailing slash so relative links resolve below it
fn directory_url(page_url: &Url) -> Url {
    let mut base = page_url.clone();
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base.set_query(None);
    base.set_fragment(None);
    base
}

/// Returns the final path segment of `href` if it sits one level below `base`
fn detail_segment(base: &Url, href: &str) -> Option<String> {
    let link = base.join(href.trim()).ok()?;
    if link.origin() != base.origin() {
        return None;
    }

    let base_segments: Vec<&str> = base.path_segments()?.filter(|s| !s.is_empty()).collect();
    let link_segments: Vec<&str> = link.path_segments()?.filter(|s| !s.is_empty()).collect();

    if link_segments.len() != base_segments.len() + 1 || !link_segments.starts_with(&base_segments) {
        return None;
    }
    link_segments.last().map(|s| s.to_string())
}
