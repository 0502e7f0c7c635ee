//! URL handling module for Catalog-Harvest
//!
//! Catalog URLs decompose into a fixed root followed by path segments that
//! identify group, subgroup and detail page:
//!
//! ```text
//! <base-url><group>/<subgroup>/             listing page
//! <base-url><group>/<subgroup>/<detail>/    detail page
//! ```

use crate::config::CatalogConfig;
use crate::{UrlError, UrlResult};
use url::Url;

/// Segments below the catalog root on a subgroup listing page
pub const LISTING_SEGMENTS: usize = 2;

/// Segments below the catalog root on a detail page
pub const DETAIL_SEGMENTS: usize = 3;

/// The group/subgroup pair a listing page belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingPath {
    pub group: String,
    pub subgroup: String,
}

impl ListingPath {
    /// The page-level base path shared by every subgroup scraped from this page
    pub fn base_path(&self) -> String {
        format!("{}/{}", self.group, self.subgroup)
    }

    /// Subgroup slug with dashes as spaces, used when a page has no title
    pub fn fallback_title(&self) -> String {
        self.subgroup.replace('-', " ")
    }
}

/// Knows how catalog URLs are shaped for one configured catalog root
#[derive(Debug, Clone)]
pub struct CatalogLayout {
    base: Url,
    base_segments: usize,
    frame_number: Option<String>,
}

impl CatalogLayout {
    /// Creates a layout rooted at `base_url`
    ///
    /// # Examples
    ///
    /// ```
    /// use catalog_harvest::url::CatalogLayout;
    ///
    /// let layout = CatalogLayout::new("https://parts.example.com/van/pd6w/trim/", None).unwrap();
    /// assert!(layout.is_listing("https://parts.example.com/van/pd6w/trim/engine/engine-assy/"));
    /// assert!(!layout.is_listing("https://parts.example.com/van/pd6w/trim/engine/"));
    /// ```
    pub fn new(base_url: &str, frame_number: Option<String>) -> UrlResult<Self> {
        let base = Url::parse(base_url).map_err(|e| UrlError::Parse(e.to_string()))?;
        let base_segments = path_segments(&base).len();
        Ok(Self {
            base,
            base_segments,
            frame_number,
        })
    }

    /// Creates a layout from the `[catalog]` config section
    pub fn from_config(config: &CatalogConfig) -> UrlResult<Self> {
        Self::new(&config.base_url, config.frame_number.clone())
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Absolute path depth of a listing page URL
    pub fn listing_depth(&self) -> usize {
        self.base_segments + LISTING_SEGMENTS
    }

    /// Returns the path segments of `url` below the catalog root
    pub fn relative_segments(&self, url: &Url) -> UrlResult<Vec<String>> {
        if url.origin() != self.base.origin() || !url.path().starts_with(self.base.path()) {
            return Err(UrlError::OutsideCatalog(url.to_string()));
        }

        Ok(path_segments(url)
            .into_iter()
            .skip(self.base_segments)
            .collect())
    }

    /// Returns true if `url` is a subgroup listing page of this catalog
    pub fn is_listing(&self, url: &str) -> bool {
        Url::parse(url)
            .ok()
            .and_then(|u| self.relative_segments(&u).ok())
            .map(|segments| segments.len() == LISTING_SEGMENTS)
            .unwrap_or(false)
    }

    /// Decomposes a listing page URL into its group and subgroup slugs
    pub fn listing_path(&self, url: &Url) -> UrlResult<ListingPath> {
        let segments = self.relative_segments(url)?;
        match segments.as_slice() {
            [group, subgroup] => Ok(ListingPath {
                group: group.clone(),
                subgroup: subgroup.clone(),
            }),
            _ => Err(UrlError::Depth {
                url: url.to_string(),
                expected: self.listing_depth(),
                actual: self.base_segments + segments.len(),
            }),
        }
    }

    /// Builds the URL of a detail page under a listing page
    pub fn detail_url(&self, listing: &ListingPath, detail_id: &str) -> UrlResult<Url> {
        let mut url = self
            .base
            .join(&format!("{}/{}/", listing.base_path(), detail_id))
            .map_err(|e| UrlError::Parse(e.to_string()))?;

        if let Some(frame) = &self.frame_number {
            url.query_pairs_mut().append_pair("frame_no", frame);
        }
        Ok(url)
    }
}

/// Non-empty path segments of a URL
fn path_segments(url: &Url) -> Vec<String> {
    url.path_segments()
        .map(|segments| {
            segments
                .filter(|s| !s.is_empty())
                .map(|s| s.to_string())
                .collect()
        })
        .unwrap_or_default()
}

/// Guesses an image file extension from its URL, defaulting to `png`
pub fn image_extension(image_url: &str) -> String {
    Url::parse(image_url)
        .ok()
        .and_then(|u| {
            let last = path_segments(&u).pop()?;
            let (_, ext) = last.rsplit_once('.')?;
            let ext = ext.to_ascii_lowercase();
            (!ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphabetic())).then_some(ext)
        })
        .unwrap_or_else(|| "png".to_string())
}
