use crate::RasterError;
use spinevid::AtlasPage;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_PAGE_SET_ID: AtomicU64 = AtomicU64::new(1);

/// A decoded atlas page, straight RGBA8 rows.
#[derive(Clone, Debug)]
pub struct PageImage {
    pub page: AtlasPage,
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl PageImage {
    pub fn load(path: &Path, page: &AtlasPage) -> Result<Self, RasterError> {
        let bytes = std::fs::read(path).map_err(|source| RasterError::PageRead {
            path: path.to_path_buf(),
            source,
        })?;
        let decoded = image::load_from_memory(&bytes)
            .map_err(|source| RasterError::PageDecode {
                path: path.to_path_buf(),
                source,
            })?
            .to_rgba8();
        let (width, height) = decoded.dimensions();
        Ok(Self {
            page: page.clone(),
            width,
            height,
            pixels: decoded.into_raw(),
        })
    }

    /// One transparent texel standing in for a page whose image could not be loaded.
    pub fn blank(page: &AtlasPage) -> Self {
        Self {
            page: page.clone(),
            width: 1,
            height: 1,
            pixels: vec![0; 4],
        }
    }
}

/// The texture pages one scene draws from, indexed by `Draw::texture_page`.
///
/// Every set gets a process-unique id so rasterizers can tell whether their uploaded
/// textures are still current.
#[derive(Debug)]
pub struct PageSet {
    id: u64,
    pages: Vec<PageImage>,
}

impl PageSet {
    pub fn new(pages: Vec<PageImage>) -> Self {
        Self {
            id: NEXT_PAGE_SET_ID.fetch_add(1, Ordering::Relaxed),
            pages,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn pages(&self) -> &[PageImage] {
        &self.pages
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}
