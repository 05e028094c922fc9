use crate::Error;
use std::collections::HashMap;
use std::str::FromStr;

/// A parsed texture atlas: pages plus named regions packed into them.
#[derive(Clone, Debug, Default)]
pub struct Atlas {
    pub pages: Vec<AtlasPage>,
    pub regions: HashMap<String, AtlasRegion>,
}

impl Atlas {
    pub fn parse(input: &str) -> Result<Self, Error> {
        parse_atlas(input)
    }

    pub fn region(&self, name: &str) -> Option<&AtlasRegion> {
        self.regions.get(name)
    }

    pub fn page(&self, index: usize) -> Option<&AtlasPage> {
        self.pages.get(index)
    }

    /// Region together with the page it lives on.
    pub fn resolve(&self, name: &str) -> Option<(&AtlasRegion, &AtlasPage)> {
        let region = self.regions.get(name)?;
        let page = self.pages.get(region.page)?;
        Some((region, page))
    }
}

impl FromStr for Atlas {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_atlas(s)
    }
}

#[derive(Clone, Debug)]
pub struct AtlasPage {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub format: String,
    pub pma: bool,
    pub min_filter: AtlasFilter,
    pub mag_filter: AtlasFilter,
    pub wrap_u: AtlasWrap,
    pub wrap_v: AtlasWrap,
}

impl AtlasPage {
    fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            width: 0,
            height: 0,
            format: "RGBA8888".to_string(),
            pma: false,
            min_filter: AtlasFilter::default(),
            mag_filter: AtlasFilter::default(),
            wrap_u: AtlasWrap::default(),
            wrap_v: AtlasWrap::default(),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Default)]
pub enum AtlasFilter {
    Nearest,
    #[default]
    Linear,
    MipMap,
    MipMapNearestNearest,
    MipMapNearestLinear,
    MipMapLinearNearest,
    MipMapLinearLinear,
    Other(String),
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub enum AtlasWrap {
    #[default]
    ClampToEdge,
    Repeat,
}

/// A packed region. `width`/`height` are the unrotated packed size, `original_*` the size
/// before whitespace stripping.
#[derive(Clone, Debug, PartialEq)]
pub struct AtlasRegion {
    pub name: String,
    pub page: usize,
    pub degrees: u16,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub offset_x: i32,
    pub offset_y: i32,
    pub original_width: u32,
    pub original_height: u32,
    pub index: i32,
}

impl AtlasRegion {
    fn named(name: &str, page: usize) -> Self {
        Self {
            name: name.to_string(),
            page,
            degrees: 0,
            x: 0,
            y: 0,
            width: 0,
            height: 0,
            offset_x: 0,
            offset_y: 0,
            original_width: 0,
            original_height: 0,
            index: -1,
        }
    }

    pub fn rotated(&self) -> bool {
        self.degrees == 90
    }

    /// Normalized `[u, v, u2, v2]` of the packed rectangle on `page`.
    pub fn uv_bounds(&self, page: &AtlasPage) -> [f32; 4] {
        let w = page.width.max(1) as f32;
        let h = page.height.max(1) as f32;
        let (packed_w, packed_h) = if self.rotated() {
            (self.height, self.width)
        } else {
            (self.width, self.height)
        };
        [
            self.x as f32 / w,
            self.y as f32 / h,
            (self.x + packed_w) as f32 / w,
            (self.y + packed_h) as f32 / h,
        ]
    }

    fn finish(mut self) -> Self {
        if self.original_width == 0 {
            self.original_width = self.width;
        }
        if self.original_height == 0 {
            self.original_height = self.height;
        }
        self
    }
}

fn parse_atlas(input: &str) -> Result<Atlas, Error> {
    let mut atlas = Atlas::default();
    let mut region: Option<AtlasRegion> = None;
    // A blank line ends a page block once that page has produced at least one region.
    let mut page_open = false;
    let mut page_has_regions = false;

    let flush = |atlas: &mut Atlas, region: &mut Option<AtlasRegion>| -> bool {
        match region.take() {
            Some(r) => {
                let r = r.finish();
                atlas.regions.insert(r.name.clone(), r);
                true
            }
            None => false,
        }
    };

    for raw_line in input.lines() {
        let raw_line = raw_line.trim_end_matches('\r');
        let line = raw_line.trim();
        if line.is_empty() {
            page_has_regions |= flush(&mut atlas, &mut region);
            if page_has_regions {
                page_open = false;
            }
            continue;
        }

        if !page_open {
            atlas.pages.push(AtlasPage::named(line));
            page_open = true;
            page_has_regions = false;
            continue;
        }
        let page_index = atlas.pages.len() - 1;

        let indented = raw_line.starts_with(' ') || raw_line.starts_with('\t');
        if !indented && !line.contains(':') {
            page_has_regions |= flush(&mut atlas, &mut region);
            region = Some(AtlasRegion::named(line, page_index));
            continue;
        }

        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let (key, value) = (key.trim(), value.trim());

        match region.as_mut() {
            Some(region) => apply_region_field(region, key, value)?,
            None => apply_page_field(&mut atlas.pages[page_index], key, value)?,
        }
    }
    flush(&mut atlas, &mut region);

    if atlas.pages.is_empty() {
        return Err(Error::AtlasParse {
            message: "empty atlas".to_string(),
        });
    }
    Ok(atlas)
}

fn invalid(what: &str, value: &str) -> Error {
    Error::AtlasParse {
        message: format!("invalid {what}: {value}"),
    }
}

fn apply_page_field(page: &mut AtlasPage, key: &str, value: &str) -> Result<(), Error> {
    match key {
        "size" => {
            let [w, h] = parse_ints::<u32, 2>(value).ok_or_else(|| invalid("page size", value))?;
            page.width = w;
            page.height = h;
        }
        "format" => page.format = value.to_string(),
        "filter" => {
            let (min, mag) = match value.split_once(',') {
                Some((a, b)) => (parse_filter(a.trim()), parse_filter(b.trim())),
                None => (parse_filter(value), parse_filter(value)),
            };
            page.min_filter = min;
            page.mag_filter = mag;
        }
        "repeat" => (page.wrap_u, page.wrap_v) = parse_repeat(value),
        "pma" => page.pma = value == "true",
        _ => {}
    }
    Ok(())
}

fn apply_region_field(region: &mut AtlasRegion, key: &str, value: &str) -> Result<(), Error> {
    match key {
        "rotate" => region.degrees = parse_degrees(value),
        "xy" => {
            let [x, y] = parse_ints::<u32, 2>(value).ok_or_else(|| invalid("region xy", value))?;
            region.x = x;
            region.y = y;
        }
        "size" => {
            let [w, h] =
                parse_ints::<u32, 2>(value).ok_or_else(|| invalid("region size", value))?;
            region.width = w;
            region.height = h;
        }
        "bounds" => {
            let [x, y, w, h] =
                parse_ints::<u32, 4>(value).ok_or_else(|| invalid("region bounds", value))?;
            region.x = x;
            region.y = y;
            region.width = w;
            region.height = h;
        }
        "orig" => {
            let [w, h] =
                parse_ints::<u32, 2>(value).ok_or_else(|| invalid("region orig", value))?;
            region.original_width = w;
            region.original_height = h;
        }
        "offset" => {
            let [x, y] =
                parse_ints::<i32, 2>(value).ok_or_else(|| invalid("region offset", value))?;
            region.offset_x = x;
            region.offset_y = y;
        }
        "offsets" => {
            let [x, y, w, h] =
                parse_ints::<i32, 4>(value).ok_or_else(|| invalid("region offsets", value))?;
            region.offset_x = x;
            region.offset_y = y;
            region.original_width = w.max(0) as u32;
            region.original_height = h.max(0) as u32;
        }
        "index" => {
            region.index = value.parse().map_err(|_| invalid("region index", value))?;
        }
        _ => {}
    }
    Ok(())
}

fn parse_ints<T: FromStr + Copy + Default, const N: usize>(value: &str) -> Option<[T; N]> {
    let mut out = [T::default(); N];
    let mut parts = value.split(',');
    for slot in out.iter_mut() {
        *slot = parts.next()?.trim().parse().ok()?;
    }
    if parts.next().is_some() {
        return None;
    }
    Some(out)
}

fn parse_degrees(value: &str) -> u16 {
    match value {
        "true" => 90,
        "false" => 0,
        _ => value
            .parse::<i32>()
            .map(|raw| raw.rem_euclid(360) as u16)
            .unwrap_or(0),
    }
}

fn parse_filter(value: &str) -> AtlasFilter {
    match value {
        "Nearest" => AtlasFilter::Nearest,
        "Linear" => AtlasFilter::Linear,
        "MipMap" => AtlasFilter::MipMap,
        "MipMapNearestNearest" => AtlasFilter::MipMapNearestNearest,
        "MipMapNearestLinear" => AtlasFilter::MipMapNearestLinear,
        "MipMapLinearNearest" => AtlasFilter::MipMapLinearNearest,
        "MipMapLinearLinear" => AtlasFilter::MipMapLinearLinear,
        other => AtlasFilter::Other(other.to_string()),
    }
}

fn parse_repeat(value: &str) -> (AtlasWrap, AtlasWrap) {
    match value {
        "x" => (AtlasWrap::Repeat, AtlasWrap::ClampToEdge),
        "y" => (AtlasWrap::ClampToEdge, AtlasWrap::Repeat),
        "xy" => (AtlasWrap::Repeat, AtlasWrap::Repeat),
        _ => (AtlasWrap::ClampToEdge, AtlasWrap::ClampToEdge),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPINE38_ATLAS: &str = r#"
hero.png
size: 256,128
format: RGBA8888
filter: Linear,Linear
repeat: none
head
  rotate: false
  xy: 2, 2
  size: 60, 40
  orig: 64, 48
  offset: 1, 3
  index: -1
arm
  rotate: true
  xy: 64, 2
  size: 20, 50
  orig: 20, 50
  offset: 0, 0
  index: -1

hero2.png
size: 64,64
format: RGBA8888
filter: Nearest,Nearest
repeat: xy
glow
  rotate: false
  xy: 0, 0
  size: 8, 8
  orig: 8, 8
  offset: 0, 0
  index: 3
"#;

    #[test]
    fn parses_spine38_pages_and_regions() {
        let atlas = Atlas::from_str(SPINE38_ATLAS).unwrap();
        assert_eq!(atlas.pages.len(), 2);
        assert_eq!(atlas.pages[0].name, "hero.png");
        assert_eq!(atlas.pages[0].width, 256);
        assert_eq!(atlas.pages[0].height, 128);
        assert_eq!(atlas.pages[0].format, "RGBA8888");
        assert_eq!(atlas.pages[1].min_filter, AtlasFilter::Nearest);
        assert_eq!(atlas.pages[1].wrap_u, AtlasWrap::Repeat);
        assert_eq!(atlas.pages[1].wrap_v, AtlasWrap::Repeat);

        let head = atlas.region("head").unwrap();
        assert_eq!(head.page, 0);
        assert_eq!((head.x, head.y, head.width, head.height), (2, 2, 60, 40));
        assert_eq!((head.original_width, head.original_height), (64, 48));
        assert_eq!((head.offset_x, head.offset_y), (1, 3));

        let glow = atlas.region("glow").unwrap();
        assert_eq!(glow.page, 1);
        assert_eq!(glow.index, 3);
    }

    #[test]
    fn rotated_region_swaps_packed_extent() {
        let atlas = Atlas::from_str(SPINE38_ATLAS).unwrap();
        let (arm, page) = atlas.resolve("arm").unwrap();
        assert!(arm.rotated());
        let [u, v, u2, v2] = arm.uv_bounds(page);
        assert!((u - 64.0 / 256.0).abs() < 1.0e-6);
        assert!((v - 2.0 / 128.0).abs() < 1.0e-6);
        assert!((u2 - (64.0 + 50.0) / 256.0).abs() < 1.0e-6);
        assert!((v2 - (2.0 + 20.0) / 128.0).abs() < 1.0e-6);
    }

    #[test]
    fn accepts_compact_bounds_and_offsets_keys() {
        let atlas = Atlas::from_str(
            r#"
page.png
size: 64,64
pma: true

head
  bounds: 1, 2, 3, 4
  offsets: 5, 6, 7, 8
  rotate: 270
"#,
        )
        .unwrap();

        assert!(atlas.pages[0].pma);
        let region = atlas.region("head").unwrap();
        assert_eq!((region.x, region.y, region.width, region.height), (1, 2, 3, 4));
        assert_eq!((region.offset_x, region.offset_y), (5, 6));
        assert_eq!((region.original_width, region.original_height), (7, 8));
        assert_eq!(region.degrees, 270);
    }

    #[test]
    fn missing_orig_defaults_to_packed_size() {
        let atlas = Atlas::from_str("p.png\nsize: 8,8\nr\n  xy: 0, 0\n  size: 4, 2\n").unwrap();
        let region = atlas.region("r").unwrap();
        assert_eq!((region.original_width, region.original_height), (4, 2));
    }

    #[test]
    fn malformed_values_are_errors() {
        let err = Atlas::from_str("p.png\nsize: 8,8\nr\n  xy: 0\n").unwrap_err();
        assert!(matches!(err, Error::AtlasParse { .. }));
        assert!(Atlas::from_str("\n\n").is_err());
    }
}
