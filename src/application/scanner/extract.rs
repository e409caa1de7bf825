//! HTML image extraction.
//!
//! Walks a fetched page with `lol_html` and collects every renderable
//! image reference: `<img>` tags and inline `background-image` styles.
//! Relative sources are resolved against the page URL; duplicates within
//! a page collapse to the first occurrence.

use std::cell::RefCell;

use lol_html::{RewriteStrSettings, element, rewrite_str};
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedImage {
    /// Absolute image URL after resolution against the page.
    pub url: String,
    pub alt_text: Option<String>,
    pub is_decorative: bool,
    pub has_lazy_loading: bool,
    pub width: Option<i32>,
    pub height: Option<i32>,
    /// Lowercased extension when the URL path carries an image type.
    pub format: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("html rewrite failed: {0}")]
    Rewrite(String),
}

/// Extract all image references from one page.
pub fn extract_images(page_url: &Url, html: &str) -> Result<Vec<ExtractedImage>, ExtractError> {
    let collected: RefCell<Vec<ExtractedImage>> = RefCell::new(Vec::new());

    rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: vec![
                element!("img", |el| {
                    let src = el
                        .get_attribute("src")
                        .or_else(|| el.get_attribute("data-src"));
                    if let Some(src) = src
                        && let Some(url) = resolve(page_url, &src)
                    {
                        let alt = el.get_attribute("alt");
                        let width = dimension(el.get_attribute("width").as_deref());
                        let height = dimension(el.get_attribute("height").as_deref());
                        let decorative = is_decorative(
                            el.get_attribute("role").as_deref(),
                            el.get_attribute("aria-hidden").as_deref(),
                            alt.as_deref(),
                            el.get_attribute("class").as_deref(),
                            width,
                            height,
                        );
                        let lazy = el
                            .get_attribute("loading")
                            .is_some_and(|v| v.eq_ignore_ascii_case("lazy"))
                            || el.get_attribute("data-src").is_some();

                        collected.borrow_mut().push(ExtractedImage {
                            format: format_of(&url),
                            url: url.to_string(),
                            alt_text: alt.filter(|a| !a.trim().is_empty()),
                            is_decorative: decorative,
                            has_lazy_loading: lazy,
                            width,
                            height,
                        });
                    }
                    Ok(())
                }),
                element!("*[style]", |el| {
                    if let Some(style) = el.get_attribute("style") {
                        for raw in background_urls(&style) {
                            if let Some(url) = resolve(page_url, &raw) {
                                // CSS backgrounds cannot carry alt text.
                                collected.borrow_mut().push(ExtractedImage {
                                    format: format_of(&url),
                                    url: url.to_string(),
                                    alt_text: None,
                                    is_decorative: true,
                                    has_lazy_loading: false,
                                    width: None,
                                    height: None,
                                });
                            }
                        }
                    }
                    Ok(())
                }),
            ],
            ..RewriteStrSettings::new()
        },
    )
    .map_err(|e| ExtractError::Rewrite(e.to_string()))?;

    let mut images = collected.into_inner();
    dedupe_by_url(&mut images);
    Ok(images)
}

/// Pixels at or below this size are layout artifacts, not content.
const DECORATIVE_MAX_DIMENSION: i32 = 8;

/// Class tokens that conventionally mark non-content imagery.
const DECORATIVE_CLASS_MARKERS: [&str; 4] = ["decorative", "spacer", "divider", "ornament"];

/// An image is decorative when the author marked it so, via an explicitly
/// empty `alt=""`, `role="presentation"`, or `aria-hidden="true"`, or when
/// an unlabeled image carries a size or class signal: tiny declared
/// dimensions, or a marker class like `spacer`.
fn is_decorative(
    role: Option<&str>,
    aria_hidden: Option<&str>,
    alt: Option<&str>,
    class: Option<&str>,
    width: Option<i32>,
    height: Option<i32>,
) -> bool {
    if matches!(role, Some(r) if r.eq_ignore_ascii_case("presentation") || r.eq_ignore_ascii_case("none"))
    {
        return true;
    }
    if matches!(aria_hidden, Some(v) if v.eq_ignore_ascii_case("true")) {
        return true;
    }
    match alt {
        Some(a) if !a.trim().is_empty() => false,
        Some(_) => true,
        // Absent alt is ambiguous; only the weaker signals can settle it.
        None => {
            let tiny = matches!((width, height), (Some(w), Some(h))
                if w <= DECORATIVE_MAX_DIMENSION && h <= DECORATIVE_MAX_DIMENSION);
            tiny || class.is_some_and(|c| {
                c.split_ascii_whitespace().any(|token| {
                    DECORATIVE_CLASS_MARKERS
                        .iter()
                        .any(|marker| token.eq_ignore_ascii_case(marker))
                })
            })
        }
    }
}

fn resolve(page_url: &Url, raw: &str) -> Option<Url> {
    let raw = raw.trim();
    if raw.is_empty() || raw.starts_with("data:") || raw.starts_with('#') {
        return None;
    }
    let url = page_url.join(raw).ok()?;
    matches!(url.scheme(), "http" | "https").then_some(url)
}

fn dimension(raw: Option<&str>) -> Option<i32> {
    raw.and_then(|v| v.trim().trim_end_matches("px").parse::<i32>().ok())
        .filter(|v| *v > 0)
}

fn format_of(url: &Url) -> Option<String> {
    let ext = url.path().rsplit('.').next()?.to_ascii_lowercase();
    let mime = mime_guess::from_ext(&ext).first()?;
    (mime.type_() == mime_guess::mime::IMAGE).then_some(ext)
}

/// Pull `url(...)` sources out of an inline style's background declarations.
fn background_urls(style: &str) -> Vec<String> {
    let mut urls = Vec::new();
    for declaration in style.split(';') {
        let Some((property, value)) = declaration.split_once(':') else {
            continue;
        };
        let property = property.trim().to_ascii_lowercase();
        if property != "background" && property != "background-image" {
            continue;
        }
        let mut rest = value;
        while let Some(start) = rest.find("url(") {
            let tail = &rest[start + 4..];
            let Some(end) = tail.find(')') else { break };
            let inner = tail[..end].trim().trim_matches('"').trim_matches('\'');
            if !inner.is_empty() {
                urls.push(inner.to_string());
            }
            rest = &tail[end + 1..];
        }
    }
    urls
}

fn dedupe_by_url(images: &mut Vec<ExtractedImage>) {
    let mut seen = std::collections::HashSet::new();
    images.retain(|img| seen.insert(img.url.clone()));
}
