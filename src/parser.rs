//! Page scrapers built on `lol_html` selectors.
//!
//! Every function here is pure over the page body so the heuristics can be
//! exercised without a network. Handlers fire in document order, which is
//! what the "first match wins" rules below rely on.

use html_escape::decode_html_entities;
use lol_html::errors::RewritingError;
use lol_html::{element, text, HtmlRewriter, Settings};
use regex::Regex;
use std::cell::{Cell, RefCell};
use std::sync::LazyLock;
use url::Url;

#[allow(clippy::expect_used)]
static STORAGE_URL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"https://drive\.proton\.me/urls/[A-Z0-9]+#[A-Za-z0-9]+")
        .expect("storage URL regex is valid")
});

const DECORATIVE_IMAGE_HINTS: [&str; 3] = ["logo", "icon", "banner"];

/// Which rule picked the CAPTCHA image, highest priority first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptchaTier {
    AltText,
    SrcHint,
    InForm,
    FirstContent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptchaImage {
    pub tier: CaptchaTier,
    pub src: Option<String>,
}

#[derive(Debug, Clone, Default)]
struct ImgTag {
    alt: Option<String>,
    src: Option<String>,
}

/// Catalog listing: the first anchor of every `h4.vmname`, resolved
/// against `base`. Headings whose first anchor has no `href` are skipped.
pub fn parse_machine_links(html: &str, base: &Url) -> Result<Vec<String>, RewritingError> {
    let headings = Cell::new(0usize);
    let anchors: RefCell<Vec<(usize, Option<String>)>> = RefCell::new(Vec::new());

    let mut rewriter = HtmlRewriter::new(
        Settings {
            element_content_handlers: vec![
                element!("h4.vmname", |_el| {
                    headings.set(headings.get() + 1);
                    Ok(())
                }),
                element!("h4.vmname a", |el| {
                    let heading = headings.get();
                    let mut anchors = anchors.borrow_mut();
                    if anchors.last().map(|(index, _)| *index) != Some(heading) {
                        anchors.push((heading, decoded(el.get_attribute("href"))));
                    }
                    Ok(())
                }),
            ],
            ..Settings::new()
        },
        |_: &[u8]| {},
    );

    rewriter.write(html.as_bytes())?;
    rewriter.end()?;

    Ok(anchors
        .into_inner()
        .into_iter()
        .filter_map(|(_, href)| href)
        .map(|href| absolutize(base, &href))
        .collect())
}

/// Machine page: `href` of the first `a.download` inside the first
/// `div` whose class attribute is exactly `d-flex mt-4`.
pub fn parse_download_anchor(html: &str, page: &Url) -> Result<Option<String>, RewritingError> {
    let containers = Cell::new(0usize);
    let anchor: RefCell<Option<(usize, Option<String>)>> = RefCell::new(None);

    let mut rewriter = HtmlRewriter::new(
        Settings {
            element_content_handlers: vec![
                element!(r#"div[class="d-flex mt-4"]"#, |_el| {
                    containers.set(containers.get() + 1);
                    Ok(())
                }),
                element!(r#"div[class="d-flex mt-4"] a.download"#, |el| {
                    let mut anchor = anchor.borrow_mut();
                    if anchor.is_none() {
                        *anchor = Some((containers.get(), decoded(el.get_attribute("href"))));
                    }
                    Ok(())
                }),
            ],
            ..Settings::new()
        },
        |_: &[u8]| {},
    );

    rewriter.write(html.as_bytes())?;
    rewriter.end()?;

    Ok(match anchor.into_inner() {
        Some((1, Some(href))) => Some(absolutize(page, &href)),
        _ => None,
    })
}

/// Index page: trimmed text of every `span.vm-name` in `table#vm-table`.
/// `None` when the table itself is missing.
pub fn parse_machine_names(html: &str) -> Result<Option<Vec<String>>, RewritingError> {
    let table_found = Cell::new(false);
    let names: RefCell<Vec<String>> = RefCell::new(Vec::new());

    let mut rewriter = HtmlRewriter::new(
        Settings {
            element_content_handlers: vec![
                element!("table#vm-table", |_el| {
                    table_found.set(true);
                    Ok(())
                }),
                element!("table#vm-table span.vm-name", |_el| {
                    names.borrow_mut().push(String::new());
                    Ok(())
                }),
                text!("table#vm-table span.vm-name", |t| {
                    if let Some(name) = names.borrow_mut().last_mut() {
                        name.push_str(t.as_str());
                    }
                    Ok(())
                }),
            ],
            ..Settings::new()
        },
        |_: &[u8]| {},
    );

    rewriter.write(html.as_bytes())?;
    rewriter.end()?;

    if !table_found.get() {
        return Ok(None);
    }

    Ok(Some(
        names
            .into_inner()
            .into_iter()
            .map(|name| decode_html_entities(name.trim()).trim().to_string())
            .filter(|name| !name.is_empty())
            .collect(),
    ))
}

/// Locates the CAPTCHA image on a machine page. Tiers are tried in order:
/// alt text mentioning "captcha", src mentioning "captcha", first image
/// in the first form, first non-decorative image.
pub fn find_captcha_image(html: &str) -> Result<Option<CaptchaImage>, RewritingError> {
    let forms = Cell::new(0usize);
    let images: RefCell<Vec<ImgTag>> = RefCell::new(Vec::new());
    let form_images: RefCell<Vec<(usize, ImgTag)>> = RefCell::new(Vec::new());

    let mut rewriter = HtmlRewriter::new(
        Settings {
            element_content_handlers: vec![
                element!("img", |el| {
                    images.borrow_mut().push(ImgTag {
                        alt: decoded(el.get_attribute("alt")),
                        src: decoded(el.get_attribute("src")),
                    });
                    Ok(())
                }),
                element!("form", |_el| {
                    forms.set(forms.get() + 1);
                    Ok(())
                }),
                element!("form img", |el| {
                    form_images.borrow_mut().push((
                        forms.get(),
                        ImgTag {
                            alt: decoded(el.get_attribute("alt")),
                            src: decoded(el.get_attribute("src")),
                        },
                    ));
                    Ok(())
                }),
            ],
            ..Settings::new()
        },
        |_: &[u8]| {},
    );

    rewriter.write(html.as_bytes())?;
    rewriter.end()?;

    let images = images.into_inner();
    let form_images = form_images.into_inner();

    let mentions_captcha =
        |value: &Option<String>| value.as_deref().is_some_and(|v| v.to_lowercase().contains("captcha"));

    if let Some(img) = images.iter().find(|img| mentions_captcha(&img.alt)) {
        return Ok(Some(CaptchaImage {
            tier: CaptchaTier::AltText,
            src: img.src.clone(),
        }));
    }

    if let Some(img) = images.iter().find(|img| mentions_captcha(&img.src)) {
        return Ok(Some(CaptchaImage {
            tier: CaptchaTier::SrcHint,
            src: img.src.clone(),
        }));
    }

    // Only the first form on the page is considered.
    if let Some((_, img)) = form_images.first().filter(|(form, _)| *form == 1) {
        return Ok(Some(CaptchaImage {
            tier: CaptchaTier::InForm,
            src: img.src.clone(),
        }));
    }

    let content_image = images.iter().find(|img| match img.src.as_deref() {
        Some(src) if !src.is_empty() => {
            let src = src.to_lowercase();
            !DECORATIVE_IMAGE_HINTS.iter().any(|hint| src.contains(hint))
        }
        _ => false,
    });

    Ok(content_image.map(|img| CaptchaImage {
        tier: CaptchaTier::FirstContent,
        src: img.src.clone(),
    }))
}

/// Turns a CAPTCHA `src` into an absolute URL on `origin`
/// (scheme and host, no trailing slash).
pub fn normalize_image_src(src: &str, origin: &str) -> String {
    let origin = origin.trim_end_matches('/');
    if src.starts_with("../../") {
        format!("{origin}/{}", src.replace("../../", ""))
    } else if src.starts_with("../") {
        format!("{origin}/{}", src.replace("../", ""))
    } else if src.starts_with("//") {
        format!("https:{src}")
    } else if src.starts_with('/') {
        format!("{origin}{src}")
    } else if !src.starts_with("http") {
        format!("{origin}/{src}")
    } else {
        src.to_string()
    }
}

/// Finds a cloud-storage link in a response body: first among anchor
/// targets, then by pattern in the raw text.
pub fn find_storage_link(html: &str, markers: &[String]) -> Result<Option<String>, RewritingError> {
    let found: RefCell<Option<String>> = RefCell::new(None);

    let mut rewriter = HtmlRewriter::new(
        Settings {
            element_content_handlers: vec![element!("a[href]", |el| {
                let mut found = found.borrow_mut();
                if found.is_none()
                    && let Some(href) = decoded(el.get_attribute("href"))
                    && contains_any(&href, markers)
                {
                    *found = Some(href);
                }
                Ok(())
            })],
            ..Settings::new()
        },
        |_: &[u8]| {},
    );

    rewriter.write(html.as_bytes())?;
    rewriter.end()?;

    if let Some(href) = found.into_inner() {
        return Ok(Some(href));
    }

    if contains_any(html, markers) {
        return Ok(STORAGE_URL_PATTERN
            .find(html)
            .map(|found| found.as_str().to_string()));
    }

    Ok(None)
}

pub fn contains_any(haystack: &str, markers: &[String]) -> bool {
    markers.iter().any(|marker| haystack.contains(marker.as_str()))
}

// lol_html hands out attribute values and text chunks undecoded.
fn decoded(value: Option<String>) -> Option<String> {
    value.map(|value| decode_html_entities(&value).into_owned())
}

fn absolutize(base: &Url, href: &str) -> String {
    match base.join(href) {
        Ok(joined) => joined.to_string(),
        Err(_) => href.to_string(),
    }
}
