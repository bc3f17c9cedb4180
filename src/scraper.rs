use crate::{Error, RawCapture, Result};
use chrono::{DateTime, Utc};
use reqwest::Url;
use scraper::{ElementRef, Html, Selector};
use sha2::{Digest, Sha256};
use tracing::{debug, instrument, warn};

/// Card selectors tried in order; the first one matching anything wins.
pub const DEFAULT_CARD_SELECTORS: [&str; 3] = [
    r#"article[data-testid="tweet"]"#,
    r#"div[data-testid="tweet"]"#,
    r#"[data-testid="cellInnerDiv"] article"#,
];

/// Prefix of ids made up for cards without a status link.
pub const GENERATED_ID_PREFIX: &str = "gen_";

/// The `PostScraper` struct extracts post cards from the HTML of a saved timeline or bookmarks page.
///
/// The page markup is not under our control; every field has a fallback and cards that carry
/// neither text nor media are dropped.
pub struct PostScraper {
    /// Selectors locating one card each, tried in order.
    card_selectors: Vec<Selector>,
    time: Option<Selector>,
    text: Option<Selector>,
    user_name: Option<Selector>,
    media: Option<Selector>,
}

impl Default for PostScraper {
    fn default() -> Self {
        Self::new(DEFAULT_CARD_SELECTORS)
    }
}

impl PostScraper {
    /// Creates a new `PostScraper` with the given card selectors.
    ///
    /// # Arguments
    ///
    /// * `card_selectors` - CSS selectors locating one post card each, tried in order. Invalid
    ///   selectors are skipped.
    ///
    /// # Returns
    ///
    /// A new instance of `PostScraper`.
    pub fn new(card_selectors: impl IntoIterator<Item = impl AsRef<str>>) -> Self {
        let card_selectors = card_selectors
            .into_iter()
            .filter_map(|s| Selector::parse(s.as_ref()).ok())
            .collect();

        Self {
            card_selectors,
            time: Selector::parse("time").ok(),
            text: Selector::parse(r#"div[data-testid="tweetText"]"#).ok(),
            user_name: Selector::parse(r#"div[data-testid="User-Name"]"#).ok(),
            media: Selector::parse(r#"img[alt="Image"]"#).ok(),
        }
    }

    /// Extracts every post card from `html`.
    ///
    /// # Arguments
    ///
    /// * `html` - The HTML of a saved timeline or bookmarks page.
    /// * `page_url` - The URL the page was saved from. It resolves relative status links and
    ///   stands in for cards without one.
    ///
    /// # Returns
    ///
    /// The scraped records in page order, duplicates included, or `Error::Extraction` when
    /// `page_url` is not a valid URL. A page without cards yields an empty list.
    #[instrument(skip(self, html), fields(html_length = html.len()))]
    pub fn extract(&self, html: &str, page_url: &str) -> Result<Vec<RawCapture>> {
        let base = Url::parse(page_url)
            .map_err(|e| Error::Extraction(format!("invalid page URL '{}': {}", page_url, e)))?;
        let document = Html::parse_document(html);

        for selector in &self.card_selectors {
            let cards: Vec<ElementRef> = document.select(selector).collect();
            if cards.is_empty() {
                continue;
            }
            debug!("Found {} cards", cards.len());

            let captures: Vec<RawCapture> = cards
                .into_iter()
                .filter_map(|card| self.extract_card(card, &base))
                .collect();

            debug!("Extracted {} posts", captures.len());
            return Ok(captures);
        }

        warn!("No post cards found on the page");
        Ok(Vec::new())
    }

    fn extract_card(&self, card: ElementRef, base: &Url) -> Option<RawCapture> {
        let time = first_match(card, &self.time);
        let status_url = time
            .and_then(enclosing_link)
            .and_then(|href| base.join(href).ok());

        let text = first_match(card, &self.text)
            .map(|el| el.text().collect::<String>().trim().to_string())
            .unwrap_or_default();

        let media: Vec<String> = self
            .media
            .iter()
            .flat_map(|selector| card.select(selector))
            .filter_map(|img| img.value().attr("src"))
            .map(str::to_string)
            .collect();

        if text.is_empty() && media.is_empty() {
            debug!("Skipping card without text or media");
            return None;
        }

        let (author, handle) = first_match(card, &self.user_name)
            .map(split_user_name)
            .unwrap_or_else(|| (String::from("Unknown"), String::new()));

        let id = status_url
            .as_ref()
            .and_then(|url| status_id(url.as_str()))
            .unwrap_or_else(|| generated_id(&author, &handle, &text));

        let created_at = time
            .and_then(|t| t.value().attr("datetime"))
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);

        Some(RawCapture {
            id,
            text,
            author,
            handle,
            created_at,
            media,
            url: status_url
                .map(String::from)
                .unwrap_or_else(|| base.to_string()),
        })
    }
}

fn first_match<'a>(card: ElementRef<'a>, selector: &Option<Selector>) -> Option<ElementRef<'a>> {
    selector.as_ref().and_then(|s| card.select(s).next())
}

/// `href` of the nearest `a` element around `element`.
fn enclosing_link(element: ElementRef<'_>) -> Option<&str> {
    element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(|el| el.value().name() == "a")
        .and_then(|a| a.value().attr("href"))
}

/// Display name and `@handle` (without the `@`) from a user-name block.
fn split_user_name(element: ElementRef<'_>) -> (String, String) {
    let parts: Vec<&str> = element
        .text()
        .map(str::trim)
        .filter(|s| !s.is_empty() && *s != "·")
        .collect();

    let author = parts
        .iter()
        .find(|s| !s.starts_with('@'))
        .map(|s| s.to_string())
        .unwrap_or_else(|| String::from("Unknown"));
    let handle = parts
        .iter()
        .find_map(|s| s.strip_prefix('@'))
        .unwrap_or_default()
        .to_string();

    (author, handle)
}

/// Path segment following `/status/`, e.g. `123` in `https://x.com/a/status/123/photo/1`.
fn status_id(url: &str) -> Option<String> {
    let (_, rest) = url.split_once("/status/")?;
    let id = rest.split(['/', '?', '#']).next()?;
    if id.is_empty() {
        None
    } else {
        Some(id.to_string())
    }
}

/// Stable id for a card without a status link, so rescraping it does not create duplicates.
fn generated_id(author: &str, handle: &str, text: &str) -> String {
    let input = format!("{}\x00{}\x00{}", author, handle, text);
    let digest = format!("{:x}", Sha256::digest(input.as_bytes()));
    format!("{}{}", GENERATED_ID_PREFIX, &digest[..12])
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = "https://x.com/i/bookmarks";

    fn card(id: &str, text: &str) -> String {
        format!(
            r#"<article data-testid="tweet">
                <div data-testid="User-Name"><span>Ada Lovelace</span><span>@ada</span><span>·</span></div>
                <a href="/ada/status/{id}"><time datetime="2024-05-01T12:00:00.000Z">May 1</time></a>
                <div data-testid="tweetText"><span>{text}</span></div>
            </article>"#
        )
    }

    #[test]
    fn test_extracts_card_fields() {
        let html = format!(
            r#"<html><body>{}<img alt="Image" src="https://pbs.twimg.com/media/x.jpg"></body></html>"#,
            card("1789", "Ship small things")
        );
        let posts = PostScraper::default().extract(&html, PAGE).unwrap();

        assert_eq!(posts.len(), 1);
        let post = &posts[0];
        assert_eq!(post.id, "1789");
        assert_eq!(post.text, "Ship small things");
        assert_eq!(post.author, "Ada Lovelace");
        assert_eq!(post.handle, "ada");
        assert_eq!(post.url, "https://x.com/ada/status/1789");
        assert_eq!(post.created_at.to_rfc3339(), "2024-05-01T12:00:00+00:00");
        assert!(post.media.is_empty());
    }

    #[test]
    fn test_media_only_card_is_kept() {
        let html = r#"
            <article data-testid="tweet">
                <a href="https://x.com/bob/status/42/photo/1"><time datetime="2024-01-01T00:00:00Z"></time></a>
                <img alt="Image" src="https://pbs.twimg.com/media/a.jpg">
                <img alt="Image" src="https://pbs.twimg.com/media/b.jpg">
            </article>
            <article data-testid="tweet"><div>ad slot</div></article>
        "#;
        let posts = PostScraper::default().extract(html, PAGE).unwrap();

        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].id, "42");
        assert_eq!(posts[0].author, "Unknown");
        assert_eq!(posts[0].media.len(), 2);
    }

    #[test]
    fn test_fallback_selector() {
        let html = r#"
            <div data-testid="cellInnerDiv"><article>
                <div data-testid="tweetText">From the fallback selector</div>
            </article></div>
        "#;
        let posts = PostScraper::default().extract(html, PAGE).unwrap();

        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].url, PAGE);
        assert!(posts[0].id.starts_with(GENERATED_ID_PREFIX));
    }

    #[test]
    fn test_generated_ids_are_stable() {
        let html = r#"<article data-testid="tweet"><div data-testid="tweetText">No link</div></article>"#;
        let scraper = PostScraper::default();
        let first = scraper.extract(html, PAGE).unwrap();
        let second = scraper.extract(html, PAGE).unwrap();
        assert_eq!(first[0].id, second[0].id);
        assert_eq!(first[0].id.len(), GENERATED_ID_PREFIX.len() + 12);
    }

    #[test]
    fn test_generated_id_is_digest_prefix() {
        assert_eq!(generated_id("Ada", "ada", "hello"), "gen_b3932c220bf5");
        assert_ne!(
            generated_id("Ada", "ada", "hello"),
            generated_id("Ada", "bob", "hello")
        );
    }

    #[test]
    fn test_empty_page_yields_nothing() {
        let posts = PostScraper::default()
            .extract("<html><body></body></html>", PAGE)
            .unwrap();
        assert!(posts.is_empty());
    }

    #[test]
    fn test_invalid_page_url() {
        let result = PostScraper::default().extract("<html></html>", "not a url");
        assert!(matches!(result, Err(Error::Extraction(_))));
    }

    #[test]
    fn test_status_id() {
        assert_eq!(status_id("https://x.com/a/status/123"), Some("123".to_string()));
        assert_eq!(status_id("https://x.com/a/status/123/photo/1"), Some("123".to_string()));
        assert_eq!(status_id("https://x.com/a/status/9?s=20"), Some("9".to_string()));
        assert_eq!(status_id("https://x.com/a"), None);
    }

    #[test]
    fn test_duplicate_cards_are_returned_as_scraped() {
        let html = format!("{}{}", card("7", "same"), card("7", "same"));
        let posts = PostScraper::default().extract(&html, PAGE).unwrap();
        assert_eq!(posts.len(), 2);
    }
}
