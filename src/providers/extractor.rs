use anyhow::Result;
use async_trait::async_trait;

#[async_trait]
pub trait ContentExtractor: Send + Sync {
    async fn extract(&self, url: &str) -> Result<String>;
}

/// Fetches a URL and reduces the body to plain text. Good enough for web
/// pages and tweet permalinks; PDF extraction is handled upstream.
pub struct HttpExtractor {
    client: reqwest::Client,
    max_length: usize,
}

impl HttpExtractor {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            max_length: 100_000,
        }
    }

    pub fn with_max_length(mut self, max_length: usize) -> Self {
        self.max_length = max_length;
        self
    }

    /// Clamp to `max_length` bytes without splitting a multibyte character;
    /// `String::truncate` panics on a non-boundary index.
    fn truncate_to_limit(&self, text: &mut String) {
        if text.len() > self.max_length {
            let mut end = self.max_length;
            while !text.is_char_boundary(end) {
                end -= 1;
            }
            text.truncate(end);
        }
    }

    fn strip_html(&self, body: &str) -> String {
        let no_scripts = regex::Regex::new(r"(?si)<(script|style)[^>]*>.*?</(script|style)>")
            .expect("valid regex")
            .replace_all(body, " ");
        let no_tags = regex::Regex::new(r"<[^>]+>")
            .expect("valid regex")
            .replace_all(&no_scripts, " ");
        let decoded = html_escape::decode_html_entities(&no_tags);
        let collapsed = regex::Regex::new(r"\s+")
            .expect("valid regex")
            .replace_all(&decoded, " ");
        collapsed.trim().to_string()
    }
}

impl Default for HttpExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContentExtractor for HttpExtractor {
    async fn extract(&self, url: &str) -> Result<String> {
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            anyhow::bail!("fetch failed for {}: HTTP {}", url, response.status());
        }

        let body = response.text().await?;
        let mut text = self.strip_html(&body);

        if text.is_empty() {
            anyhow::bail!("no textual content extracted from {}", url);
        }

        self.truncate_to_limit(&mut text);
        Ok(text)
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_html_removes_tags_and_scripts() {
        let extractor = HttpExtractor::new();
        let html = "<html><head><script>var x = 1;</script></head>\
                    <body><h1>Title</h1><p>Hello &amp; welcome</p></body></html>";
        let text = extractor.strip_html(html);

        assert!(text.contains("Title"));
        assert!(text.contains("Hello & welcome"));
        assert!(!text.contains("var x"));
        assert!(!text.contains('<'));
    }

    #[test]
    fn test_truncation_respects_char_boundaries() {
        let extractor = HttpExtractor::new().with_max_length(3);

        // Two-byte characters straddle the 3-byte limit; the cut must land
        // on the previous boundary instead of panicking.
        let mut accented = "ééé".to_string();
        extractor.truncate_to_limit(&mut accented);
        assert_eq!(accented, "é");

        let mut ascii = "abcdef".to_string();
        extractor.truncate_to_limit(&mut ascii);
        assert_eq!(ascii, "abc");

        let mut short = "ab".to_string();
        extractor.truncate_to_limit(&mut short);
        assert_eq!(short, "ab");
    }

    #[tokio::test]
    async fn test_mock_extractor_unknown_url_fails() {
        let extractor = mock::MockExtractor::new().with_page("http://a", "content");

        assert_eq!(extractor.extract("http://a").await.unwrap(), "content");
        assert!(extractor.extract("http://b").await.is_err());
    }
}
