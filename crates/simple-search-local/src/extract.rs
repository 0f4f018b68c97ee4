//! Search-result extraction from a result page.
//!
//! Two paths:
//! - primary: a structural scan ([`ResultScanner`]) driven by markup events
//!   ([`MarkupSink`]) that [`walk_markup`] replays from an html5ever parse.
//! - fallback: a regex over the raw markup for result-link anchors, used only when the
//!   primary path finds nothing.
//!
//! Neither path fails: malformed markup degrades to fewer (or zero) results.

use regex::Regex;
use simple_search_core::SearchResult;
use std::panic::AssertUnwindSafe;
use std::sync::OnceLock;

/// Snippet attached to fallback matches (the fallback pattern does not capture one).
pub const FALLBACK_SNIPPET: &str = "Search result from DuckDuckGo";

pub const DEFAULT_ORIGIN: &str = "https://duckduckgo.com";

#[derive(Debug, Clone)]
pub struct ExtractConfig {
    /// Prefix for root-relative hrefs (`/l/?uddg=...`).
    pub origin: String,
    /// Maximum number of fallback matches.
    pub fallback_limit: usize,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            origin: DEFAULT_ORIGIN.to_string(),
            fallback_limit: 5,
        }
    }
}

/// Event capability the structural scan runs over.
pub trait MarkupSink {
    fn enter_element(&mut self, tag: &str, attrs: &[(&str, &str)]);
    fn text(&mut self, data: &str);
    fn exit_element(&mut self, tag: &str);
}

/// Parse `html` (error tolerant) and replay it as balanced enter/text/exit events.
///
/// Iterative, so deeply nested markup cannot exhaust the stack.
pub fn walk_markup<S: MarkupSink + ?Sized>(html: &str, sink: &mut S) {
    let doc = html_scraper::Html::parse_document(html);
    let root = doc.root_element();

    fn open<S: MarkupSink + ?Sized>(el: html_scraper::ElementRef<'_>, sink: &mut S) {
        let v = el.value();
        let attrs: Vec<(&str, &str)> = v.attrs().collect();
        sink.enter_element(v.name(), &attrs);
    }

    open(root, sink);
    let mut stack = vec![(root, root.children())];
    loop {
        let Some(frame) = stack.last_mut() else {
            break;
        };
        let current = frame.0;
        match frame.1.next() {
            Some(child) => {
                if let Some(child_el) = html_scraper::ElementRef::wrap(child) {
                    open(child_el, sink);
                    stack.push((child_el, child_el.children()));
                } else if let Some(text) = child.value().as_text() {
                    sink.text(text);
                }
            }
            None => {
                stack.pop();
                sink.exit_element(current.value().name());
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    OutsideResult,
    InResult,
    InTitle,
    InSnippet,
}

#[derive(Debug, Default)]
struct Candidate {
    url: Option<String>,
    title: String,
    snippet: String,
}

/// Structural result scanner.
///
/// A result container opens a candidate; the first anchor with an href inside it gives
/// `url` and (through its text) `title`; an element with a snippet class gives `snippet`.
/// The candidate is kept when the container closes with both `title` and `url` set.
#[derive(Debug)]
pub struct ResultScanner {
    origin: String,
    state: ScanState,
    depth: usize,
    result_depth: usize,
    inner_depth: usize,
    candidate: Candidate,
    results: Vec<SearchResult>,
}

impl ResultScanner {
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            state: ScanState::OutsideResult,
            depth: 0,
            result_depth: 0,
            inner_depth: 0,
            candidate: Candidate::default(),
            results: Vec::new(),
        }
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    pub fn into_results(self) -> Vec<SearchResult> {
        self.results
    }

    fn finish_candidate(&mut self) {
        let c = std::mem::take(&mut self.candidate);
        self.state = ScanState::OutsideResult;
        let title = collapse_whitespace(&c.title);
        match c.url {
            Some(url) if !url.is_empty() && !title.is_empty() => {
                self.results.push(SearchResult {
                    title,
                    url,
                    snippet: collapse_whitespace(&c.snippet),
                });
            }
            _ => tracing::trace!("discarding result candidate without title or url"),
        }
    }
}

impl MarkupSink for ResultScanner {
    fn enter_element(&mut self, tag: &str, attrs: &[(&str, &str)]) {
        self.depth += 1;
        match self.state {
            ScanState::OutsideResult => {
                if is_result_container(attrs) {
                    self.state = ScanState::InResult;
                    self.result_depth = self.depth;
                    self.candidate = Candidate::default();
                }
            }
            ScanState::InResult => {
                let title_anchor =
                    tag.eq_ignore_ascii_case("a") && self.candidate.url.is_none();
                let href = attr(attrs, "href")
                    .map(str::trim)
                    .filter(|h| !h.is_empty());
                match href {
                    Some(href) if title_anchor => {
                        self.candidate.url = Some(normalize_href(href, &self.origin));
                        self.state = ScanState::InTitle;
                        self.inner_depth = self.depth;
                    }
                    _ if is_snippet(attrs) => {
                        self.state = ScanState::InSnippet;
                        self.inner_depth = self.depth;
                    }
                    _ => {}
                }
            }
            ScanState::InTitle | ScanState::InSnippet => {}
        }
    }

    fn text(&mut self, data: &str) {
        match self.state {
            ScanState::InTitle => self.candidate.title.push_str(data),
            ScanState::InSnippet => self.candidate.snippet.push_str(data),
            ScanState::OutsideResult | ScanState::InResult => {}
        }
    }

    fn exit_element(&mut self, _tag: &str) {
        if self.state != ScanState::OutsideResult && self.depth == self.result_depth {
            self.finish_candidate();
        } else if matches!(self.state, ScanState::InTitle | ScanState::InSnippet)
            && self.depth == self.inner_depth
        {
            self.state = ScanState::InResult;
        }
        self.depth = self.depth.saturating_sub(1);
    }
}

fn attr<'a>(attrs: &[(&str, &'a str)], name: &str) -> Option<&'a str> {
    attrs
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| *v)
}

fn class_tokens<'a>(attrs: &[(&str, &'a str)]) -> impl Iterator<Item = &'a str> {
    attr(attrs, "class")
        .unwrap_or("")
        .split_ascii_whitespace()
}

fn is_result_container(attrs: &[(&str, &str)]) -> bool {
    class_tokens(attrs).any(|c| c == "result" || c == "web-result")
}

fn is_snippet(attrs: &[(&str, &str)]) -> bool {
    class_tokens(attrs).any(|c| c.contains("snippet"))
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Make result hrefs absolute: `//host/x` takes the origin's scheme, `/x` is prefixed
/// with the origin. Anything else is returned as-is.
pub fn normalize_href(href: &str, origin: &str) -> String {
    let href = href.trim();
    let origin = origin.trim_end_matches('/');
    if let Some(rest) = href.strip_prefix("//") {
        let scheme = origin.split_once("://").map(|(s, _)| s).unwrap_or("https");
        return format!("{scheme}://{rest}");
    }
    if href.starts_with('/') {
        return format!("{origin}{href}");
    }
    href.to_string()
}

/// Decode the handful of entities that show up in raw attribute values and link text.
fn decode_basic_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    s.replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

fn result_link_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"<a[^>]*class="result__a"[^>]*href="([^"]*)"[^>]*>([^<]*)</a>"#).ok()
    })
    .as_ref()
}

/// Structural extraction only.
pub fn extract_primary(html: &str, origin: &str) -> Vec<SearchResult> {
    let mut scanner = ResultScanner::new(origin);
    walk_markup(html, &mut scanner);
    scanner.into_results()
}

/// Regex extraction of `result__a` anchors, in document order, at most `fallback_limit`.
pub fn extract_fallback(html: &str, config: &ExtractConfig) -> Vec<SearchResult> {
    let Some(re) = result_link_re() else {
        return Vec::new();
    };
    re.captures_iter(html)
        .filter_map(|caps| {
            let href = decode_basic_entities(caps.get(1)?.as_str().trim());
            let title = collapse_whitespace(&decode_basic_entities(caps.get(2)?.as_str()));
            if href.is_empty() || title.is_empty() {
                return None;
            }
            Some(SearchResult {
                title,
                url: normalize_href(&href, &config.origin),
                snippet: FALLBACK_SNIPPET.to_string(),
            })
        })
        .take(config.fallback_limit)
        .collect()
}

/// Primary extraction, falling back to the regex path iff it found nothing.
///
/// Never panics: a panic inside either path yields an empty sequence.
pub fn extract_results(html: &str, config: &ExtractConfig) -> Vec<SearchResult> {
    let run = || {
        let primary = extract_primary(html, &config.origin);
        if !primary.is_empty() {
            return primary;
        }
        let fallback = extract_fallback(html, config);
        tracing::info!(
            matches = fallback.len(),
            "structural extraction found no results; used link fallback"
        );
        fallback
    };
    match std::panic::catch_unwind(AssertUnwindSafe(run)) {
        Ok(results) => results,
        Err(_) => {
            tracing::warn!("result extraction panicked; returning no results");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const DDG_PAGE: &str = r#"<!DOCTYPE html>
<html><head><title>rust at DuckDuckGo</title></head>
<body>
  <div id="links" class="results">
    <div class="result results_links results_links_deep web-result">
      <div class="links_main links_deep result__body">
        <h2 class="result__title">
          <a rel="nofollow" class="result__a" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fwww.rust-lang.org%2F&amp;rut=abc">Rust Programming Language</a>
        </h2>
        <div class="result__extras"><a class="result__url" href="//duckduckgo.com/l/?uddg=x">www.rust-lang.org</a></div>
        <a class="result__snippet" href="//duckduckgo.com/l/?uddg=x">A language empowering everyone to build <b>reliable</b> and efficient software.</a>
      </div>
    </div>
    <div class="result results_links results_links_deep web-result">
      <div class="links_main links_deep result__body">
        <h2 class="result__title">
          <a rel="nofollow" class="result__a" href="https://doc.rust-lang.org/book/">The <b>Rust</b> Programming Language - The Rust Book</a>
        </h2>
        <a class="result__snippet" href="https://doc.rust-lang.org/book/">by Steve Klabnik and Carol Nichols</a>
      </div>
    </div>
  </div>
</body></html>"#;

    #[derive(Default)]
    struct Recorder {
        events: Vec<String>,
    }

    impl MarkupSink for Recorder {
        fn enter_element(&mut self, tag: &str, _attrs: &[(&str, &str)]) {
            self.events.push(format!("+{tag}"));
        }
        fn text(&mut self, data: &str) {
            if !data.trim().is_empty() {
                self.events.push(format!("'{}", data.trim()));
            }
        }
        fn exit_element(&mut self, tag: &str) {
            self.events.push(format!("-{tag}"));
        }
    }

    #[test]
    fn walk_markup_emits_balanced_events_in_document_order() {
        let mut r = Recorder::default();
        walk_markup(
            "<html><body><div class=x>hi<b>there</b></div></body></html>",
            &mut r,
        );
        assert_eq!(
            r.events,
            vec![
                "+html", "+head", "-head", "+body", "+div", "'hi", "+b", "'there", "-b", "-div",
                "-body", "-html"
            ]
        );
    }

    #[test]
    fn single_result_with_sibling_snippet() {
        let html = r#"<div class="result"><a href="https://example.com">Example</a><div class="snippet">desc</div></div>"#;
        let got = extract_results(html, &ExtractConfig::default());
        assert_eq!(
            got,
            vec![SearchResult {
                title: "Example".to_string(),
                url: "https://example.com".to_string(),
                snippet: "desc".to_string(),
            }]
        );
    }

    #[test]
    fn ddg_page_yields_results_in_document_order() {
        let got = extract_primary(DDG_PAGE, DEFAULT_ORIGIN);
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].title, "Rust Programming Language");
        assert_eq!(
            got[0].url,
            "https://duckduckgo.com/l/?uddg=https%3A%2F%2Fwww.rust-lang.org%2F&rut=abc"
        );
        assert_eq!(
            got[0].snippet,
            "A language empowering everyone to build reliable and efficient software."
        );
        assert_eq!(
            got[1].title,
            "The Rust Programming Language - The Rust Book"
        );
        assert_eq!(got[1].url, "https://doc.rust-lang.org/book/");
        assert_eq!(got[1].snippet, "by Steve Klabnik and Carol Nichols");
    }

    #[test]
    fn wrapping_results_list_is_not_a_result_container() {
        // The outer `class="results"` must not swallow both results into one candidate.
        let got = extract_primary(DDG_PAGE, DEFAULT_ORIGIN);
        assert_eq!(got.len(), 2);
    }

    #[test]
    fn candidates_without_title_or_url_are_discarded() {
        let html = r#"
          <div class="result"><div class="snippet">no link at all</div></div>
          <div class="result"><a href="https://empty.example">   </a></div>
          <div class="result"><a>no href</a></div>
          <div class="result"><a href="https://ok.example">Kept</a></div>
        "#;
        let got = extract_primary(html, DEFAULT_ORIGIN);
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].title, "Kept");
        assert_eq!(got[0].snippet, "");
    }

    #[test]
    fn only_first_anchor_sets_url_and_title() {
        let html = r#"<div class="result">
            <a href="https://first.example">First</a>
            <a href="https://second.example">Second</a>
        </div>"#;
        let got = extract_primary(html, DEFAULT_ORIGIN);
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].url, "https://first.example");
        assert_eq!(got[0].title, "First");
    }

    #[test]
    fn scanner_states_follow_the_markup() {
        let mut s = ResultScanner::new(DEFAULT_ORIGIN);
        assert_eq!(s.state(), ScanState::OutsideResult);
        s.enter_element("div", &[("class", "result")]);
        assert_eq!(s.state(), ScanState::InResult);
        s.enter_element("a", &[("href", "/x")]);
        assert_eq!(s.state(), ScanState::InTitle);
        s.text(" Title ");
        s.exit_element("a");
        assert_eq!(s.state(), ScanState::InResult);
        s.enter_element("div", &[("class", "result__snippet")]);
        assert_eq!(s.state(), ScanState::InSnippet);
        s.text("snip");
        s.exit_element("div");
        assert_eq!(s.state(), ScanState::InResult);
        s.exit_element("div");
        assert_eq!(s.state(), ScanState::OutsideResult);
        let results = s.into_results();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].url, "https://duckduckgo.com/x");
        assert_eq!(results[0].title, "Title");
        assert_eq!(results[0].snippet, "snip");
    }

    #[test]
    fn fallback_runs_only_when_primary_is_empty() {
        // Primary path finds the container; the fallback anchors must not be appended.
        let html = r#"
          <div class="result"><a href="https://primary.example">Primary</a></div>
          <a class="result__a" href="https://fallback.example">Fallback</a>
        "#;
        let got = extract_results(html, &ExtractConfig::default());
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].url, "https://primary.example");

        let html = r#"<p><a rel="nofollow" class="result__a" href="https://fallback.example">Fallback</a></p>"#;
        let got = extract_results(html, &ExtractConfig::default());
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].title, "Fallback");
        assert_eq!(got[0].snippet, FALLBACK_SNIPPET);
    }

    #[test]
    fn fallback_rewrites_relative_hrefs_with_origin() {
        let html = r#"<a class="result__a" href="/l/?uddg=https%3A%2F%2Fexample.com">Example</a>"#;
        let got = extract_fallback(html, &ExtractConfig::default());
        assert_eq!(got.len(), 1);
        assert_eq!(
            got[0].url,
            "https://duckduckgo.com/l/?uddg=https%3A%2F%2Fexample.com"
        );
    }

    #[test]
    fn fallback_is_capped() {
        let html: String = (0..12)
            .map(|i| format!(r#"<a class="result__a" href="https://e.example/{i}">R{i}</a>"#))
            .collect();
        let got = extract_fallback(&html, &ExtractConfig::default());
        assert_eq!(got.len(), 5);
        assert_eq!(got[0].title, "R0");
        assert_eq!(got[4].title, "R4");

        let cfg = ExtractConfig {
            fallback_limit: 2,
            ..Default::default()
        };
        assert_eq!(extract_fallback(&html, &cfg).len(), 2);
    }

    #[test]
    fn normalize_href_handles_scheme_relative_and_root_relative() {
        assert_eq!(
            normalize_href("//duckduckgo.com/l/?uddg=x", DEFAULT_ORIGIN),
            "https://duckduckgo.com/l/?uddg=x"
        );
        assert_eq!(
            normalize_href("/l/?uddg=x", "http://127.0.0.1:9/"),
            "http://127.0.0.1:9/l/?uddg=x"
        );
        assert_eq!(
            normalize_href("https://example.com/a", DEFAULT_ORIGIN),
            "https://example.com/a"
        );
    }

    #[test]
    fn malformed_markup_degrades_to_empty() {
        for html in ["", "<<<>>>", "<div class=\"result\"><a href=", "\u{0}\u{1}<a"] {
            assert!(extract_results(html, &ExtractConfig::default()).is_empty());
        }
    }

    #[test]
    fn unclosed_result_container_is_still_finalized() {
        // html5ever closes the open elements at end of input.
        let html = r#"<div class="result"><a href="https://x.example">Unclosed"#;
        let got = extract_primary(html, DEFAULT_ORIGIN);
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].title, "Unclosed");
    }

    proptest! {
        #[test]
        fn extraction_never_panics_and_keeps_invariants(s in ".{0,400}") {
            let got = extract_results(&s, &ExtractConfig::default());
            for r in &got {
                prop_assert!(!r.title.is_empty());
                prop_assert!(!r.url.is_empty());
            }
        }

        #[test]
        fn fallback_never_exceeds_its_limit(n in 0usize..20, limit in 0usize..8) {
            let html: String = (0..n)
                .map(|i| format!(r#"<a class="result__a" href="/r/{i}">T{i}</a>"#))
                .collect();
            let cfg = ExtractConfig { fallback_limit: limit, ..Default::default() };
            let got = extract_fallback(&html, &cfg);
            prop_assert_eq!(got.len(), n.min(limit));
        }
    }
}
