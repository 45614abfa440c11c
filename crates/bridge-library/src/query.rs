//! Natural-language library queries
//!
//! A query is classified by walking an ordered list of [`QueryRule`]s; the
//! first rule whose classifier accepts the query renders the answer. When no
//! rule matches, the dispatcher renders a library summary that also lists
//! one example phrasing per rule.
//!
//! Matching is case-insensitive. Nouns (`metadata`, `key`, `author`,
//! `playlist`, `card`) match as substrings so plurals work; connectives
//! (`field`, `in`, `list`, `all`) must appear as whole words so that
//! "install" or "finish" do not count.
// Allow expect() on static regex patterns - these are guaranteed to compile
#![allow(clippy::expect_used)]

use crate::model::LibraryPayload;
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

/// `"term"` or `“term”`.
static DOUBLE_QUOTED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"["“]([^"“”]+)["”]"#).expect("static regex: double quoted"));

/// `'term'` delimited by whitespace or punctuation, so apostrophes don't pair up.
static SINGLE_QUOTED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|[\s(])['‘]([^'‘’]+)['’](?:$|[\s).,?!:;])")
        .expect("static regex: single quoted")
});

/// `with <term> in (the) title`.
static TITLE_PHRASE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\bwith\s+(?:the\s+)?(?:(?:words?|term|text|phrase)\s+)?(.+?)\s+in\s+(?:the\s+|their\s+|its\s+)?titles?\b",
    )
    .expect("static regex: title phrase")
});

/// Default dispatcher used by [`search_library`].
static STANDARD: LazyLock<QueryDispatcher> = LazyLock::new(QueryDispatcher::default);

/// Answer `query` against `payload` with the standard rule table.
///
/// Never fails: unrecognized queries get the library summary.
pub fn search_library(payload: &LibraryPayload, query: &str) -> String {
    STANDARD.answer(payload, query)
}

/// Classification result for a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryIntent {
    /// Distinct top-level card keys
    MetadataKeys,
    /// Distinct non-empty authors
    AuthorValues,
    /// Cards whose title contains the term
    TitleSearch(String),
    /// Every playlist with its item count
    ListPlaylists,
    /// Every card title
    ListCards,
    /// Card and playlist totals
    CountSummary,
    /// Library summary with supported queries
    Summary,
    /// Intent produced by a rule added with [`QueryDispatcher::with_rule`]
    Custom {
        /// Name of the rule that matched
        rule: &'static str,
        /// Optional argument extracted from the query
        argument: Option<String>,
    },
}

impl QueryIntent {
    /// Stable snake_case name.
    pub fn name(&self) -> &'static str {
        match self {
            QueryIntent::MetadataKeys => "metadata_keys",
            QueryIntent::AuthorValues => "author_field_values",
            QueryIntent::TitleSearch(_) => "title_search",
            QueryIntent::ListPlaylists => "list_playlists",
            QueryIntent::ListCards => "list_cards",
            QueryIntent::CountSummary => "count_summary",
            QueryIntent::Summary => "summary",
            QueryIntent::Custom { rule, .. } => *rule,
        }
    }
}

/// A query prepared for keyword matching.
#[derive(Debug, Clone)]
pub struct Query<'a> {
    raw: &'a str,
    lower: String,
    words: Vec<String>,
}

impl<'a> Query<'a> {
    /// Prepare `raw` for matching.
    pub fn new(raw: &'a str) -> Self {
        let lower = raw.to_lowercase();
        let words = lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(str::to_string)
            .collect();
        Self { raw, lower, words }
    }

    /// The query as given.
    pub fn raw(&self) -> &str {
        self.raw
    }

    /// Case-insensitive substring test.
    pub fn contains(&self, needle: &str) -> bool {
        self.lower.contains(needle)
    }

    /// Whether `word` appears as a whole word.
    pub fn has_word(&self, word: &str) -> bool {
        self.words.iter().any(|w| w == word)
    }

    /// Whether any of `words` appears as a whole word.
    pub fn has_any_word(&self, words: &[&str]) -> bool {
        words.iter().any(|w| self.has_word(w))
    }

    /// Whether `phrase` appears as consecutive whole words.
    pub fn has_phrase(&self, phrase: &[&str]) -> bool {
        !phrase.is_empty()
            && self
                .words
                .windows(phrase.len())
                .any(|window| window.iter().zip(phrase).all(|(a, b)| a == *b))
    }

    /// Title search term, if the query asks for one.
    pub fn title_term(&self) -> Option<String> {
        let quoted = DOUBLE_QUOTED
            .captures(self.raw)
            .or_else(|| SINGLE_QUOTED.captures(self.raw))
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string());
        if let Some(term) = quoted.filter(|t| !t.is_empty()) {
            return Some(term);
        }

        TITLE_PHRASE
            .captures(self.raw)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().trim_matches(['"', '\'']).trim().to_string())
            .filter(|t| !t.is_empty())
    }
}

/// Classifier half of a rule.
pub type Classifier = fn(&Query<'_>) -> Option<QueryIntent>;

/// Renderer half of a rule.
pub type Renderer = fn(&QueryIntent, &LibraryPayload) -> String;

/// One entry of the dispatch table.
#[derive(Debug, Clone)]
pub struct QueryRule {
    /// Rule name, used in logs and tests
    pub name: &'static str,
    /// Example phrasing listed in the summary's supported queries
    pub example: &'static str,
    /// Returns an intent when the rule applies
    pub classify: Classifier,
    /// Produces the answer for an intent this rule returned
    pub render: Renderer,
}

impl QueryRule {
    /// Create a rule.
    pub const fn new(
        name: &'static str,
        example: &'static str,
        classify: Classifier,
        render: Renderer,
    ) -> Self {
        Self {
            name,
            example,
            classify,
            render,
        }
    }
}

/// Ordered rule table; first match wins.
#[derive(Debug, Clone)]
pub struct QueryDispatcher {
    rules: Vec<QueryRule>,
}

impl Default for QueryDispatcher {
    fn default() -> Self {
        Self::new(Self::standard_rules())
    }
}

impl QueryDispatcher {
    /// Create a dispatcher from an explicit rule list.
    pub fn new(rules: Vec<QueryRule>) -> Self {
        Self { rules }
    }

    /// The built-in rules, in match order.
    pub fn standard_rules() -> Vec<QueryRule> {
        vec![
            QueryRule::new(
                "metadata_keys",
                "what metadata keys are used in cards",
                |q| (q.contains("metadata") && q.contains("key")).then_some(QueryIntent::MetadataKeys),
                render_metadata_keys,
            ),
            QueryRule::new(
                "author_field_values",
                "list the values in the author field",
                |q| {
                    (q.contains("author") && q.has_any_word(&["field", "in"]))
                        .then_some(QueryIntent::AuthorValues)
                },
                render_authors,
            ),
            QueryRule::new(
                "title_search",
                "find cards with \"princess\" in the title",
                |q| q.title_term().map(QueryIntent::TitleSearch),
                render_title_search,
            ),
            QueryRule::new(
                "list_playlists",
                "list all playlists",
                |q| {
                    (q.contains("playlist") && q.has_any_word(&["list", "all"]))
                        .then_some(QueryIntent::ListPlaylists)
                },
                render_playlists,
            ),
            QueryRule::new(
                "list_cards",
                "list all cards",
                |q| {
                    (q.contains("card") && q.has_any_word(&["list", "all"]))
                        .then_some(QueryIntent::ListCards)
                },
                render_cards,
            ),
            QueryRule::new(
                "count_summary",
                "how many cards and playlists are there",
                |q| {
                    (q.has_phrase(&["how", "many"]) || q.contains("count"))
                        .then_some(QueryIntent::CountSummary)
                },
                render_counts,
            ),
        ]
    }

    /// Insert `rule` at `index` (clamped to the end), shifting later rules down.
    pub fn with_rule(mut self, index: usize, rule: QueryRule) -> Self {
        let index = index.min(self.rules.len());
        self.rules.insert(index, rule);
        self
    }

    /// Rules in match order.
    pub fn rules(&self) -> &[QueryRule] {
        &self.rules
    }

    /// Classify a query. Falls back to [`QueryIntent::Summary`].
    pub fn classify(&self, query: &str) -> QueryIntent {
        let query = Query::new(query);
        self.rules
            .iter()
            .find_map(|rule| (rule.classify)(&query))
            .unwrap_or(QueryIntent::Summary)
    }

    /// Answer a query against a payload.
    pub fn answer(&self, payload: &LibraryPayload, query: &str) -> String {
        let parsed = Query::new(query);
        for rule in &self.rules {
            if let Some(intent) = (rule.classify)(&parsed) {
                tracing::debug!(rule = rule.name, "Query matched");
                return (rule.render)(&intent, payload);
            }
        }
        tracing::debug!("No query rule matched, rendering summary");
        self.summary(payload)
    }

    /// The default answer: totals plus supported query phrasings.
    pub fn summary(&self, payload: &LibraryPayload) -> String {
        let examples: Vec<&str> = self.rules.iter().map(|r| r.example).collect();
        format!(
            "Library Summary\nTotal cards: {}\nTotal playlists: {}\nSupported queries: {}",
            payload.card_count(),
            payload.playlist_count(),
            examples.join("; ")
        )
    }
}

fn render_metadata_keys(_: &QueryIntent, payload: &LibraryPayload) -> String {
    let mut seen = HashSet::new();
    let keys: Vec<&str> = payload
        .cards
        .iter()
        .flat_map(|card| card.keys.iter())
        .filter(|key| seen.insert(key.as_str()))
        .map(String::as_str)
        .collect();

    if keys.is_empty() {
        return format!(
            "No metadata keys found across {} cards.",
            payload.card_count()
        );
    }
    format!(
        "Metadata keys found across {} cards: {}",
        payload.card_count(),
        keys.join(", ")
    )
}

fn render_authors(_: &QueryIntent, payload: &LibraryPayload) -> String {
    let mut seen = HashSet::new();
    let authors: Vec<&str> = payload
        .cards
        .iter()
        .map(|card| card.author.trim())
        .filter(|author| !author.is_empty() && seen.insert(*author))
        .collect();

    if authors.is_empty() {
        return format!("No authors found in {} cards.", payload.card_count());
    }
    format!("Authors found in cards: {}", authors.join(", "))
}

fn render_title_search(intent: &QueryIntent, payload: &LibraryPayload) -> String {
    let term = match intent {
        QueryIntent::TitleSearch(term) => term.as_str(),
        _ => "",
    };
    let needle = term.to_lowercase();
    let titles: Vec<&str> = payload
        .cards
        .iter()
        .filter(|card| card.title.to_lowercase().contains(&needle))
        .map(|card| card.title.as_str())
        .collect();

    bullet_list(
        &format!("Cards with \"{}\" in title ({})", term, titles.len()),
        titles,
    )
}

fn render_playlists(_: &QueryIntent, payload: &LibraryPayload) -> String {
    bullet_list(
        &format!("Playlists ({})", payload.playlist_count()),
        payload
            .playlists
            .iter()
            .map(|p| format!("{} ({} items)", display_name(&p.name), p.item_count)),
    )
}

fn render_cards(_: &QueryIntent, payload: &LibraryPayload) -> String {
    bullet_list(
        &format!("Cards ({})", payload.card_count()),
        payload.cards.iter().map(|c| display_name(&c.title)),
    )
}

fn render_counts(_: &QueryIntent, payload: &LibraryPayload) -> String {
    format!(
        "The library contains {} cards and {} playlists.",
        payload.card_count(),
        payload.playlist_count()
    )
}

fn bullet_list<I, S>(header: &str, items: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out = format!("{}:", header);
    for item in items {
        out.push_str("\n- ");
        out.push_str(item.as_ref());
    }
    out
}

fn display_name(name: &str) -> &str {
    if name.trim().is_empty() {
        "(untitled)"
    } else {
        name
    }
}
