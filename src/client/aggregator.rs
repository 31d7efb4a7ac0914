//! Debounced search-as-you-type.
//!
//! A [`SearchAggregator`] owns one background task. Every call to
//! [`SearchAggregator::input`] restarts a 300 ms trailing timer; when it fires
//! with a query of at least two characters a single request goes to the
//! [`SearchSource`]. Results are classified into users, movies and TV shows,
//! given a link and label for the configured [`Locale`], and capped at four.
//!
//! Each input bumps a generation counter and every fetch remembers the
//! generation it was issued under. A response from an older generation is
//! dropped, so a slow request can never overwrite the results of a newer one.
//! Failures are logged and leave an empty, idle view.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
    time::{sleep_until, Instant},
};
use tracing::{debug, warn};

use crate::{locale::Locale, search::dto::SearchResult};

pub const DEBOUNCE: Duration = Duration::from_millis(300);
pub const MIN_QUERY_CHARS: usize = 2;
pub const MAX_ENTRIES: usize = 4;

#[async_trait]
pub trait SearchSource: Send + Sync {
    async fn search(&self, query: &str, locale: Locale) -> anyhow::Result<Vec<SearchResult>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchPhase {
    #[default]
    Idle,
    Debouncing,
    Fetching,
    Settled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    User,
    Movie,
    TvShow,
}

/// A search hit ready for display.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchEntry {
    pub id: String,
    pub kind: EntryKind,
    pub label: &'static str,
    pub title: String,
    pub image: Option<String>,
    pub link: String,
    pub year: Option<String>,
    pub username: Option<String>,
    pub rating: Option<f32>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchView {
    pub phase: SearchPhase,
    pub query: String,
    pub entries: Vec<SearchEntry>,
}

/// Kind of a raw result, judged by `type` and then `mediaType`.
pub fn classify(result: &SearchResult) -> Option<EntryKind> {
    fn kind_of(tag: &str) -> Option<EntryKind> {
        match tag.to_ascii_lowercase().as_str() {
            "user" => Some(EntryKind::User),
            "movie" => Some(EntryKind::Movie),
            "tv" | "tvshow" | "tv_show" | "series" => Some(EntryKind::TvShow),
            _ => None,
        }
    }
    kind_of(&result.kind).or_else(|| result.media_type.as_deref().and_then(kind_of))
}

fn to_entry(result: SearchResult, locale: Locale) -> Option<SearchEntry> {
    let kind = classify(&result)?;
    let (link, label) = match kind {
        EntryKind::User => {
            let username = result.username.as_deref().unwrap_or(&result.id);
            (locale.user_link(username), locale.user_label())
        }
        EntryKind::Movie => (locale.movie_link(&result.id), locale.movie_label()),
        EntryKind::TvShow => (locale.tv_link(&result.id), locale.tv_label()),
    };
    Some(SearchEntry {
        id: result.id,
        kind,
        label,
        title: result.title,
        image: result.image,
        link,
        year: result.year,
        username: result.username,
        rating: result.rating,
    })
}

/// Classifies results in receipt order and keeps the first [`MAX_ENTRIES`].
pub fn build_entries(results: Vec<SearchResult>, locale: Locale) -> Vec<SearchEntry> {
    results
        .into_iter()
        .filter_map(|r| to_entry(r, locale))
        .take(MAX_ENTRIES)
        .collect()
}

type FetchOutcome = (u64, anyhow::Result<Vec<SearchResult>>);

pub struct SearchAggregator {
    input: mpsc::UnboundedSender<String>,
    view: watch::Receiver<SearchView>,
    task: JoinHandle<()>,
}

impl SearchAggregator {
    /// Starts the background task on the current tokio runtime.
    pub fn spawn(source: Arc<dyn SearchSource>, locale: Locale) -> Self {
        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let (view_tx, view_rx) = watch::channel(SearchView::default());
        let task = tokio::spawn(run(source, locale, input_rx, view_tx));
        Self {
            input: input_tx,
            view: view_rx,
            task,
        }
    }

    /// Feeds the current contents of the search box.
    pub fn input(&self, query: impl Into<String>) {
        // the task only stops once this handle is dropped
        let _ = self.input.send(query.into());
    }

    pub fn view(&self) -> SearchView {
        self.view.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SearchView> {
        self.view.clone()
    }
}

impl Drop for SearchAggregator {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run(
    source: Arc<dyn SearchSource>,
    locale: Locale,
    mut input_rx: mpsc::UnboundedReceiver<String>,
    view_tx: watch::Sender<SearchView>,
) {
    let (done_tx, mut done_rx) = mpsc::unbounded_channel::<FetchOutcome>();
    let mut generation: u64 = 0;
    let mut pending: Option<(String, Instant)> = None;

    loop {
        let deadline = pending.as_ref().map(|(_, at)| *at);
        tokio::select! {
            maybe = input_rx.recv() => {
                let Some(query) = maybe else { break };
                generation += 1;
                pending = Some((query.clone(), Instant::now() + DEBOUNCE));
                view_tx.send_modify(|v| {
                    v.phase = SearchPhase::Debouncing;
                    v.query = query;
                });
            }
            _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                let Some((query, _)) = pending.take() else { continue };
                let trimmed = query.trim().to_string();
                if trimmed.chars().count() < MIN_QUERY_CHARS {
                    view_tx.send_modify(|v| {
                        v.phase = SearchPhase::Idle;
                        v.entries.clear();
                    });
                    continue;
                }

                view_tx.send_modify(|v| v.phase = SearchPhase::Fetching);
                let issued = generation;
                let source = source.clone();
                let done = done_tx.clone();
                debug!(query = %trimmed, generation = issued, "search fetch");
                tokio::spawn(async move {
                    let outcome = source.search(&trimmed, locale).await;
                    let _ = done.send((issued, outcome));
                });
            }
            Some((issued, outcome)) = done_rx.recv() => {
                if issued != generation {
                    debug!(issued, current = generation, "stale search response dropped");
                    continue;
                }
                match outcome {
                    Ok(results) => {
                        let entries = build_entries(results, locale);
                        view_tx.send_modify(|v| {
                            v.phase = SearchPhase::Settled;
                            v.entries = entries;
                        });
                    }
                    Err(e) => {
                        warn!(error = %format!("{e:#}"), "search failed");
                        view_tx.send_modify(|v| {
                            v.phase = SearchPhase::Idle;
                            v.entries.clear();
                        });
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Answers `count` movies titled after the query; `slow` and `boom` are special.
    struct ScriptedSource {
        calls: Mutex<Vec<String>>,
        count: usize,
    }

    impl ScriptedSource {
        fn new(count: usize) -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                count,
            })
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SearchSource for ScriptedSource {
        async fn search(&self, query: &str, _locale: Locale) -> anyhow::Result<Vec<SearchResult>> {
            self.calls.lock().unwrap().push(query.to_string());
            let delay = if query.starts_with("slow") { 1000 } else { 10 };
            tokio::time::sleep(Duration::from_millis(delay)).await;
            if query == "boom" {
                anyhow::bail!("upstream down");
            }
            Ok((0..self.count)
                .map(|i| SearchResult {
                    id: i.to_string(),
                    kind: "movie".into(),
                    media_type: Some("movie".into()),
                    title: format!("{query} {i}"),
                    image: None,
                    link: String::new(),
                    year: None,
                    username: None,
                    rating: None,
                })
                .collect())
        }
    }

    async fn wait_for_phase(rx: &mut watch::Receiver<SearchView>, phase: SearchPhase) -> SearchView {
        loop {
            {
                let v = rx.borrow_and_update();
                if v.phase == phase {
                    return v.clone();
                }
            }
            rx.changed().await.expect("aggregator alive");
        }
    }

    fn result(kind: &str, media_type: Option<&str>, id: &str) -> SearchResult {
        SearchResult {
            id: id.into(),
            kind: kind.into(),
            media_type: media_type.map(Into::into),
            title: format!("t{id}"),
            image: None,
            link: String::new(),
            year: None,
            username: (kind == "user").then(|| format!("u{id}")),
            rating: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn rapid_keystrokes_fire_one_request_with_final_value() {
        let source = ScriptedSource::new(2);
        let agg = SearchAggregator::spawn(source.clone(), Locale::En);
        let mut rx = agg.subscribe();

        for q in ["m", "ma", "mat", "matr", "matrix"] {
            agg.input(q);
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        let view = wait_for_phase(&mut rx, SearchPhase::Settled).await;

        assert_eq!(source.calls(), vec!["matrix"]);
        assert_eq!(view.query, "matrix");
        assert_eq!(view.entries.len(), 2);
        assert_eq!(view.entries[0].title, "matrix 0");
    }

    #[tokio::test(start_paused = true)]
    async fn short_queries_never_reach_the_network() {
        let source = ScriptedSource::new(2);
        let agg = SearchAggregator::spawn(source.clone(), Locale::En);

        agg.input("a");
        tokio::time::sleep(Duration::from_millis(500)).await;
        agg.input("  b ");
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert!(source.calls().is_empty());
        let view = agg.view();
        assert_eq!(view.phase, SearchPhase::Idle);
        assert!(view.entries.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn results_are_capped_at_four() {
        let source = ScriptedSource::new(25);
        let agg = SearchAggregator::spawn(source.clone(), Locale::En);
        let mut rx = agg.subscribe();

        agg.input("star");
        let view = wait_for_phase(&mut rx, SearchPhase::Settled).await;
        assert_eq!(view.entries.len(), MAX_ENTRIES);
        let titles: Vec<_> = view.entries.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["star 0", "star 1", "star 2", "star 3"]);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_response_never_overwrites_newer_results() {
        let source = ScriptedSource::new(1);
        let agg = SearchAggregator::spawn(source.clone(), Locale::En);
        let mut rx = agg.subscribe();

        agg.input("slow query");
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(agg.view().phase, SearchPhase::Fetching);

        agg.input("fast");
        let view = wait_for_phase(&mut rx, SearchPhase::Settled).await;
        assert_eq!(view.entries[0].title, "fast 0");

        // let the slow request finish
        tokio::time::sleep(Duration::from_secs(2)).await;
        let view = agg.view();
        assert_eq!(view.phase, SearchPhase::Settled);
        assert_eq!(view.entries[0].title, "fast 0");
        assert_eq!(source.calls(), vec!["slow query", "fast"]);
    }

    #[tokio::test(start_paused = true)]
    async fn failures_clear_results_and_go_idle() {
        let source = ScriptedSource::new(3);
        let agg = SearchAggregator::spawn(source.clone(), Locale::En);
        let mut rx = agg.subscribe();

        agg.input("ok");
        let view = wait_for_phase(&mut rx, SearchPhase::Settled).await;
        assert_eq!(view.entries.len(), 3);

        agg.input("boom");
        tokio::time::sleep(Duration::from_secs(1)).await;
        let view = agg.view();
        assert_eq!(view.phase, SearchPhase::Idle);
        assert!(view.entries.is_empty());
    }

    #[test]
    fn classification_uses_type_then_media_type() {
        assert_eq!(classify(&result("user", None, "1")), Some(EntryKind::User));
        assert_eq!(classify(&result("movie", None, "1")), Some(EntryKind::Movie));
        assert_eq!(classify(&result("media", Some("tv"), "1")), Some(EntryKind::TvShow));
        assert_eq!(classify(&result("", Some("movie"), "1")), Some(EntryKind::Movie));
        assert_eq!(classify(&result("person", None, "1")), None);
    }

    #[test]
    fn entries_get_locale_links_and_labels() {
        let entries = build_entries(
            vec![
                result("user", None, "7"),
                result("person", None, "8"),
                result("media", Some("movie"), "603"),
                result("tv", Some("tv"), "1399"),
            ],
            Locale::PtBr,
        );
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].link, "/ptbr/profile/u7");
        assert_eq!(entries[0].label, "Usuário");
        assert_eq!(entries[1].link, "/ptbr/filme/603");
        assert_eq!(entries[1].label, "Filme");
        assert_eq!(entries[2].link, "/ptbr/serie/1399");
        assert_eq!(entries[2].label, "Série");
    }
}
