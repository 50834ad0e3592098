use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};
use url::Url;

use crate::detect::city::TargetCity;
use crate::detect::{self, ValidatedMatch};
use crate::fetch::Fetcher;

pub const BASE_URL: &str = "https://trouverunlogement.lescrous.fr";
pub const SEARCH_URL: &str = "https://trouverunlogement.lescrous.fr/tools/42/search";
const PAGE_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    Found {
        matches: Vec<ValidatedMatch>,
        pages_scanned: u32,
    },
    /// Every page was read; nothing survived validation.
    NoMatches { pages_scanned: u32 },
    /// The first page could not be fetched; nothing was scanned.
    FetchFailed(String),
}

impl ScanOutcome {
    /// Label stored in the scan history.
    pub fn label(&self) -> &'static str {
        match self {
            ScanOutcome::Found { .. } => "found",
            ScanOutcome::NoMatches { .. } => "empty",
            ScanOutcome::FetchFailed(_) => "fetch_failed",
        }
    }

    pub fn matches(&self) -> &[ValidatedMatch] {
        match self {
            ScanOutcome::Found { matches, .. } => matches,
            _ => &[],
        }
    }

    pub fn pages_scanned(&self) -> u32 {
        match self {
            ScanOutcome::Found { pages_scanned, .. } | ScanOutcome::NoMatches { pages_scanned } => {
                *pages_scanned
            }
            ScanOutcome::FetchFailed(_) => 0,
        }
    }
}

/// Walks the paginated search results for one city.
pub struct Scanner<F> {
    fetcher: F,
    city: TargetCity,
    search_url: Url,
    base_url: Url,
    page_delay: Duration,
    show_progress: bool,
}

impl<F: Fetcher> Scanner<F> {
    pub fn new(fetcher: F, city: TargetCity) -> anyhow::Result<Self> {
        Ok(Self {
            fetcher,
            city,
            search_url: Url::parse(SEARCH_URL)?,
            base_url: Url::parse(BASE_URL)?,
            page_delay: PAGE_DELAY,
            show_progress: false,
        })
    }

    pub fn with_page_delay(mut self, delay: Duration) -> Self {
        self.page_delay = delay;
        self
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn city(&self) -> &TargetCity {
        &self.city
    }

    /// URL of result page `n` (1-indexed); page 1 carries no `page` parameter.
    pub fn page_url(&self, n: u32) -> String {
        if n <= 1 {
            return self.search_url.to_string();
        }
        let mut url = self.search_url.clone();
        url.query_pairs_mut().append_pair("page", &n.to_string());
        url.to_string()
    }

    /// Scan up to `max_pages` result pages, one at a time.
    pub async fn scan(&self, max_pages: u32) -> ScanOutcome {
        let first_url = self.page_url(1);
        let body = match self.fetcher.fetch(&first_url).await {
            Ok(body) => body,
            Err(e) => {
                warn!("Scan failed: first page unavailable: {}", e);
                return ScanOutcome::FetchFailed(e.to_string());
            }
        };

        let first = detect::analyze_first_page(&body, &self.city, &self.base_url);
        let pages = first.total_pages.min(max_pages.max(1));
        info!(
            "Site reports {} page(s), scanning {}",
            first.total_pages, pages
        );

        let pb = self.progress_bar(pages);
        let mut matches = tag(first.outcome.into_occurrences(), 1);
        let mut skipped = 0;
        pb.inc(1);

        for n in 2..=pages {
            tokio::time::sleep(self.page_delay).await;

            let url = self.page_url(n);
            let body = match self.fetcher.fetch(&url).await {
                Ok(body) => body,
                Err(e) => {
                    warn!("Skipping page {}: {}", n, e);
                    skipped += 1;
                    pb.inc(1);
                    continue;
                }
            };
            let outcome = detect::analyze_page(&body, &self.city, &self.base_url);
            matches.extend(tag(outcome.into_occurrences(), n));
            pb.inc(1);
        }
        pb.finish_and_clear();

        let pages_scanned = pages - skipped;
        if skipped > 0 {
            warn!("{} of {} page(s) could not be fetched", skipped, pages);
        }

        if matches.is_empty() {
            info!(
                "No valid {} listings across {} page(s)",
                self.city.name(),
                pages_scanned
            );
            ScanOutcome::NoMatches { pages_scanned }
        } else {
            info!(
                "{} valid {} listing(s) across {} page(s)",
                matches.len(),
                self.city.name(),
                pages_scanned
            );
            ScanOutcome::Found {
                matches,
                pages_scanned,
            }
        }
    }

    fn progress_bar(&self, pages: u32) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(pages as u64);
        if let Ok(style) =
            ProgressStyle::default_bar().template("[{elapsed_precise}] {bar:40} page {pos}/{len}")
        {
            pb.set_style(style.progress_chars("=> "));
        }
        pb
    }
}

fn tag(found: Vec<detect::Occurrence>, page_number: u32) -> Vec<ValidatedMatch> {
    found
        .into_iter()
        .map(|occurrence| ValidatedMatch {
            occurrence,
            page_number,
        })
        .collect()
}
