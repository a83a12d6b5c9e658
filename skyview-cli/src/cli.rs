use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand};
use inquire::{Confirm, Password, Select, Text};
use std::sync::Arc;

use skyview_core::{
    AggregatedWeatherView, Config, FavoritesStore, FileStore, GeoResolver, KeyValueStore,
    LocationCandidate, OpenWeatherClient, RecentSearches, SearchController, SearchError,
    SearchState, WeatherAggregator, provider::client_from_config,
};

use crate::render::{render_candidates, render_view};

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "skyview", version, about = "Weather and air quality for any place")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Store the OpenWeather API key.
    Configure,

    /// Show weather for the best match of a place name.
    Show {
        /// Place name, e.g. "Paris".
        place: String,

        /// Print the view as JSON instead of text.
        #[arg(long)]
        json: bool,
    },

    /// Search for a place, pick a match and show its weather.
    Search {
        /// Query; prompted for when absent.
        query: Option<String>,
    },

    /// Manage favorite locations.
    Favorites {
        #[command(subcommand)]
        action: FavoritesAction,
    },

    /// Manage recent searches.
    Recent {
        #[command(subcommand)]
        action: RecentAction,
    },
}

#[derive(Debug, Subcommand)]
pub enum FavoritesAction {
    /// List saved locations.
    List,
    /// Pick a saved location and show its weather.
    Show,
    /// Save the best match for a place name.
    Add { place: String },
    /// Remove the best match for a place name.
    Remove { place: String },
}

#[derive(Debug, Subcommand)]
pub enum RecentAction {
    /// List recent searches, most recent first.
    List,
    /// Forget all recent searches.
    Clear,
}

/// Loaded configuration plus the state file backing favorites and history.
struct App {
    config: Config,
    store: Arc<dyn KeyValueStore>,
}

impl App {
    fn load() -> Result<Self> {
        let config = Config::load()?;
        let path = Config::state_file_path()?;
        let store = FileStore::open(&path)
            .with_context(|| format!("Failed to open state file: {}", path.display()))?;
        tracing::debug!(path = %path.display(), "opened state file");

        Ok(Self {
            config,
            store: Arc::new(store),
        })
    }

    fn client(&self) -> Result<Arc<OpenWeatherClient>> {
        client_from_config(&self.config)
    }

    fn aggregator(&self, client: Arc<OpenWeatherClient>) -> WeatherAggregator {
        WeatherAggregator::new(client.clone(), client.clone(), client)
            .with_language(self.config.language.clone())
    }

    fn favorites(&self) -> Result<FavoritesStore> {
        Ok(FavoritesStore::load(self.store.clone())?)
    }

    fn recent(&self) -> Result<RecentSearches> {
        Ok(RecentSearches::load(self.store.clone())?)
    }

    /// Resolve `place` and return the top-ranked candidate.
    async fn best_match(&self, place: &str) -> Result<LocationCandidate> {
        self.client()?
            .resolve(place)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("No location data found for '{place}'."))
    }
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        match self.command {
            Command::Configure => configure(),
            Command::Show { place, json } => show(&App::load()?, &place, json).await,
            Command::Search { query } => search(&App::load()?, query).await,
            Command::Favorites { action } => favorites(&App::load()?, action).await,
            Command::Recent { action } => recent(&App::load()?, action),
        }
    }
}

fn configure() -> Result<()> {
    let mut config = Config::load()?;

    let api_key = Password::new("OpenWeather API key:")
        .without_confirmation()
        .prompt()
        .context("Failed to read API key")?;
    if api_key.trim().is_empty() {
        bail!("API key must not be empty");
    }

    config.set_api_key(api_key.trim().to_string());
    config.save()?;

    println!("Saved configuration to {}", Config::config_file_path()?.display());
    Ok(())
}

async fn show(app: &App, place: &str, json: bool) -> Result<()> {
    let view = app.aggregator(app.client()?).aggregate(place).await?;

    if json {
        println!("{}", to_json(&view)?);
    } else {
        println!("{}", render_view(&view));
    }
    Ok(())
}

fn to_json(view: &AggregatedWeatherView) -> Result<String> {
    serde_json::to_string_pretty(view).context("Failed to encode view as JSON")
}

/// Let the user pick one of `locations` by label.
fn pick<'a>(message: &str, locations: &'a [LocationCandidate]) -> Result<&'a LocationCandidate> {
    let labels: Vec<String> = locations.iter().map(LocationCandidate::label).collect();
    let choice = Select::new(message, labels)
        .raw_prompt()
        .context("Failed to read location choice")?;

    locations
        .get(choice.index)
        .ok_or_else(|| anyhow!("No location at index {}", choice.index))
}

/// Run `query` through the controller and wait for its outcome.
async fn resolve_candidates(
    controller: &mut SearchController,
    query: &str,
) -> Result<Vec<LocationCandidate>> {
    // One-shot query: nothing to debounce.
    if let Err(err) = controller.submit(query) {
        let err = SearchError::from(err);
        bail!("{err}. {}.", err.recovery_hint());
    }

    match controller.settled().await.state {
        SearchState::Resolved { candidates, .. } => Ok(candidates),
        SearchState::Failed { error, .. } => {
            let err = SearchError::from(error);
            bail!("Search failed: {err}. {}.", err.recovery_hint());
        }
        other => bail!("Search did not complete: {other:?}"),
    }
}

async fn search(app: &App, query: Option<String>) -> Result<()> {
    let client = app.client()?;
    let aggregator = app.aggregator(client.clone());
    let mut controller = SearchController::new(client, app.recent()?, app.config.debounce());

    let recent = controller.recent();
    if query.is_none() && !recent.is_empty() {
        println!("Recent searches: {}", recent.join(", "));
    }

    let query = match query {
        Some(q) => q,
        None => Text::new("City:").prompt().context("Failed to read search query")?,
    };

    let candidates = resolve_candidates(&mut controller, &query).await?;

    println!("{}", render_candidates(&candidates));
    if candidates.is_empty() {
        return Ok(());
    }

    let location = pick("Location:", &candidates)?;

    let view = aggregator.aggregate_location(location).await?;
    println!("{}", render_view(&view));

    let mut favorites = app.favorites()?;
    let question = if favorites.is_favorite(location) {
        "Remove from favorites?"
    } else {
        "Add to favorites?"
    };
    if Confirm::new(question).with_default(false).prompt().unwrap_or(false) {
        let now = favorites.toggle(location)?;
        println!(
            "{} {} favorites.",
            location.label(),
            if now { "added to" } else { "removed from" }
        );
    }

    Ok(())
}

async fn favorites(app: &App, action: FavoritesAction) -> Result<()> {
    let mut favorites = app.favorites()?;

    match action {
        FavoritesAction::List => {
            if favorites.list().is_empty() {
                println!("No favorites yet. Add one with `skyview favorites add <place>`.");
            }
            for (i, loc) in favorites.list().iter().enumerate() {
                println!("{:>2}. {}", i + 1, loc.label());
            }
        }
        FavoritesAction::Show => {
            if favorites.list().is_empty() {
                bail!("No favorites yet.");
            }
            let location = pick("Favorite:", favorites.list())?;
            let view = app.aggregator(app.client()?).aggregate_location(location).await?;
            println!("{}", render_view(&view));
        }
        FavoritesAction::Add { place } => {
            let location = app.best_match(&place).await?;
            if favorites.is_favorite(&location) {
                println!("{} is already a favorite.", location.label());
            } else {
                favorites.toggle(&location)?;
                println!("Added {}.", location.label());
            }
        }
        FavoritesAction::Remove { place } => {
            let location = app.best_match(&place).await?;
            if !favorites.is_favorite(&location) {
                bail!("{} is not a favorite.", location.label());
            }
            favorites.remove(&location)?;
            println!("Removed {}.", location.label());
        }
    }

    Ok(())
}

fn recent(app: &App, action: RecentAction) -> Result<()> {
    let mut recent = app.recent()?;

    match action {
        RecentAction::List => {
            for q in recent.entries() {
                println!("{q}");
            }
        }
        RecentAction::Clear => {
            recent.clear()?;
            println!("Cleared recent searches.");
        }
    }

    Ok(())
}
