mod cache;
mod config;
mod device;
mod logging;
mod net;
mod page;
mod routes;
mod session;
mod worker;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use std::sync::Arc;
use url::Url;

use crate::cache::{CacheStorage, SqliteStorage};
use crate::config::Config;
use crate::device::{DeviceDetector, Viewport};
use crate::net::{HttpNetwork, Request};
use crate::page::Page;
use crate::routes::{Location, RouteTable};
use crate::session::{FileSessionStore, SessionStore};
use crate::worker::{ControllerSettings, Registrar};

const DESKTOP_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 Chrome/120.0";

#[derive(Parser, Debug)]
#[command(name = "fmpwa")]
#[command(about = "Offline cache controller and route/session gate for the facilities PWA")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/fmpwa/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Keep cache generations in memory instead of the cache database
  #[arg(long, global = true)]
  ephemeral: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Show route categories, viewport class and layout for a location
  Classify {
    location: String,
    #[arg(long, default_value = DESKTOP_USER_AGENT)]
    user_agent: String,
    #[arg(long, default_value_t = 1280)]
    width: u32,
  },

  /// Check whether persisted client storage holds a session
  Session {
    /// Session storage file (default: from config)
    #[arg(long)]
    path: Option<PathBuf>,
  },

  /// Run the page-side flow for one or more navigations
  Navigate {
    #[arg(required = true)]
    locations: Vec<String>,
    #[arg(long, default_value = DESKTOP_USER_AGENT)]
    user_agent: String,
    #[arg(long, default_value_t = 1280)]
    width: u32,
    /// Also request each location the way the page would
    #[arg(long)]
    fetch: bool,
  },

  /// Fetch a URL through the offline cache controller
  Fetch {
    url: String,
    #[arg(short = 'X', long, default_value = "GET")]
    method: String,
    /// Extra request header, `Name: value` (repeatable)
    #[arg(short = 'H', long = "header")]
    headers: Vec<String>,
  },

  /// Inspect cache generations
  Cache {
    #[command(subcommand)]
    action: CacheAction,
  },
}

#[derive(Subcommand, Debug)]
enum CacheAction {
  /// List generations and their entry counts
  List,
  /// Delete a generation
  Purge { name: String },
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  let _log_guard = logging::init(Config::data_dir().ok().map(|d| d.join("logs")))?;

  let config = Config::load(args.config.as_deref())?;

  match args.command {
    Command::Classify {
      location,
      user_agent,
      width,
    } => classify(&config, &location, &user_agent, width),
    Command::Session { path } => session(&config, path),
    Command::Navigate {
      locations,
      user_agent,
      width,
      fetch,
    } => {
      let viewport = Viewport::new(width);
      navigate(&config, args.ephemeral, &locations, &viewport, &user_agent, fetch).await
    }
    Command::Fetch {
      url,
      method,
      headers,
    } => fetch(&config, args.ephemeral, &url, &method, &headers).await,
    Command::Cache { action } => cache(&config, args.ephemeral, action),
  }
}

fn origin(config: &Config) -> Result<Url> {
  Url::parse(&config.cache.origin)
    .map_err(|e| eyre!("Invalid cache origin '{}': {}", config.cache.origin, e))
}

fn open_storage(config: &Config, ephemeral: bool) -> Result<SqliteStorage> {
  if ephemeral {
    SqliteStorage::open_in_memory()
  } else {
    SqliteStorage::open(&config.cache_database_path()?)
  }
}

fn registrar(config: &Config, ephemeral: bool) -> Result<Registrar<SqliteStorage, HttpNetwork>> {
  let storage = open_storage(config, ephemeral)?;
  let network = HttpNetwork::new(origin(config)?)?;
  Ok(Registrar::new(Arc::new(storage), Arc::new(network)))
}

fn classify(config: &Config, location: &str, user_agent: &str, width: u32) -> Result<()> {
  let location = Location::parse(location, &origin(config)?)?;
  let route = RouteTable::new(&config.routes).classify(&location);
  let viewport = DeviceDetector::new(config.viewport.clone()).classify(user_agent, width);

  println!("path:        {}", location.path);
  println!("cacheable:   {}", route.cacheable);
  println!("mobile-only: {}", route.mobile_only);
  println!("protected:   {}", route.protected);
  println!("viewport:    {:?}", viewport);
  println!("layout:      {:?}", page::Layout::for_route(&route, viewport));
  Ok(())
}

fn session(config: &Config, path: Option<PathBuf>) -> Result<()> {
  let path = match path {
    Some(p) => p,
    None => config.session_path()?,
  };
  let store = FileSessionStore::new(path, &config.session);

  match store.read() {
    Some(session) => {
      println!("authenticated ({})", store.path().display());
      println!("user:  {}", session.user);
      println!("token: {} chars", session.token.len());
    }
    None => println!("unauthenticated ({})", store.path().display()),
  }
  Ok(())
}

async fn navigate(
  config: &Config,
  ephemeral: bool,
  locations: &[String],
  viewport: &Viewport,
  user_agent: &str,
  fetch: bool,
) -> Result<()> {
  let session: Arc<dyn SessionStore> = Arc::new(FileSessionStore::new(
    config.session_path()?,
    &config.session,
  ));
  let device = DeviceDetector::new(config.viewport.clone()).mount(viewport, user_agent);
  let registrar = Arc::new(registrar(config, ephemeral)?);

  let mut page = Page::mount(config, session, device, registrar)?;

  for location in locations {
    let nav = page.navigate(location).await?;
    println!(
      "{}  route={:?} layout={:?} viewport={:?} session={:?} gate={:?} controller={}",
      nav.location.href(),
      nav.route,
      nav.layout,
      nav.viewport,
      nav.session,
      nav.decision,
      nav.controller.as_deref().unwrap_or("-"),
    );

    if fetch {
      let url = page.url(location)?;
      match page.fetch(Request::get(url)).await {
        Ok(result) => println!(
          "  {} ({} bytes, {})",
          result.data.status,
          result.data.body.len(),
          result.source
        ),
        Err(e) => println!("  failed: {}", e),
      }
    }
  }
  Ok(())
}

async fn fetch(
  config: &Config,
  ephemeral: bool,
  url: &str,
  method: &str,
  headers: &[String],
) -> Result<()> {
  let registrar = registrar(config, ephemeral)?;
  let controller = registrar
    .register(ControllerSettings::from_config(config)?)
    .await?;

  let url = origin(config)?
    .join(url)
    .map_err(|e| eyre!("Invalid URL '{}': {}", url, e))?;

  let mut request = Request::new(method, url);
  for header in headers {
    let (name, value) = header
      .split_once(':')
      .ok_or_else(|| eyre!("Invalid header '{}', expected 'Name: value'", header))?;
    request = request.with_header(name.trim(), value.trim());
  }

  let result = controller.fetch(request).await?;

  println!(
    "{} {} ({} bytes, {})",
    result.data.status,
    result.data.url,
    result.data.body.len(),
    result.source
  );
  if let Some(cached_at) = result.cached_at {
    println!("cached at {}", cached_at.to_rfc3339());
  }
  Ok(())
}

fn cache(config: &Config, ephemeral: bool, action: CacheAction) -> Result<()> {
  let storage = open_storage(config, ephemeral)?;

  match action {
    CacheAction::List => {
      for generation in storage.generations()? {
        let marker = if generation.name == config.cache.version {
          "*"
        } else {
          " "
        };
        println!("{} {}  {} entries", marker, generation.name, generation.entries);
      }
    }
    CacheAction::Purge { name } => {
      if storage.delete_generation(&name)? {
        println!("deleted {}", name);
      } else {
        println!("no generation named {}", name);
      }
    }
  }
  Ok(())
}
