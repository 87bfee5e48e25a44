//! thumb-cache - on-demand image thumbnails with a disk cache.
//!
//! This binary exposes the cache operations on the command line and runs the
//! HTTP front end.

use clap::Parser;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use thumb_cache::{
    config::{CacheArgs, ClearArgs, Cli, Command, MarkupArgs, RequestArgs, ServeConfig},
    error_to_string, img_tag,
    server::{create_router, RouterConfig},
    ReqwestHttpClient, RasterPipeline, ThumbnailCache, ThumbnailRequest,
};

type DefaultCache = ThumbnailCache<ReqwestHttpClient, RasterPipeline>;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.into_command() {
        Command::Serve(config) => run_serve(config).await,
        Command::Path(args) => run_path(args).await,
        Command::Url(args) => run_url(args).await,
        Command::Markup(args) => run_markup(args).await,
        Command::Clear(args) => run_clear(args).await,
    }
}

// =============================================================================
// Serve Command
// =============================================================================

async fn run_serve(config: ServeConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let Some(cache) = build_cache(&config.cache) else {
        return ExitCode::FAILURE;
    };

    let cache_config = cache.config();
    info!("Configuration:");
    info!("  Web root: {}", cache_config.web_root.display());
    info!("  Cache root: {}", cache_config.cache_root().display());
    info!("  Cache URL: {}", cache_config.cache_url());
    match cache_config.expiry() {
        Some(expiry) => info!("  Expiry: {}s", expiry.as_secs()),
        None => info!("  Expiry: never"),
    }
    info!("  Default quality: {}", cache_config.quality);

    let router = create_router(cache, build_router_config(&config));
    let addr = config.bind_address();

    info!("");
    info!("────────────────────────────────────────────────────────────────");
    info!("  Server listening on: http://{}", addr);
    info!("");
    info!("  Try these endpoints:");
    info!("    curl http://{}/health", addr);
    info!(
        "    curl 'http://{}/thumbnail/url?source=img/cat.png&width=100&height=100'",
        addr
    );
    info!("────────────────────────────────────────────────────────────────");
    info!("");

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = axum::serve(listener, router).await {
        error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

/// Build RouterConfig from the application ServeConfig.
fn build_router_config(config: &ServeConfig) -> RouterConfig {
    let mut router_config = RouterConfig::new()
        .with_cache_max_age(config.cache_max_age)
        .with_tracing(!config.no_tracing)
        .with_static(!config.no_static);

    if let Some(ref origins) = config.cors_origins {
        router_config = router_config.with_cors_origins(origins.clone());
    }

    router_config
}

// =============================================================================
// Request Commands
// =============================================================================

async fn run_path(args: RequestArgs) -> ExitCode {
    init_logging(args.verbose);

    let Some(cache) = build_cache(&args.cache) else {
        return ExitCode::FAILURE;
    };

    match cache.thumbnail(&to_request(&args)).await {
        Ok(response) => {
            if args.json {
                print_json(&serde_json::json!({
                    "path": response.path.display().to_string(),
                    "fingerprint": response.fingerprint.as_str(),
                    "cache_hit": response.cache_hit,
                }));
            } else {
                println!("{}", response.path.display());
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run_url(args: RequestArgs) -> ExitCode {
    init_logging(args.verbose);

    let Some(cache) = build_cache(&args.cache) else {
        return ExitCode::FAILURE;
    };

    let (url, code) = match cache.try_thumbnail_file_url(&to_request(&args)).await {
        Ok(url) => (url, ExitCode::SUCCESS),
        Err(e) => (error_to_string(&e, &args.source), ExitCode::FAILURE),
    };

    if args.json {
        print_json(&serde_json::json!({ "url": url }));
    } else {
        println!("{}", url);
    }
    code
}

async fn run_markup(args: MarkupArgs) -> ExitCode {
    let request_args = &args.request;
    init_logging(request_args.verbose);

    let Some(cache) = build_cache(&request_args.cache) else {
        return ExitCode::FAILURE;
    };

    let (src, code) = match cache.try_thumbnail_file_url(&to_request(request_args)).await {
        Ok(url) => (url, ExitCode::SUCCESS),
        Err(e) => (error_to_string(&e, &request_args.source), ExitCode::FAILURE),
    };
    let attributes = args
        .attributes
        .iter()
        .map(|(name, value)| (name.as_str(), value.as_str()));
    let markup = img_tag(&src, attributes);

    if request_args.json {
        print_json(&serde_json::json!({ "markup": markup }));
    } else {
        println!("{}", markup);
    }
    code
}

fn to_request(args: &RequestArgs) -> ThumbnailRequest {
    let mut request = ThumbnailRequest::new(&args.source, args.width, args.height)
        .with_mode(args.mode)
        .with_freshness(args.check);
    if let Some(quality) = args.quality {
        request = request.with_quality(quality);
    }
    request
}

// =============================================================================
// Clear Command
// =============================================================================

async fn run_clear(args: ClearArgs) -> ExitCode {
    init_logging(args.verbose);

    let Some(cache) = build_cache(&args.cache) else {
        return ExitCode::FAILURE;
    };

    match cache.clear_cache().await {
        Ok(()) => {
            println!("Cleared {}", cache.store().root().display());
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn build_cache(args: &CacheArgs) -> Option<DefaultCache> {
    match ThumbnailCache::from_config(args.to_cache_config()) {
        Ok(cache) => Some(cache),
        Err(e) => {
            error!("Configuration error: {}", e);
            None
        }
    }
}

fn print_json(value: &serde_json::Value) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Error: {}", e),
    }
}

/// Initialize the tracing/logging subsystem.
///
/// Logs go to stderr so command output on stdout stays machine-readable.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "thumb_cache=debug,tower_http=debug"
    } else {
        "thumb_cache=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
